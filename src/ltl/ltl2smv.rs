//! Tableau construction as a synchronous observer: the normalized
//! formula is turned into a set of fresh monitor state variables plus
//! INIT, TRANS and JUSTICE relations, such that a fair path of the
//! product machine witnesses the formula.
//!
//! The cyclic fixpoint `n_{φUψ} ≡ ψ ∨ (φ ∧ X n_{φUψ})` is represented
//! relationally: the arena holds named state variables and independent
//! TRANS constraints, never an object cycle.

use crate::{
    core::be_manager::BeManager,
    core::be_node::BeId,
    core::enc::BeEncoder,
    core::error::BmcError,
    core::fsm::BeFsm,
    core::symbols::SymbolLayer,
    ltl::formula::{LtlFormula, LtlNodeId, NormOp},
    misc::hash_select::{HashMap, HashSet},
};

/// The observer produced for a formula: an FSM fragment to be put in
/// synchronous product with the model, and the expression standing for
/// the formula itself, to be asserted in the initial state.
pub struct TableauFsm {
    pub fsm: BeFsm,
    /// Truth of the whole formula, as an expression over monitor and
    /// model variables at the initial state
    pub property: BeId,
    /// Name of the committed monitor layer, for LIFO removal
    pub layer_name: String,
}

struct Transformer<'a> {
    man: &'a mut BeManager,
    enc: &'a mut BeEncoder,
    f: &'a LtlFormula,
    /// Monitor variable of each X/Y node, and the X/Y auxiliary of each
    /// U/S node
    aux_var: HashMap<LtlNodeId, BeId>,
    /// Expression already produced for a subformula
    expr_of: HashMap<LtlNodeId, BeId>,
    declared: HashSet<LtlNodeId>,
    justice_done: HashSet<LtlNodeId>,
    inits: Vec<BeId>,
    trans: Vec<BeId>,
    justice: Vec<BeId>,
}

/// Runs the transformation for the `spec_number`-th property. A fresh
/// monitor layer named after the property is committed on the encoder;
/// the caller removes it when the product machine is dismissed.
pub fn ltl2smv(
    man: &mut BeManager,
    enc: &mut BeEncoder,
    f: &LtlFormula,
    spec_number: u32,
) -> Result<TableauFsm, BmcError> {
    let layer_name = format!("ltl_tableau_{}", spec_number);

    // first pass: one monitor variable per temporal node
    let mut layer = SymbolLayer::new(&layer_name);
    let mut names: Vec<(LtlNodeId, String)> = Vec::new();
    for id in f.node_ids() {
        let name = match f.op(id) {
            NormOp::X(_) | NormOp::Y(_) | NormOp::U(_, _) | NormOp::S(_, _) => {
                format!("LTL_{}_SPECF_{}", spec_number, id.0)
            }
            _ => continue,
        };
        layer.add_state_var(&name);
        names.push((id, name));
    }
    enc.commit_layer(&layer);

    let mut aux_var = HashMap::default();
    for (id, name) in &names {
        let v = enc
            .name_to_untimed(name)
            .expect("monitor variable was just committed");
        aux_var.insert(*id, man.var(v));
    }

    let mut tr = Transformer {
        man,
        enc,
        f,
        aux_var,
        expr_of: HashMap::default(),
        declared: HashSet::default(),
        justice_done: HashSet::default(),
        inits: Vec::new(),
        trans: Vec::new(),
        justice: Vec::new(),
    };

    let property = tr.transform(f.root(), false)?;

    let init = tr.man.and_all(tr.inits.iter().copied().collect::<Vec<_>>());
    let trans = tr.man.and_all(tr.trans.iter().copied().collect::<Vec<_>>());
    let justice = tr.justice.clone();

    log::info!(
        "ltl2smv: {} monitor variables, {} justice conditions",
        names.len(),
        justice.len()
    );

    Ok(TableauFsm {
        fsm: BeFsm::new(init, BeId::TRUE, trans, justice),
        property,
        layer_name,
    })
}

impl<'a> Transformer<'a> {
    /// `negated` tracks the polarity of the occurrence; a JUSTICE is
    /// emitted for until nodes occurring positively only.
    fn transform(&mut self, id: LtlNodeId, negated: bool) -> Result<BeId, BmcError> {
        if let Some(&e) = self.expr_of.get(&id) {
            // the declarations exist, but a new positive occurrence of an
            // until may still owe its justice condition
            self.emit_justice(id, negated, e);
            return Ok(e);
        }

        let expr = match self.f.op(id) {
            NormOp::Atom(be) => be,
            NormOp::Not(a) => {
                let ea = self.transform(a, !negated)?;
                !ea
            }
            NormOp::Or(a, b) => {
                let ea = self.transform(a, negated)?;
                let eb = self.transform(b, negated)?;
                self.man.or(ea, eb)
            }
            NormOp::X(a) => {
                let var = self.aux_var[&id];
                let ea = self.transform(a, negated)?;
                if self.declared.insert(id) {
                    // TRANS next(a) <-> n
                    let next_a = self.enc.shift_to_next(self.man, ea)?;
                    let t = self.man.iff(next_a, var);
                    self.trans.push(t);
                }
                var
            }
            NormOp::Y(a) => {
                let var = self.aux_var[&id];
                let ea = self.transform(a, negated)?;
                if self.declared.insert(id) {
                    // TRANS a <-> next(n), INIT !n
                    let next_var = self.enc.shift_to_next(self.man, var)?;
                    let t = self.man.iff(ea, next_var);
                    self.trans.push(t);
                    self.inits.push(!var);
                }
                var
            }
            NormOp::U(a, b) => {
                let xvar = self.aux_var[&id];
                let ea = self.transform(a, negated)?;
                let eb = self.transform(b, negated)?;
                // n <-> b | (a & X n), with the X part a monitor variable
                let and = self.man.and(ea, xvar);
                let expr = self.man.or(eb, and);
                if self.declared.insert(id) {
                    let next_expr = self.enc.shift_to_next(self.man, expr)?;
                    let t = self.man.iff(next_expr, xvar);
                    self.trans.push(t);
                }
                expr
            }
            NormOp::S(a, b) => {
                let yvar = self.aux_var[&id];
                let ea = self.transform(a, negated)?;
                let eb = self.transform(b, negated)?;
                let and = self.man.and(ea, yvar);
                let expr = self.man.or(eb, and);
                if self.declared.insert(id) {
                    let next_yvar = self.enc.shift_to_next(self.man, yvar)?;
                    let t = self.man.iff(expr, next_yvar);
                    self.trans.push(t);
                    self.inits.push(!yvar);
                }
                expr
            }
        };

        self.expr_of.insert(id, expr);
        self.emit_justice(id, negated, expr);
        Ok(expr)
    }

    /// JUSTICE `!n | ψ` for a positive occurrence of `φ U ψ`: excludes
    /// runs postponing the fulfilment forever.
    fn emit_justice(&mut self, id: LtlNodeId, negated: bool, expr: BeId) {
        if negated {
            return;
        }
        let NormOp::U(_, b) = self.f.op(id) else {
            return;
        };
        if !self.justice_done.insert(id) {
            return;
        }
        let eb = self.expr_of[&b];
        let j = self.man.or(!expr, eb);
        self.justice.push(j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::conv::{Sexp, SexpCache};
    use crate::ltl::formula::LtlExpr;

    fn setup() -> (BeManager, BeEncoder, SexpCache) {
        let mut layer = SymbolLayer::new("model");
        layer.add_state_var("p").add_state_var("q");
        let mut enc = BeEncoder::new();
        enc.commit_layer(&layer);
        (BeManager::new(), enc, SexpCache::default())
    }

    #[test]
    fn until_gets_a_justice_condition() {
        let (mut man, mut enc, mut cache) = setup();
        let e = LtlExpr::until(LtlExpr::prop("p"), LtlExpr::prop("q"));
        let f = LtlFormula::normalize(&mut man, &mut enc, &mut cache, &e).unwrap();
        let tab = ltl2smv(&mut man, &mut enc, &f, 0).unwrap();
        assert_eq!(tab.fsm.fairness().len(), 1);
        assert!(!tab.property.is_constant());
    }

    #[test]
    fn negated_until_gets_no_justice() {
        let (mut man, mut enc, mut cache) = setup();
        // G p = !(true U !p): the until occurs under one negation
        let e = LtlExpr::globally(LtlExpr::prop("p"));
        let f = LtlFormula::normalize(&mut man, &mut enc, &mut cache, &e).unwrap();
        let tab = ltl2smv(&mut man, &mut enc, &f, 1).unwrap();
        assert!(tab.fsm.fairness().is_empty());
    }

    #[test]
    fn since_adds_an_initial_constraint() {
        let (mut man, mut enc, mut cache) = setup();
        let e = LtlExpr::since(LtlExpr::prop("p"), LtlExpr::prop("q"));
        let f = LtlFormula::normalize(&mut man, &mut enc, &mut cache, &e).unwrap();
        let tab = ltl2smv(&mut man, &mut enc, &f, 2).unwrap();
        assert!(!tab.fsm.init().is_true());
        assert!(tab.fsm.fairness().is_empty());
    }

    #[test]
    fn monitor_layer_pops_cleanly() {
        let (mut man, mut enc, mut cache) = setup();
        let e = LtlExpr::eventually(LtlExpr::prop("p"));
        let f = LtlFormula::normalize(&mut man, &mut enc, &mut cache, &e).unwrap();
        let tab = ltl2smv(&mut man, &mut enc, &f, 3).unwrap();
        assert!(enc.pop_layer(&tab.layer_name).is_ok());
    }
}

//! Conversion of an expression DAG into conjunctive normal form,
//! Tseitin-style with polarity tracking.
//!
//! Every non-constant node gets a CNF variable; the assignment is stored
//! in the manager and is therefore stable across conversions, which the
//! incremental algorithms rely on.

use crate::{
    core::be_manager::BeManager,
    core::be_node::{BeId, BeOp, BeVarId, NodeId},
    misc::hash_select::HashMap,
};

/// Index of a CNF variable. DIMACS numbering, so indices start at 1.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CnfVarId(pub u32);

/// A signed DIMACS literal.
pub type CnfLit = i32;

/// The literal encoding the top-level formula. A formula that simplified
/// to a constant has no literal.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FormulaLit {
    Constant(bool),
    Lit(CnfLit),
}

/// Result of a conversion. The represented formula is satisfiable iff
/// `clauses` plus the formula literal (as a unit clause) are satisfiable.
#[derive(Debug, Clone)]
pub struct BeCnf {
    clauses: Vec<Vec<CnfLit>>,
    /// CNF indices of the model variables occurring in the formula
    model_vars: Vec<CnfVarId>,
    formula_lit: FormulaLit,
    max_var: u32,
}

impl BeCnf {
    pub fn clauses(&self) -> &[Vec<CnfLit>] {
        &self.clauses
    }

    pub fn model_vars(&self) -> &[CnfVarId] {
        &self.model_vars
    }

    pub fn formula_lit(&self) -> FormulaLit {
        self.formula_lit
    }

    pub fn max_var(&self) -> u32 {
        self.max_var
    }

    pub fn num_clauses(&self) -> usize {
        self.clauses.len()
    }
}

const POS: u8 = 1;
const NEG: u8 = 2;

impl BeManager {
    /// A CNF variable with no BE counterpart, used as activation literal
    /// by the incremental algorithms.
    pub fn fresh_cnf_var(&mut self) -> CnfVarId {
        let v = CnfVarId(self.cnf_next_var);
        self.cnf_next_var += 1;
        v
    }

    /// CNF variable of a node, allocated on first use and persistent for
    /// the whole session.
    pub fn cnf_var_of_node(&mut self, node: NodeId) -> CnfVarId {
        if let Some(v) = self.node2cnf.get(&node) {
            return *v;
        }
        let v = CnfVarId(self.cnf_next_var);
        self.cnf_next_var += 1;
        self.node2cnf.insert(node, v);
        self.cnf2node.insert(v, node);
        v
    }

    /// The literal of an edge: the node's CNF variable, negated when the
    /// edge is complemented.
    pub fn cnf_lit_of(&mut self, e: BeId) -> CnfLit {
        let v = self.cnf_var_of_node(e.node());
        if e.is_complemented() {
            -(v.0 as CnfLit)
        } else {
            v.0 as CnfLit
        }
    }

    /// The CNF variable of a node if one was already assigned, without
    /// allocating.
    pub fn peek_cnf_var(&self, node: NodeId) -> Option<CnfVarId> {
        self.node2cnf.get(&node).copied()
    }

    /// Back-map for trace reconstruction: the model variable behind a CNF
    /// index, or `None` for Tseitin auxiliaries and unknown indices.
    pub fn cnf_var_to_model_var(&self, v: CnfVarId) -> Option<BeVarId> {
        let node = self.cnf2node.get(&v)?;
        match self.op(*node) {
            BeOp::Var(var) => Some(var),
            _ => None,
        }
    }

    /// Converts `root` to CNF. Polarity-optimized: only the clause sets
    /// needed for the polarities a node actually occurs in are emitted.
    pub fn to_cnf(&mut self, root: BeId) -> BeCnf {
        let polarity = if root.is_complemented() { NEG } else { POS };
        self.to_cnf_with(root, polarity)
    }

    /// Converts `root` emitting the clause sets of both polarities, so
    /// the formula literal can be assumed either way. Used when an
    /// incremental algorithm toggles a constraint with its literal.
    pub fn to_cnf_both(&mut self, root: BeId) -> BeCnf {
        self.to_cnf_with(root, POS | NEG)
    }

    fn to_cnf_with(&mut self, root: BeId, top_polarity: u8) -> BeCnf {
        if root.is_constant() {
            if root.is_true() {
                // no clauses at all
                return BeCnf {
                    clauses: Vec::new(),
                    model_vars: Vec::new(),
                    formula_lit: FormulaLit::Constant(true),
                    max_var: 0,
                };
            }
            // a contradictory pair over a fresh variable
            let x = CnfVarId(self.cnf_next_var);
            self.cnf_next_var += 1;
            return BeCnf {
                clauses: vec![vec![x.0 as CnfLit], vec![-(x.0 as CnfLit)]],
                model_vars: Vec::new(),
                formula_lit: FormulaLit::Constant(false),
                max_var: x.0,
            };
        }

        let mut conv = CnfConverter {
            clauses: Vec::new(),
            model_vars: Vec::new(),
            emitted: HashMap::default(),
            max_var: 0,
        };

        conv.convert(self, root.node(), top_polarity);

        let formula_lit = self.cnf_lit_of(root);
        conv.saw_var(formula_lit.unsigned_abs());

        conv.model_vars.sort_unstable();
        conv.model_vars.dedup();

        log::debug!(
            "CNF conversion: {} clauses, {} model vars, max index {}",
            conv.clauses.len(),
            conv.model_vars.len(),
            conv.max_var
        );

        BeCnf {
            clauses: conv.clauses,
            model_vars: conv.model_vars,
            formula_lit: FormulaLit::Lit(formula_lit),
            max_var: conv.max_var,
        }
    }
}

struct CnfConverter {
    clauses: Vec<Vec<CnfLit>>,
    model_vars: Vec<CnfVarId>,
    /// Polarity mask already emitted for a node, per conversion
    emitted: HashMap<NodeId, u8>,
    max_var: u32,
}

impl CnfConverter {
    fn saw_var(&mut self, v: u32) {
        if v > self.max_var {
            self.max_var = v;
        }
    }

    fn push_clause(&mut self, clause: Vec<CnfLit>) {
        for lit in &clause {
            self.saw_var(lit.unsigned_abs());
        }
        self.clauses.push(clause);
    }

    /// Polarity the child's definition is needed in, given the polarity
    /// of the parent and the complement flag on the connecting edge.
    fn child_polarity(parent: u8, edge: BeId) -> u8 {
        if edge.is_complemented() {
            match parent {
                POS => NEG,
                NEG => POS,
                both => both,
            }
        } else {
            parent
        }
    }

    fn convert(&mut self, man: &mut BeManager, node: NodeId, polarity: u8) {
        let seen = self.emitted.get(&node).copied().unwrap_or(0);
        let needed = polarity & !seen;
        if needed == 0 {
            return;
        }
        self.emitted.insert(node, seen | needed);

        match man.op(node) {
            BeOp::True => unreachable!("constants are handled at the edge level"),
            BeOp::Var(_) => {
                let v = man.cnf_var_of_node(node);
                self.saw_var(v.0);
                self.model_vars.push(v);
            }
            BeOp::And(a, b) => {
                let x = man.cnf_var_of_node(node).0 as CnfLit;
                let la = man.cnf_lit_of(a);
                let lb = man.cnf_lit_of(b);
                if needed & POS != 0 {
                    self.push_clause(vec![-x, la]);
                    self.push_clause(vec![-x, lb]);
                }
                if needed & NEG != 0 {
                    self.push_clause(vec![x, -la, -lb]);
                }
                self.convert(man, a.node(), Self::child_polarity(needed, a));
                self.convert(man, b.node(), Self::child_polarity(needed, b));
            }
            BeOp::Iff(a, b) => {
                // children are regular in canonical form
                let x = man.cnf_var_of_node(node).0 as CnfLit;
                let la = man.cnf_lit_of(a);
                let lb = man.cnf_lit_of(b);
                if needed & POS != 0 {
                    self.push_clause(vec![-x, -la, lb]);
                    self.push_clause(vec![-x, la, -lb]);
                }
                if needed & NEG != 0 {
                    self.push_clause(vec![x, la, lb]);
                    self.push_clause(vec![x, -la, -lb]);
                }
                // either direction constrains both children both ways
                self.convert(man, a.node(), POS | NEG);
                self.convert(man, b.node(), POS | NEG);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_true_yields_no_clauses() {
        let mut man = BeManager::new();
        let cnf = man.to_cnf(BeId::TRUE);
        assert_eq!(cnf.formula_lit(), FormulaLit::Constant(true));
        assert!(cnf.clauses().is_empty());
    }

    #[test]
    fn constant_false_yields_contradictory_pair() {
        let mut man = BeManager::new();
        let cnf = man.to_cnf(BeId::FALSE);
        assert_eq!(cnf.formula_lit(), FormulaLit::Constant(false));
        assert_eq!(cnf.num_clauses(), 2);
        let l0 = cnf.clauses()[0][0];
        let l1 = cnf.clauses()[1][0];
        assert_eq!(l0, -l1);
    }

    #[test]
    fn cnf_numbering_is_stable_across_conversions() {
        let mut man = BeManager::new();
        let x = man.var(BeVarId(0));
        let y = man.var(BeVarId(1));
        let f = man.and(x, y);

        let c1 = man.to_cnf(f);
        let c2 = man.to_cnf(f);
        assert_eq!(c1.formula_lit(), c2.formula_lit());
        assert_eq!(c1.model_vars(), c2.model_vars());
    }

    #[test]
    fn model_vars_map_back() {
        let mut man = BeManager::new();
        let x = man.var(BeVarId(4));
        let y = man.var(BeVarId(9));
        let f = man.or(x, y);
        let cnf = man.to_cnf(f);

        let mut back: Vec<BeVarId> = cnf
            .model_vars()
            .iter()
            .filter_map(|v| man.cnf_var_to_model_var(*v))
            .collect();
        back.sort_unstable();
        assert_eq!(back, vec![BeVarId(4), BeVarId(9)]);
    }

    #[test]
    fn cnf_is_equisatisfiable() {
        use crate::solver::dpll::DpllSolver;
        use crate::solver::{solve_problem, SatOutcome};

        let build = |man: &mut BeManager| -> Vec<BeId> {
            let x = man.var(BeVarId(0));
            let y = man.var(BeVarId(1));
            let z = man.var(BeVarId(2));
            let xy = man.and(x, y);
            let xz_iff = man.iff(x, z);
            let mix = man.or(xy, !xz_iff);
            let tauto = man.or(x, !x);
            let yz = man.or(y, z);
            let no_z = man.and(!z, yz);
            let contra = man.and(!y, no_z);
            vec![xy, xz_iff, mix, tauto, contra, !mix]
        };

        let vars = [BeVarId(0), BeVarId(1), BeVarId(2)];
        let mut man = BeManager::new();
        let formulas = build(&mut man);

        for f in formulas {
            // brute-force satisfiability over the three variables
            let mut brute = false;
            for mask in 0u8..8 {
                let trues: Vec<BeVarId> = vars
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, v)| *v)
                    .collect();
                if man.evaluate(f, &trues) {
                    brute = true;
                    break;
                }
            }

            let cnf = man.to_cnf(f);
            let mut solver = DpllSolver::new();
            let solved = solve_problem(&mut solver, &cnf).unwrap();
            assert_eq!(
                solved == SatOutcome::Sat,
                brute,
                "equisatisfiability violated for {:?}",
                f
            );
        }
    }

    #[test]
    fn negated_formula_gets_negative_literal() {
        let mut man = BeManager::new();
        let x = man.var(BeVarId(0));
        let y = man.var(BeVarId(1));
        let f = man.and(x, y);
        let cnf = man.to_cnf(!f);
        match cnf.formula_lit() {
            FormulaLit::Lit(l) => assert!(l < 0),
            other => panic!("unexpected formula literal {:?}", other),
        }
    }
}

//! LTL property trees and their normalization.
//!
//! The input tree supports the full operator set; normalization rewrites
//! it into the kernel {¬, ∨, X, Y, U, S} over Boolean-expression leaves,
//! hash-consed so identical subformulas share one node. Propositional
//! structure with no temporal operator underneath is folded into the
//! leaves.

use crate::{
    core::be_manager::BeManager,
    core::be_node::BeId,
    core::conv::{sexp_to_be, Sexp, SexpCache},
    core::enc::BeEncoder,
    core::error::BmcError,
    misc::hash_select::HashMap,
};

/// An LTL property over flattened boolean expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LtlExpr {
    Atom(Sexp),
    Not(Box<LtlExpr>),
    And(Box<LtlExpr>, Box<LtlExpr>),
    Or(Box<LtlExpr>, Box<LtlExpr>),
    Xor(Box<LtlExpr>, Box<LtlExpr>),
    Iff(Box<LtlExpr>, Box<LtlExpr>),
    Implies(Box<LtlExpr>, Box<LtlExpr>),
    /// next
    X(Box<LtlExpr>),
    /// previous
    Y(Box<LtlExpr>),
    /// not-previous-not
    Z(Box<LtlExpr>),
    /// finally
    F(Box<LtlExpr>),
    /// globally
    G(Box<LtlExpr>),
    /// once
    O(Box<LtlExpr>),
    /// historically
    H(Box<LtlExpr>),
    /// until
    U(Box<LtlExpr>, Box<LtlExpr>),
    /// since
    S(Box<LtlExpr>, Box<LtlExpr>),
    /// releases
    V(Box<LtlExpr>, Box<LtlExpr>),
    /// triggered
    T(Box<LtlExpr>, Box<LtlExpr>),
}

impl LtlExpr {
    pub fn atom(e: Sexp) -> LtlExpr {
        LtlExpr::Atom(e)
    }

    pub fn prop(name: &str) -> LtlExpr {
        LtlExpr::Atom(Sexp::var(name))
    }

    pub fn not(e: LtlExpr) -> LtlExpr {
        LtlExpr::Not(Box::new(e))
    }

    pub fn and(a: LtlExpr, b: LtlExpr) -> LtlExpr {
        LtlExpr::And(Box::new(a), Box::new(b))
    }

    pub fn or(a: LtlExpr, b: LtlExpr) -> LtlExpr {
        LtlExpr::Or(Box::new(a), Box::new(b))
    }

    pub fn implies(a: LtlExpr, b: LtlExpr) -> LtlExpr {
        LtlExpr::Implies(Box::new(a), Box::new(b))
    }

    pub fn next(e: LtlExpr) -> LtlExpr {
        LtlExpr::X(Box::new(e))
    }

    pub fn eventually(e: LtlExpr) -> LtlExpr {
        LtlExpr::F(Box::new(e))
    }

    pub fn globally(e: LtlExpr) -> LtlExpr {
        LtlExpr::G(Box::new(e))
    }

    pub fn historically(e: LtlExpr) -> LtlExpr {
        LtlExpr::H(Box::new(e))
    }

    pub fn once(e: LtlExpr) -> LtlExpr {
        LtlExpr::O(Box::new(e))
    }

    pub fn until(a: LtlExpr, b: LtlExpr) -> LtlExpr {
        LtlExpr::U(Box::new(a), Box::new(b))
    }

    pub fn since(a: LtlExpr, b: LtlExpr) -> LtlExpr {
        LtlExpr::S(Box::new(a), Box::new(b))
    }
}

/// Index of a normalized subformula.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LtlNodeId(pub u32);

/// Normalized operator. Leaves are Boolean Expressions over untimed
/// model variables; negation over a leaf is folded into the leaf.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NormOp {
    Atom(BeId),
    Not(LtlNodeId),
    Or(LtlNodeId, LtlNodeId),
    X(LtlNodeId),
    Y(LtlNodeId),
    U(LtlNodeId, LtlNodeId),
    S(LtlNodeId, LtlNodeId),
}

/// A normalized formula: a hash-consed arena of [`NormOp`] nodes.
pub struct LtlFormula {
    nodes: Vec<NormOp>,
    utable: HashMap<NormOp, LtlNodeId>,
    root: LtlNodeId,
}

impl LtlFormula {
    /// Rewrites `expr` into the normalized kernel. Leaves are converted
    /// through the shared Sexp cache.
    pub fn normalize(
        man: &mut BeManager,
        enc: &mut BeEncoder,
        cache: &mut SexpCache,
        expr: &LtlExpr,
    ) -> Result<LtlFormula, BmcError> {
        let mut f = LtlFormula {
            nodes: Vec::new(),
            utable: HashMap::default(),
            root: LtlNodeId(0),
        };
        f.root = f.norm(man, enc, cache, expr)?;
        log::debug!("normalized LTL formula: {} shared nodes", f.nodes.len());
        Ok(f)
    }

    pub fn root(&self) -> LtlNodeId {
        self.root
    }

    pub fn op(&self, id: LtlNodeId) -> NormOp {
        self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node ids, children before parents.
    pub fn node_ids(&self) -> impl Iterator<Item = LtlNodeId> {
        (0..self.nodes.len() as u32).map(LtlNodeId)
    }

    pub fn has_past(&self) -> bool {
        self.nodes
            .iter()
            .any(|op| matches!(op, NormOp::Y(_) | NormOp::S(_, _)))
    }

    /// True when the formula is co-safety: in negation normal form it
    /// uses only X and U, so any model has an informative finite prefix.
    /// The completeness certificates apply to this fragment only.
    pub fn is_cosafety(&self) -> bool {
        self.cosafety_rec(self.root, false)
    }

    fn cosafety_rec(&self, id: LtlNodeId, neg: bool) -> bool {
        match self.op(id) {
            NormOp::Atom(_) => true,
            NormOp::Not(a) => self.cosafety_rec(a, !neg),
            NormOp::Or(a, b) => self.cosafety_rec(a, neg) && self.cosafety_rec(b, neg),
            NormOp::X(a) => self.cosafety_rec(a, neg),
            // a negated until is a release, which needs the infinite suffix
            NormOp::U(a, b) => {
                !neg && self.cosafety_rec(a, false) && self.cosafety_rec(b, false)
            }
            NormOp::Y(_) | NormOp::S(_, _) => false,
        }
    }

    /// Maximum nesting depth of temporal operators; bounds how far the
    /// formula can look beyond a state revisit, which sizes the
    /// completeness threshold margin.
    pub fn temporal_depth(&self) -> usize {
        let mut depth = vec![0usize; self.nodes.len()];
        for (i, op) in self.nodes.iter().enumerate() {
            depth[i] = match *op {
                NormOp::Atom(_) => 0,
                NormOp::Not(a) => depth[a.0 as usize],
                NormOp::Or(a, b) => depth[a.0 as usize].max(depth[b.0 as usize]),
                NormOp::X(a) | NormOp::Y(a) => depth[a.0 as usize] + 1,
                NormOp::U(a, b) | NormOp::S(a, b) => {
                    depth[a.0 as usize].max(depth[b.0 as usize]) + 1
                }
            };
        }
        depth[self.root.0 as usize]
    }

    /// Maximum nesting depth of past operators, the virtual unrolling
    /// depth needed by the past-time tableau.
    pub fn past_depth(&self) -> usize {
        let mut depth = vec![0usize; self.nodes.len()];
        for (i, op) in self.nodes.iter().enumerate() {
            depth[i] = match *op {
                NormOp::Atom(_) => 0,
                NormOp::Not(a) | NormOp::X(a) => depth[a.0 as usize],
                NormOp::Or(a, b) | NormOp::U(a, b) => {
                    depth[a.0 as usize].max(depth[b.0 as usize])
                }
                NormOp::Y(a) => depth[a.0 as usize] + 1,
                NormOp::S(a, b) => depth[a.0 as usize].max(depth[b.0 as usize]) + 1,
            };
        }
        depth[self.root.0 as usize]
    }

    fn intern(&mut self, op: NormOp) -> LtlNodeId {
        if let Some(id) = self.utable.get(&op) {
            return *id;
        }
        let id = LtlNodeId(self.nodes.len() as u32);
        self.nodes.push(op);
        self.utable.insert(op, id);
        id
    }

    fn mk_atom(&mut self, be: BeId) -> LtlNodeId {
        self.intern(NormOp::Atom(be))
    }

    pub(crate) fn mk_not(&mut self, man: &mut BeManager, a: LtlNodeId) -> LtlNodeId {
        match self.op(a) {
            // negation over a leaf folds into the leaf
            NormOp::Atom(be) => self.mk_atom(man.not(be)),
            // double negation collapses
            NormOp::Not(inner) => inner,
            _ => self.intern(NormOp::Not(a)),
        }
    }

    fn mk_or(&mut self, man: &mut BeManager, a: LtlNodeId, b: LtlNodeId) -> LtlNodeId {
        // adjacent propositional structure folds into one leaf
        if let (NormOp::Atom(ba), NormOp::Atom(bb)) = (self.op(a), self.op(b)) {
            let o = man.or(ba, bb);
            return self.mk_atom(o);
        }
        self.intern(NormOp::Or(a, b))
    }

    fn norm(
        &mut self,
        man: &mut BeManager,
        enc: &mut BeEncoder,
        cache: &mut SexpCache,
        e: &LtlExpr,
    ) -> Result<LtlNodeId, BmcError> {
        let id = match e {
            LtlExpr::Atom(s) => {
                let be = sexp_to_be(man, enc, cache, s)?;
                self.mk_atom(be)
            }
            LtlExpr::Not(a) => {
                let na = self.norm(man, enc, cache, a)?;
                self.mk_not(man, na)
            }
            LtlExpr::Or(a, b) => {
                let na = self.norm(man, enc, cache, a)?;
                let nb = self.norm(man, enc, cache, b)?;
                self.mk_or(man, na, nb)
            }
            LtlExpr::And(a, b) => {
                // a & b  ~>  !(!a | !b)
                let na = self.norm(man, enc, cache, a)?;
                let nb = self.norm(man, enc, cache, b)?;
                let nna = self.mk_not(man, na);
                let nnb = self.mk_not(man, nb);
                let or = self.mk_or(man, nna, nnb);
                self.mk_not(man, or)
            }
            LtlExpr::Implies(a, b) => {
                let na = self.norm(man, enc, cache, a)?;
                let nb = self.norm(man, enc, cache, b)?;
                let nna = self.mk_not(man, na);
                self.mk_or(man, nna, nb)
            }
            LtlExpr::Iff(a, b) => {
                // a <-> b  ~>  !(!a | !b) | !(a | b)
                let na = self.norm(man, enc, cache, a)?;
                let nb = self.norm(man, enc, cache, b)?;
                let nna = self.mk_not(man, na);
                let nnb = self.mk_not(man, nb);
                let both = self.mk_or(man, nna, nnb);
                let pos = self.mk_not(man, both);
                let neither = self.mk_or(man, na, nb);
                let neg = self.mk_not(man, neither);
                self.mk_or(man, pos, neg)
            }
            LtlExpr::Xor(a, b) => {
                // a xor b  ~>  !(!a | b) | !(a | !b)
                let na = self.norm(man, enc, cache, a)?;
                let nb = self.norm(man, enc, cache, b)?;
                let nna = self.mk_not(man, na);
                let nnb = self.mk_not(man, nb);
                let left_or = self.mk_or(man, nna, nb);
                let left = self.mk_not(man, left_or);
                let right_or = self.mk_or(man, na, nnb);
                let right = self.mk_not(man, right_or);
                self.mk_or(man, left, right)
            }
            LtlExpr::X(a) => {
                let na = self.norm(man, enc, cache, a)?;
                self.intern(NormOp::X(na))
            }
            LtlExpr::Y(a) => {
                let na = self.norm(man, enc, cache, a)?;
                self.intern(NormOp::Y(na))
            }
            LtlExpr::Z(a) => {
                // Z a  ~>  !Y !a
                let na = self.norm(man, enc, cache, a)?;
                let nna = self.mk_not(man, na);
                let y = self.intern(NormOp::Y(nna));
                self.mk_not(man, y)
            }
            LtlExpr::F(a) => {
                // F a  ~>  true U a
                let na = self.norm(man, enc, cache, a)?;
                let t = self.mk_atom(BeId::TRUE);
                self.intern(NormOp::U(t, na))
            }
            LtlExpr::G(a) => {
                // G a  ~>  !(true U !a)
                let na = self.norm(man, enc, cache, a)?;
                let nna = self.mk_not(man, na);
                let t = self.mk_atom(BeId::TRUE);
                let u = self.intern(NormOp::U(t, nna));
                self.mk_not(man, u)
            }
            LtlExpr::O(a) => {
                // O a  ~>  true S a
                let na = self.norm(man, enc, cache, a)?;
                let t = self.mk_atom(BeId::TRUE);
                self.intern(NormOp::S(t, na))
            }
            LtlExpr::H(a) => {
                // H a  ~>  !(true S !a)
                let na = self.norm(man, enc, cache, a)?;
                let nna = self.mk_not(man, na);
                let t = self.mk_atom(BeId::TRUE);
                let s = self.intern(NormOp::S(t, nna));
                self.mk_not(man, s)
            }
            LtlExpr::U(a, b) => {
                let na = self.norm(man, enc, cache, a)?;
                let nb = self.norm(man, enc, cache, b)?;
                self.intern(NormOp::U(na, nb))
            }
            LtlExpr::S(a, b) => {
                let na = self.norm(man, enc, cache, a)?;
                let nb = self.norm(man, enc, cache, b)?;
                self.intern(NormOp::S(na, nb))
            }
            LtlExpr::V(a, b) => {
                // a V b  ~>  !(!a U !b)
                let na = self.norm(man, enc, cache, a)?;
                let nb = self.norm(man, enc, cache, b)?;
                let nna = self.mk_not(man, na);
                let nnb = self.mk_not(man, nb);
                let u = self.intern(NormOp::U(nna, nnb));
                self.mk_not(man, u)
            }
            LtlExpr::T(a, b) => {
                // a T b  ~>  !(!a S !b)
                let na = self.norm(man, enc, cache, a)?;
                let nb = self.norm(man, enc, cache, b)?;
                let nna = self.mk_not(man, na);
                let nnb = self.mk_not(man, nb);
                let s = self.intern(NormOp::S(nna, nnb));
                self.mk_not(man, s)
            }
        };
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::symbols::SymbolLayer;

    fn setup() -> (BeManager, BeEncoder, SexpCache) {
        let mut layer = SymbolLayer::new("model");
        layer.add_state_var("p").add_state_var("q");
        let mut enc = BeEncoder::new();
        enc.commit_layer(&layer);
        (BeManager::new(), enc, SexpCache::default())
    }

    fn normalize(e: &LtlExpr) -> (LtlFormula, BeManager, BeEncoder) {
        let (mut man, mut enc, mut cache) = setup();
        let f = LtlFormula::normalize(&mut man, &mut enc, &mut cache, e).unwrap();
        (f, man, enc)
    }

    #[test]
    fn globally_becomes_negated_until() {
        let (f, _, _) = normalize(&LtlExpr::globally(LtlExpr::prop("p")));
        match f.op(f.root()) {
            NormOp::Not(u) => assert!(matches!(f.op(u), NormOp::U(_, _))),
            other => panic!("unexpected root {:?}", other),
        }
    }

    #[test]
    fn double_negation_collapses() {
        let e = LtlExpr::not(LtlExpr::not(LtlExpr::next(LtlExpr::prop("p"))));
        let (f, _, _) = normalize(&e);
        assert!(matches!(f.op(f.root()), NormOp::X(_)));
    }

    #[test]
    fn propositional_structure_folds_into_leaves() {
        // !(p | !q) has no temporal operator, so it becomes one atom
        let e = LtlExpr::not(LtlExpr::or(
            LtlExpr::prop("p"),
            LtlExpr::not(LtlExpr::prop("q")),
        ));
        let (f, _, _) = normalize(&e);
        assert!(matches!(f.op(f.root()), NormOp::Atom(_)));
        assert!(f
            .node_ids()
            .all(|id| matches!(f.op(id), NormOp::Atom(_))));
    }

    #[test]
    fn shared_subformulas_are_interned_once() {
        // (F p) | (F p) shares the until node
        let e = LtlExpr::or(
            LtlExpr::eventually(LtlExpr::prop("p")),
            LtlExpr::eventually(LtlExpr::prop("p")),
        );
        let (f, _, _) = normalize(&e);
        let u_nodes = f
            .node_ids()
            .filter(|id| matches!(f.op(*id), NormOp::U(_, _)))
            .count();
        assert_eq!(u_nodes, 1);
    }

    #[test]
    fn past_detection_and_depth() {
        let e = LtlExpr::historically(LtlExpr::prop("p"));
        let (f, _, _) = normalize(&e);
        assert!(f.has_past());
        assert_eq!(f.past_depth(), 1);

        let e2 = LtlExpr::globally(LtlExpr::prop("p"));
        let (f2, _, _) = normalize(&e2);
        assert!(!f2.has_past());
        assert_eq!(f2.past_depth(), 0);
    }

    #[test]
    fn release_is_dual_of_until() {
        let e = LtlExpr::V(
            Box::new(LtlExpr::prop("p")),
            Box::new(LtlExpr::prop("q")),
        );
        let (f, _, _) = normalize(&e);
        match f.op(f.root()) {
            NormOp::Not(u) => assert!(matches!(f.op(u), NormOp::U(_, _))),
            other => panic!("unexpected root {:?}", other),
        }
    }
}

//! All Boolean Expression building and manipulation functionality.

use std::fmt;

use crate::{
    core::be_node::{BeId, BeOp, BeVarId, NodeId},
    core::cnf::CnfVarId,
    misc::hash_select::HashMap,
};

/// Container combining the node list, the unique table and the CNF
/// variable maps. Nodes live for the whole session; the manager owns them.
#[derive(Clone)]
pub struct BeManager {
    /// Node list, indexed by [`NodeId`]
    nodes: Vec<BeOp>,
    /// Unique table: maps an operator in canonical form to its node
    utable: HashMap<BeOp, NodeId>,
    /// CNF variable assigned to a node, persistent across conversions so
    /// that incremental solving sees a stable numbering
    pub(crate) node2cnf: HashMap<NodeId, CnfVarId>,
    /// Inverse of `node2cnf`
    pub(crate) cnf2node: HashMap<CnfVarId, NodeId>,
    /// Next CNF variable index to hand out (DIMACS indices start at 1)
    pub(crate) cnf_next_var: u32,
}

impl fmt::Debug for BeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BeManager [{} nodes, unique table size {}, {} CNF vars]",
            self.nodes.len(),
            self.utable.len(),
            self.cnf_next_var - 1
        )
    }
}

impl Default for BeManager {
    fn default() -> Self {
        BeManager {
            nodes: vec![BeOp::True],
            utable: HashMap::default(),
            node2cnf: HashMap::default(),
            cnf2node: HashMap::default(),
            cnf_next_var: 1,
        }
    }
}

impl BeManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn one(&self) -> BeId {
        BeId::TRUE
    }

    pub fn zero(&self) -> BeId {
        BeId::FALSE
    }

    /// Number of allocated nodes, constant node included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn op(&self, node: NodeId) -> BeOp {
        self.nodes[node.0 as usize]
    }

    /// Looks up the canonical-form operator in the unique table, creating
    /// the node on a miss. Identical subgraphs are never duplicated.
    fn node_get_or_create(&mut self, op: BeOp) -> NodeId {
        if let Some(id) = self.utable.get(&op) {
            return *id;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(op);
        self.utable.insert(op, id);
        id
    }

    /// Returns the node for variable `v`, creating it on first use.
    pub fn var(&mut self, v: BeVarId) -> BeId {
        BeId::new(self.node_get_or_create(BeOp::Var(v)), false)
    }

    /// The node of variable `v`, if it was ever created.
    pub fn find_var_node(&self, v: BeVarId) -> Option<NodeId> {
        self.utable.get(&BeOp::Var(v)).copied()
    }

    pub fn is_var(&self, e: BeId) -> bool {
        matches!(self.op(e.node()), BeOp::Var(_))
    }

    /// The variable index of a var node edge, disregarding the complement
    /// flag.
    pub fn var_of(&self, e: BeId) -> Option<BeVarId> {
        match self.op(e.node()) {
            BeOp::Var(v) => Some(v),
            _ => None,
        }
    }

    pub fn not(&self, a: BeId) -> BeId {
        !a
    }

    pub fn and(&mut self, a: BeId, b: BeId) -> BeId {
        // constant operands short-circuit
        if a.is_true() {
            return b;
        }
        if b.is_true() {
            return a;
        }
        if a.is_false() || b.is_false() {
            return BeId::FALSE;
        }
        if a == b {
            return a;
        }
        if a == !b {
            return BeId::FALSE;
        }

        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        BeId::new(self.node_get_or_create(BeOp::And(a, b)), false)
    }

    pub fn or(&mut self, a: BeId, b: BeId) -> BeId {
        !self.and(!a, !b)
    }

    pub fn iff(&mut self, a: BeId, b: BeId) -> BeId {
        // constant operand simplifies to identity or negation
        if a.is_true() {
            return b;
        }
        if b.is_true() {
            return a;
        }
        if a.is_false() {
            return !b;
        }
        if b.is_false() {
            return !a;
        }
        if a == b {
            return BeId::TRUE;
        }
        if a == !b {
            return BeId::FALSE;
        }

        // commute complement flags onto the parent edge so that the
        // children stored in the node are both regular
        let complemented = a.is_complemented() ^ b.is_complemented();
        let (a, b) = (a.regular(), b.regular());
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        BeId::new(self.node_get_or_create(BeOp::Iff(a, b)), complemented)
    }

    pub fn xor(&mut self, a: BeId, b: BeId) -> BeId {
        !self.iff(a, b)
    }

    pub fn implies(&mut self, a: BeId, b: BeId) -> BeId {
        self.or(!a, b)
    }

    /// `(c ∧ t) ∨ (¬c ∧ e)`; a constant condition collapses eagerly
    /// through the AND simplifications.
    pub fn ite(&mut self, c: BeId, t: BeId, e: BeId) -> BeId {
        let pos = self.and(c, t);
        let neg = self.and(!c, e);
        self.or(pos, neg)
    }

    /// Conjunction of an iterator of expressions.
    pub fn and_all<I: IntoIterator<Item = BeId>>(&mut self, es: I) -> BeId {
        let mut acc = BeId::TRUE;
        for e in es {
            acc = self.and(acc, e);
            if acc.is_false() {
                break;
            }
        }
        acc
    }

    /// Disjunction of an iterator of expressions.
    pub fn or_all<I: IntoIterator<Item = BeId>>(&mut self, es: I) -> BeId {
        let mut acc = BeId::FALSE;
        for e in es {
            acc = self.or(acc, e);
            if acc.is_true() {
                break;
            }
        }
        acc
    }
}

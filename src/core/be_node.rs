//! Type definitions for the elements of the Boolean Expression DAG:
//! nodes ([`BeOp`], [`NodeId`]), edges ([`BeId`]) and variables ([`BeVarId`]).

use std::ops::Not;

/// Index of a Boolean variable. Numbering is owned by the
/// [`BeEncoder`](crate::core::enc::BeEncoder); the manager creates a var
/// node for any index it is handed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BeVarId(pub u32);

/// Index of a node in the manager's node list. Special value: 0 is the
/// constant node.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Edge into the DAG: a node index plus a complement flag in the lowest
/// bit. Negation flips the flag and never allocates a node.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BeId(u32);

impl BeId {
    /// The constant node, taken positively.
    pub const TRUE: BeId = BeId(0);
    /// The constant node, taken through a complemented edge.
    pub const FALSE: BeId = BeId(1);

    pub fn new(node: NodeId, complemented: bool) -> Self {
        BeId(node.0 << 1 | complemented as u32)
    }

    pub fn node(self) -> NodeId {
        NodeId(self.0 >> 1)
    }

    pub fn is_complemented(self) -> bool {
        self.0 & 1 == 1
    }

    /// Same edge with the complement flag cleared.
    pub fn regular(self) -> BeId {
        BeId(self.0 & !1)
    }

    pub fn is_constant(self) -> bool {
        self.node() == NodeId(0)
    }

    pub fn is_true(self) -> bool {
        self == BeId::TRUE
    }

    pub fn is_false(self) -> bool {
        self == BeId::FALSE
    }
}

impl Not for BeId {
    type Output = BeId;

    fn not(self) -> BeId {
        BeId(self.0 ^ 1)
    }
}

impl std::fmt::Debug for BeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_complemented() {
            write!(f, "!n{}", self.node().0)
        } else {
            write!(f, "n{}", self.node().0)
        }
    }
}

/// Operator of a node. Canonical form maintained by the manager:
/// children of [`BeOp::And`] are ordered by edge id, children of
/// [`BeOp::Iff`] never carry complement flags (the flag is commuted onto
/// the parent edge).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BeOp {
    /// The single constant node. `FALSE` is this node through a
    /// complemented edge.
    True,
    Var(BeVarId),
    And(BeId, BeId),
    Iff(BeId, BeId),
}

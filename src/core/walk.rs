//! Depth-first traversal of the expression DAG through a visitor
//! interface, plus the traversal-based utilities (support, size).

use crate::{
    core::be_manager::BeManager,
    core::be_node::{BeId, BeOp, BeVarId},
    misc::hash_select::HashSet,
};

/// Outcome of [`BeWalker::on_set`]: whether the subgraph below the edge
/// is entered at all.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WalkCtl {
    Continue,
    Prune,
}

/// Visitor for [`BeManager::dfs`]. `on_set` is called for every edge
/// encountered and decides whether to enter it; `on_first` fires when a
/// node is reached for the first time, `on_back` when an already-visited
/// node is reached again, `on_last` after all children were traversed.
pub trait BeWalker {
    fn on_set(&mut self, _man: &BeManager, _e: BeId) -> WalkCtl {
        WalkCtl::Continue
    }
    fn on_first(&mut self, _man: &BeManager, _e: BeId) {}
    fn on_back(&mut self, _man: &BeManager, _e: BeId) {}
    fn on_last(&mut self, _man: &BeManager, _e: BeId) {}
}

impl BeManager {
    /// Iterative depth-first traversal from `root`. Each node is entered
    /// once; re-encounters report through [`BeWalker::on_back`].
    pub fn dfs(&self, root: BeId, walker: &mut dyn BeWalker) {
        enum Frame {
            Enter(BeId),
            Leave(BeId),
        }

        let mut visited: HashSet<crate::core::be_node::NodeId> = HashSet::default();
        let mut stack = vec![Frame::Enter(root)];

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter(e) => {
                    if walker.on_set(self, e) == WalkCtl::Prune {
                        continue;
                    }
                    if !visited.insert(e.node()) {
                        walker.on_back(self, e);
                        continue;
                    }
                    walker.on_first(self, e);
                    stack.push(Frame::Leave(e));
                    match self.op(e.node()) {
                        BeOp::True | BeOp::Var(_) => {}
                        BeOp::And(a, b) | BeOp::Iff(a, b) => {
                            stack.push(Frame::Enter(b));
                            stack.push(Frame::Enter(a));
                        }
                    }
                }
                Frame::Leave(e) => walker.on_last(self, e),
            }
        }
    }

    /// The set of variables occurring in `e`, in ascending index order.
    pub fn support(&self, e: BeId) -> Vec<BeVarId> {
        struct Support {
            vars: Vec<BeVarId>,
        }
        impl BeWalker for Support {
            fn on_first(&mut self, man: &BeManager, e: BeId) {
                if let BeOp::Var(v) = man.op(e.node()) {
                    self.vars.push(v);
                }
            }
        }

        let mut w = Support { vars: Vec::new() };
        self.dfs(e, &mut w);
        w.vars.sort_unstable();
        w.vars
    }

    /// Evaluates `e` under the assignment that sets exactly the listed
    /// variables to true.
    pub fn evaluate(&self, e: BeId, trues: &[BeVarId]) -> bool {
        let value = match self.op(e.node()) {
            BeOp::True => true,
            BeOp::Var(v) => trues.contains(&v),
            BeOp::And(a, b) => self.evaluate(a, trues) && self.evaluate(b, trues),
            BeOp::Iff(a, b) => self.evaluate(a, trues) == self.evaluate(b, trues),
        };
        value != e.is_complemented()
    }

    /// Number of distinct nodes reachable from `e`.
    pub fn size(&self, e: BeId) -> usize {
        struct Count {
            n: usize,
        }
        impl BeWalker for Count {
            fn on_first(&mut self, _man: &BeManager, _e: BeId) {
                self.n += 1;
            }
        }

        let mut w = Count { n: 0 };
        self.dfs(e, &mut w);
        w.n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn support_collects_each_var_once() {
        let mut man = BeManager::new();
        let x = man.var(BeVarId(0));
        let y = man.var(BeVarId(7));
        let a = man.and(x, y);
        let b = man.or(a, x);
        let f = man.iff(b, y);

        assert_eq!(man.support(f), vec![BeVarId(0), BeVarId(7)]);
    }

    #[test]
    fn size_counts_shared_nodes_once() {
        let mut man = BeManager::new();
        let x = man.var(BeVarId(0));
        let y = man.var(BeVarId(1));
        let a = man.and(x, y);
        let o = man.or(x, y);
        // x and y are shared between both children
        let f = man.and(a, o);
        assert_eq!(man.size(f), 5);
    }
}

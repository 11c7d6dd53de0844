//! The time-indexed variable store: a bijection between untimed model
//! variables and their per-step instances.
//!
//! Untimed indices are handed out when a symbol layer is committed;
//! timed instances are materialized lazily, up to a high-water bound that
//! grows as unrolling proceeds. State and input variables are duplicated
//! per step, frozen variables are shared across all steps. Reserved
//! indices are never reassigned, even after a layer is popped.

use crate::{
    core::be_manager::BeManager,
    core::be_node::{BeId, BeOp, BeVarId, NodeId},
    core::error::BmcError,
    core::symbols::{SymbolLayer, VarKind},
    misc::hash_select::HashMap,
};

/// Sentinel time of frozen and untimed variables.
pub const UNTIMED_CURRENT: i32 = -1;

/// What a BE variable index stands for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum VarClass {
    /// Untimed current-state instance of a model variable
    UntimedCurr,
    /// Untimed next-state instance of a state variable
    UntimedNext,
    /// Timed instance of a model variable at the given step
    Timed(i32),
    /// Auxiliary variable (tableau machinery); never shifted
    Aux,
}

#[derive(Debug, Clone)]
struct VarMeta {
    name: String,
    kind: VarKind,
    class: VarClass,
    /// The untimed current-state index this variable instantiates; for
    /// untimed variables, the index itself
    untimed: BeVarId,
    retired: bool,
}

struct LayerMark {
    name: String,
    first_var: usize,
    state_count: usize,
    frozen_count: usize,
    input_count: usize,
}

/// Decoded information about a variable index, the inverse of the timed
/// lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedInfo {
    pub untimed: BeVarId,
    pub time: i32,
    pub kind: VarKind,
}

pub struct BeEncoder {
    metas: Vec<VarMeta>,
    name2untimed: HashMap<String, BeVarId>,
    /// (untimed current index, time) -> timed index
    timed: HashMap<(BeVarId, i32), BeVarId>,
    /// untimed current index of a state var -> its untimed next index
    next_of: HashMap<BeVarId, BeVarId>,
    state_vars: Vec<BeVarId>,
    frozen_vars: Vec<BeVarId>,
    input_vars: Vec<BeVarId>,
    layers: Vec<LayerMark>,
    /// High-water unrolling bound; inputs are undefined at this time
    max_time: i32,
}

impl Default for BeEncoder {
    fn default() -> Self {
        BeEncoder {
            metas: Vec::new(),
            name2untimed: HashMap::default(),
            timed: HashMap::default(),
            next_of: HashMap::default(),
            state_vars: Vec::new(),
            frozen_vars: Vec::new(),
            input_vars: Vec::new(),
            layers: Vec::new(),
            max_time: 0,
        }
    }
}

impl BeEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, meta: VarMeta) -> BeVarId {
        let id = BeVarId(self.metas.len() as u32);
        self.metas.push(meta);
        id
    }

    /// Reserves untimed indices for all variables of `layer`. State
    /// variables additionally get an untimed next-state instance.
    pub fn commit_layer(&mut self, layer: &SymbolLayer) {
        let mark = LayerMark {
            name: layer.name().to_string(),
            first_var: self.metas.len(),
            state_count: self.state_vars.len(),
            frozen_count: self.frozen_vars.len(),
            input_count: self.input_vars.len(),
        };

        for (name, kind) in layer.vars() {
            debug_assert!(
                !self.name2untimed.contains_key(name),
                "variable {} committed twice",
                name
            );
            let id = self.alloc(VarMeta {
                name: name.to_string(),
                kind,
                class: VarClass::UntimedCurr,
                untimed: BeVarId(0),
                retired: false,
            });
            self.metas[id.0 as usize].untimed = id;
            self.name2untimed.insert(name.to_string(), id);
            match kind {
                VarKind::State => {
                    self.state_vars.push(id);
                    let next = self.alloc(VarMeta {
                        name: format!("next({})", name),
                        kind,
                        class: VarClass::UntimedNext,
                        untimed: id,
                        retired: false,
                    });
                    self.next_of.insert(id, next);
                }
                VarKind::Frozen => self.frozen_vars.push(id),
                VarKind::Input => self.input_vars.push(id),
            }
        }

        log::debug!(
            "committed layer '{}': {} state, {} frozen, {} input vars",
            layer.name(),
            self.state_vars.len() - mark.state_count,
            self.frozen_vars.len() - mark.frozen_count,
            self.input_vars.len() - mark.input_count
        );
        self.layers.push(mark);
    }

    /// Removes the most recently committed layer. Its indices are
    /// retired, never reassigned. Layers must be popped LIFO.
    pub fn pop_layer(&mut self, name: &str) -> Result<(), BmcError> {
        let top = match self.layers.last() {
            Some(m) => m.name.clone(),
            None => {
                return Err(BmcError::Type(format!("no layer {} to remove", name)))
            }
        };
        if top != name {
            return Err(BmcError::Type(format!(
                "layer {} is not the top of the stack (top is {})",
                name, top
            )));
        }
        let mark = self.layers.pop().unwrap();

        for idx in mark.first_var..self.metas.len() {
            let meta = &mut self.metas[idx];
            if !meta.retired {
                meta.retired = true;
                self.name2untimed.remove(&meta.name);
                self.next_of.remove(&BeVarId(idx as u32));
            }
        }
        self.state_vars.truncate(mark.state_count);
        self.frozen_vars.truncate(mark.frozen_count);
        self.input_vars.truncate(mark.input_count);
        Ok(())
    }

    /// A fresh variable outside the model space, used by the tableau
    /// encodings. Never duplicated per step, never shifted.
    pub fn fresh_aux_var(&mut self, name: &str) -> BeVarId {
        let id = self.alloc(VarMeta {
            name: name.to_string(),
            kind: VarKind::State,
            class: VarClass::Aux,
            untimed: BeVarId(0),
            retired: false,
        });
        self.metas[id.0 as usize].untimed = id;
        id
    }

    pub fn name_to_untimed(&self, name: &str) -> Option<BeVarId> {
        self.name2untimed.get(name).copied()
    }

    pub fn name_of(&self, v: BeVarId) -> &str {
        &self.metas[v.0 as usize].name
    }

    pub fn kind_of(&self, v: BeVarId) -> VarKind {
        self.metas[v.0 as usize].kind
    }

    pub fn is_aux(&self, v: BeVarId) -> bool {
        self.metas[v.0 as usize].class == VarClass::Aux
    }

    /// Untimed state variables, in commit order.
    pub fn state_vars(&self) -> &[BeVarId] {
        &self.state_vars
    }

    pub fn frozen_vars(&self) -> &[BeVarId] {
        &self.frozen_vars
    }

    pub fn input_vars(&self) -> &[BeVarId] {
        &self.input_vars
    }

    /// Untimed model variables of the given kinds, in commit order.
    pub fn untimed_vars(&self, kinds: &[VarKind]) -> Vec<BeVarId> {
        let mut out = Vec::new();
        for kind in kinds {
            match kind {
                VarKind::State => out.extend_from_slice(&self.state_vars),
                VarKind::Frozen => out.extend_from_slice(&self.frozen_vars),
                VarKind::Input => out.extend_from_slice(&self.input_vars),
            }
        }
        out
    }

    /// The untimed next-state instance of a state variable.
    pub fn next_of(&self, v: BeVarId) -> Option<BeVarId> {
        self.next_of.get(&v).copied()
    }

    pub fn max_time(&self) -> i32 {
        self.max_time
    }

    /// Raises the unrolling high-water mark.
    pub fn grow_to(&mut self, k: i32) {
        if k > self.max_time {
            self.max_time = k;
        }
    }

    /// The timed instance of `v` at time `t`. Frozen variables are shared
    /// (their time stays [`UNTIMED_CURRENT`]); input variables are
    /// undefined at the final time step; already-timed and auxiliary
    /// variables are returned unchanged.
    pub fn timed_var(&mut self, v: BeVarId, t: i32) -> Result<BeVarId, BmcError> {
        let class = self.metas[v.0 as usize].class;
        match class {
            VarClass::Timed(_) | VarClass::Aux => Ok(v),
            VarClass::UntimedNext => {
                let curr = self.metas[v.0 as usize].untimed;
                self.timed_var(curr, t + 1)
            }
            VarClass::UntimedCurr => {
                match self.metas[v.0 as usize].kind {
                    VarKind::Frozen => return Ok(v),
                    VarKind::Input if t >= self.max_time => {
                        return Err(BmcError::InvalidTimeForInput {
                            var: self.metas[v.0 as usize].name.clone(),
                            time: t,
                        });
                    }
                    _ => {}
                }
                if t < 0 || t > self.max_time {
                    return Err(BmcError::InvalidBound(format!(
                        "time {} outside the unrolled range 0..={}",
                        t, self.max_time
                    )));
                }
                if let Some(tv) = self.timed.get(&(v, t)) {
                    return Ok(*tv);
                }
                let name = format!("{}@{}", self.metas[v.0 as usize].name, t);
                let kind = self.metas[v.0 as usize].kind;
                let tv = self.alloc(VarMeta {
                    name,
                    kind,
                    class: VarClass::Timed(t),
                    untimed: v,
                    retired: false,
                });
                self.timed.insert((v, t), tv);
                Ok(tv)
            }
        }
    }

    /// The timed instance of `v` at `t` if it was already materialized,
    /// without allocating.
    pub fn peek_timed(&self, v: BeVarId, t: i32) -> Option<BeVarId> {
        if self.metas[v.0 as usize].kind == VarKind::Frozen {
            return Some(v);
        }
        self.timed.get(&(v, t)).copied()
    }

    /// Decodes a timed index back to (untimed index, time, kind).
    pub fn timed_info(&self, v: BeVarId) -> TimedInfo {
        let meta = &self.metas[v.0 as usize];
        let time = match meta.class {
            VarClass::Timed(t) => {
                if meta.kind == VarKind::Frozen {
                    UNTIMED_CURRENT
                } else {
                    t
                }
            }
            _ => UNTIMED_CURRENT,
        };
        TimedInfo {
            untimed: meta.untimed,
            time,
            kind: meta.kind,
        }
    }

    /// True for timed or untimed instances of model variables, false for
    /// tableau auxiliaries.
    pub fn is_model_var(&self, v: BeVarId) -> bool {
        !matches!(self.metas[v.0 as usize].class, VarClass::Aux)
    }

    /// Lifts an untimed expression to time `t`: every untimed variable is
    /// replaced by its timed instance, with next-state variables landing
    /// at `t + 1`. DAG-preserving and memoized per call; applying it to an
    /// already-timed expression is the identity.
    pub fn shift_to_time(
        &mut self,
        man: &mut BeManager,
        e: BeId,
        t: i32,
    ) -> Result<BeId, BmcError> {
        let mut memo: HashMap<NodeId, BeId> = HashMap::default();
        let shifted = self.shift_rec(man, e.node(), t, &mut memo)?;
        Ok(if e.is_complemented() { !shifted } else { shifted })
    }

    fn shift_rec(
        &mut self,
        man: &mut BeManager,
        node: NodeId,
        t: i32,
        memo: &mut HashMap<NodeId, BeId>,
    ) -> Result<BeId, BmcError> {
        if let Some(r) = memo.get(&node) {
            return Ok(*r);
        }
        let result = match man.op(node) {
            BeOp::True => BeId::TRUE,
            BeOp::Var(v) => {
                let tv = self.timed_var(v, t)?;
                man.var(tv)
            }
            BeOp::And(a, b) => {
                let ra = self.shift_edge(man, a, t, memo)?;
                let rb = self.shift_edge(man, b, t, memo)?;
                man.and(ra, rb)
            }
            BeOp::Iff(a, b) => {
                let ra = self.shift_edge(man, a, t, memo)?;
                let rb = self.shift_edge(man, b, t, memo)?;
                man.iff(ra, rb)
            }
        };
        memo.insert(node, result);
        Ok(result)
    }

    fn shift_edge(
        &mut self,
        man: &mut BeManager,
        e: BeId,
        t: i32,
        memo: &mut HashMap<NodeId, BeId>,
    ) -> Result<BeId, BmcError> {
        let r = self.shift_rec(man, e.node(), t, memo)?;
        Ok(if e.is_complemented() { !r } else { r })
    }

    /// Substitutes every untimed current-state variable with its untimed
    /// next-state instance; frozen variables are left alone. Fails for
    /// input variables, whose next instance does not exist.
    pub fn shift_to_next(&mut self, man: &mut BeManager, e: BeId) -> Result<BeId, BmcError> {
        let mut memo: HashMap<NodeId, BeId> = HashMap::default();
        let shifted = self.next_rec(man, e.node(), &mut memo)?;
        Ok(if e.is_complemented() { !shifted } else { shifted })
    }

    fn next_rec(
        &mut self,
        man: &mut BeManager,
        node: NodeId,
        memo: &mut HashMap<NodeId, BeId>,
    ) -> Result<BeId, BmcError> {
        if let Some(r) = memo.get(&node) {
            return Ok(*r);
        }
        let result = match man.op(node) {
            BeOp::True => BeId::TRUE,
            BeOp::Var(v) => match self.metas[v.0 as usize].kind {
                VarKind::Frozen => man.var(v),
                VarKind::Input => {
                    return Err(BmcError::UnsupportedFormula(format!(
                        "next() over input variable '{}'",
                        self.metas[v.0 as usize].name
                    )))
                }
                VarKind::State => {
                    let next = self.next_of(v).ok_or_else(|| {
                        BmcError::UnsupportedFormula(format!(
                            "no next-state instance for '{}'",
                            self.metas[v.0 as usize].name
                        ))
                    })?;
                    man.var(next)
                }
            },
            BeOp::And(a, b) => {
                let ra = self.next_edge(man, a, memo)?;
                let rb = self.next_edge(man, b, memo)?;
                man.and(ra, rb)
            }
            BeOp::Iff(a, b) => {
                let ra = self.next_edge(man, a, memo)?;
                let rb = self.next_edge(man, b, memo)?;
                man.iff(ra, rb)
            }
        };
        memo.insert(node, result);
        Ok(result)
    }

    fn next_edge(
        &mut self,
        man: &mut BeManager,
        e: BeId,
        memo: &mut HashMap<NodeId, BeId>,
    ) -> Result<BeId, BmcError> {
        let r = self.next_rec(man, e.node(), memo)?;
        Ok(if e.is_complemented() { !r } else { r })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc_with_layer() -> BeEncoder {
        let mut layer = SymbolLayer::new("model");
        layer
            .add_state_var("x")
            .add_state_var("y")
            .add_input_var("i")
            .add_frozen_var("c");
        let mut enc = BeEncoder::new();
        enc.commit_layer(&layer);
        enc
    }

    #[test]
    fn timed_lookup_is_injective() {
        let mut enc = enc_with_layer();
        enc.grow_to(3);
        let x = enc.name_to_untimed("x").unwrap();
        let y = enc.name_to_untimed("y").unwrap();

        let mut seen = std::collections::HashSet::new();
        for t in 0..=3 {
            assert!(seen.insert(enc.timed_var(x, t).unwrap()));
            assert!(seen.insert(enc.timed_var(y, t).unwrap()));
        }
    }

    #[test]
    fn timed_lookup_round_trips() {
        let mut enc = enc_with_layer();
        enc.grow_to(2);
        let x = enc.name_to_untimed("x").unwrap();
        let tx = enc.timed_var(x, 2).unwrap();
        let info = enc.timed_info(tx);
        assert_eq!(info.untimed, x);
        assert_eq!(info.time, 2);
        assert_eq!(info.kind, VarKind::State);
    }

    #[test]
    fn frozen_vars_are_shared_and_untimed() {
        let mut enc = enc_with_layer();
        enc.grow_to(4);
        let c = enc.name_to_untimed("c").unwrap();
        for t in 0..=4 {
            assert_eq!(enc.timed_var(c, t).unwrap(), c);
        }
        assert_eq!(enc.timed_info(c).time, UNTIMED_CURRENT);
    }

    #[test]
    fn inputs_are_undefined_at_the_final_step() {
        let mut enc = enc_with_layer();
        enc.grow_to(3);
        let i = enc.name_to_untimed("i").unwrap();
        assert!(enc.timed_var(i, 2).is_ok());
        assert!(matches!(
            enc.timed_var(i, 3),
            Err(BmcError::InvalidTimeForInput { .. })
        ));
    }

    #[test]
    fn next_vars_shift_one_step_further() {
        let mut enc = enc_with_layer();
        enc.grow_to(2);
        let x = enc.name_to_untimed("x").unwrap();
        let xn = enc.next_of(x).unwrap();
        assert_eq!(enc.timed_var(xn, 0).unwrap(), enc.timed_var(x, 1).unwrap());
    }

    #[test]
    fn shift_of_a_timed_expression_is_identity() {
        let mut man = BeManager::new();
        let mut enc = enc_with_layer();
        enc.grow_to(3);
        let x = enc.name_to_untimed("x").unwrap();
        let y = enc.name_to_untimed("y").unwrap();
        let bx = man.var(x);
        let by = man.var(y);
        let e = man.and(bx, by);

        let e1 = enc.shift_to_time(&mut man, e, 1).unwrap();
        let again = enc.shift_to_time(&mut man, e1, 0).unwrap();
        assert_eq!(e1, again);
    }

    #[test]
    fn layers_pop_in_lifo_order() {
        let mut enc = enc_with_layer();
        let mut extra = SymbolLayer::new("monitor");
        extra.add_state_var("m");
        enc.commit_layer(&extra);

        assert!(enc.name_to_untimed("m").is_some());
        assert!(enc.pop_layer("model").is_err());
        assert!(enc.pop_layer("monitor").is_ok());
        assert!(enc.name_to_untimed("m").is_none());
        // the original layer is untouched
        assert!(enc.name_to_untimed("x").is_some());
    }
}

//! The finite state machine in BE format: initial condition, invariant
//! condition, transition relation and fairness list, all as untimed
//! Boolean Expressions.

use crate::{
    core::be_manager::BeManager,
    core::be_node::BeId,
    core::conv::{sexp_to_be, Sexp, SexpCache},
    core::enc::BeEncoder,
    core::error::BmcError,
};

/// The boolean flattened FSM as delivered by the external flattener.
#[derive(Debug, Clone)]
pub struct SexpFsm {
    pub init: Sexp,
    pub invar: Sexp,
    pub trans: Sexp,
    pub fairness: Vec<Sexp>,
}

/// The FSM over untimed BE expressions. The transition relation refers
/// to current-state, input and next-state variables.
#[derive(Debug, Clone)]
pub struct BeFsm {
    init: BeId,
    invar: BeId,
    trans: BeId,
    fairness: Vec<BeId>,
}

impl BeFsm {
    pub fn new(init: BeId, invar: BeId, trans: BeId, fairness: Vec<BeId>) -> Self {
        BeFsm {
            init,
            invar,
            trans,
            fairness,
        }
    }

    pub fn from_sexp_fsm(
        man: &mut BeManager,
        enc: &mut BeEncoder,
        cache: &mut SexpCache,
        fsm: &SexpFsm,
    ) -> Result<Self, BmcError> {
        let init = sexp_to_be(man, enc, cache, &fsm.init)?;
        let invar = sexp_to_be(man, enc, cache, &fsm.invar)?;
        let trans = sexp_to_be(man, enc, cache, &fsm.trans)?;
        let fairness = fsm
            .fairness
            .iter()
            .map(|f| sexp_to_be(man, enc, cache, f))
            .collect::<Result<Vec<_>, _>>()?;
        log::info!(
            "BE fsm built: init size {}, invar size {}, trans size {}, {} fairness conditions",
            man.size(init),
            man.size(invar),
            man.size(trans),
            fairness.len()
        );
        Ok(BeFsm::new(init, invar, trans, fairness))
    }

    pub fn init(&self) -> BeId {
        self.init
    }

    pub fn invar(&self) -> BeId {
        self.invar
    }

    pub fn trans(&self) -> BeId {
        self.trans
    }

    pub fn fairness(&self) -> &[BeId] {
        &self.fairness
    }

    /// Synchronous product: init, invar and trans are conjoined, the
    /// fairness lists are concatenated.
    pub fn apply_synchronous_product(&mut self, man: &mut BeManager, other: &BeFsm) {
        self.init = man.and(self.init, other.init);
        self.invar = man.and(self.invar, other.invar);
        self.trans = man.and(self.trans, other.trans);
        self.fairness.extend_from_slice(&other.fairness);
    }
}

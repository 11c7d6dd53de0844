//! The bounded model checking pipeline: problem generation, the
//! invariant and LTL checking algorithms, dumping, trace reconstruction
//! and SAT-based simulation.

pub mod demo;
pub mod dump;
pub mod invar;
pub mod invar_inc;
pub mod ltl_check;
pub mod model;
pub mod options;
pub mod sbmc;
pub mod simulate;
pub mod trace;
pub mod utils;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{
    core::be_manager::BeManager,
    core::conv::SexpCache,
    core::enc::BeEncoder,
    core::error::BmcError,
    core::fsm::{BeFsm, SexpFsm},
    core::symbols::SymbolTable,
};

use self::trace::Trace;

/// Verdict of a checking algorithm. Errors travel separately through
/// `Result`.
#[derive(Debug)]
pub enum CheckOutcome {
    /// The property holds
    True,
    /// The property is violated; the witness trace is attached
    False(Trace),
    /// The bound was exhausted without an answer
    Unknown,
}

/// The per-session context: one manager, one encoder, one conversion
/// cache and at most one built model. Algorithms treat it as append-only
/// apart from LIFO tableau layers.
pub struct BmcEnv {
    pub man: BeManager,
    pub enc: BeEncoder,
    pub symbols: SymbolTable,
    pub cache: SexpCache,
    fsm: Option<BeFsm>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl BmcEnv {
    /// Creates the context and commits every layer of the symbol table.
    pub fn new(symbols: SymbolTable) -> Self {
        let mut enc = BeEncoder::new();
        for layer in symbols.layers() {
            enc.commit_layer(layer);
        }
        BmcEnv {
            man: BeManager::new(),
            enc,
            symbols,
            cache: SexpCache::default(),
            fsm: None,
            interrupt: None,
        }
    }

    /// Builds the BE FSM out of the boolean flattened one (`bmc_setup`).
    /// With `force`, an already built model is rebuilt.
    pub fn setup(&mut self, fsm: &SexpFsm, force: bool) -> Result<(), BmcError> {
        if self.fsm.is_some() && !force {
            return Err(BmcError::Type(
                "the BE model is already built (use -f to force)".to_string(),
            ));
        }
        let be_fsm = BeFsm::from_sexp_fsm(&mut self.man, &mut self.enc, &mut self.cache, fsm)?;
        self.fsm = Some(be_fsm);
        Ok(())
    }

    pub fn is_set_up(&self) -> bool {
        self.fsm.is_some()
    }

    pub fn fsm(&self) -> Result<&BeFsm, BmcError> {
        self.fsm.as_ref().ok_or(BmcError::ModelNotBuilt)
    }

    pub fn fsm_cloned(&self) -> Result<BeFsm, BmcError> {
        self.fsm.clone().ok_or(BmcError::ModelNotBuilt)
    }

    /// Installs the cancellation flag checked at every SAT call boundary
    /// and iteration head.
    pub fn set_interrupt_flag(&mut self, flag: Arc<AtomicBool>) {
        self.interrupt = Some(flag);
    }

    pub fn check_interrupted(&self) -> Result<(), BmcError> {
        match &self.interrupt {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(BmcError::Interrupted),
            _ => Ok(()),
        }
    }
}

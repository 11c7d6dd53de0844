//! Counterexample traces and their reconstruction out of a SAT model.

use std::collections::BTreeMap;
use std::fmt;

use crate::{
    core::be_manager::BeManager,
    core::cnf::CnfVarId,
    core::enc::BeEncoder,
    core::symbols::{SymbolTable, VarKind},
    misc::hash_select::HashMap,
    solver::Lit,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceValue {
    Bool(bool),
    Scalar(u64),
}

impl fmt::Display for TraceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceValue::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            TraceValue::Scalar(v) => write!(f, "{}", v),
        }
    }
}

/// One step of a trace. Input assignments belong to the transition
/// *entering* this step, so step 0 carries none.
#[derive(Debug, Clone, Default)]
pub struct TraceStep {
    pub assignments: BTreeMap<String, TraceValue>,
}

/// An ordered sequence of k+1 steps, optionally marked with the loop
/// start of an infinite counterexample. Frozen variables appear at step 0.
#[derive(Debug, Clone)]
pub struct Trace {
    pub desc: String,
    pub steps: Vec<TraceStep>,
    pub loopback: Option<i32>,
}

impl Trace {
    pub fn bound(&self) -> i32 {
        self.steps.len() as i32 - 1
    }

    /// Value of a variable at a step, if assigned.
    pub fn value(&self, step: usize, name: &str) -> Option<&TraceValue> {
        self.steps.get(step)?.assignments.get(name)
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Trace Description: {}", self.desc)?;
        for (i, step) in self.steps.iter().enumerate() {
            if self.loopback == Some(i as i32) {
                writeln!(f, "-- Loop starts here")?;
            }
            writeln!(f, "-> State: {} <-", i)?;
            for (name, value) in &step.assignments {
                writeln!(f, "    {} = {}", name, value)?;
            }
        }
        Ok(())
    }
}

/// Builds a complete trace out of a CNF model.
///
/// Every literal is mapped back through the CNF back-map and the
/// encoder; inputs land one step after their BE time, frozen variables
/// at step 0, tableau auxiliaries are dropped. Bits of a scalar are
/// collapsed through the symbol table; positions the model left
/// unassigned default to false.
pub fn trace_from_cnf_model(
    man: &BeManager,
    enc: &BeEncoder,
    symbols: &SymbolTable,
    desc: &str,
    model: &[Lit],
    k: i32,
) -> Trace {
    let mut steps = vec![TraceStep::default(); (k + 1) as usize];
    // (scalar name, step) -> bit values, least significant first
    let mut scalar_bits: HashMap<(String, usize), Vec<Option<bool>>> = HashMap::default();
    let mut bit_assign: Vec<(usize, String, bool)> = Vec::new();

    for &lit in model {
        let cnf_var = CnfVarId(lit.unsigned_abs());
        let var = match man.cnf_var_to_model_var(cnf_var) {
            Some(v) => v,
            None => continue, // Tseitin auxiliary
        };
        if !enc.is_model_var(var) {
            continue; // tableau machinery
        }
        let info = enc.timed_info(var);
        let step = match info.kind {
            VarKind::Frozen => 0,
            VarKind::State if info.time >= 0 => info.time as usize,
            // input precedes the next state, so it is stored one step up
            VarKind::Input if info.time >= 0 => (info.time + 1) as usize,
            // untimed instances do not occur in solved problems
            _ => continue,
        };
        if step > k as usize {
            continue;
        }
        bit_assign.push((step, enc.name_of(info.untimed).to_string(), lit > 0));
    }

    for (step, name, value) in bit_assign {
        // variables outside the committed symbol table (tableau monitor
        // layers) do not belong in the trace
        if symbols.kind_of(&name).is_none() && symbols.scalar_of_bit(&name).is_none() {
            continue;
        }
        match symbols.scalar_of_bit(&name) {
            Some((group, pos)) => {
                let bits = scalar_bits
                    .entry((group.name.clone(), step))
                    .or_insert_with(|| vec![None; group.bits.len()]);
                bits[pos] = Some(value);
            }
            None => {
                steps[step]
                    .assignments
                    .insert(name, TraceValue::Bool(value));
            }
        }
    }

    for ((name, step), bits) in scalar_bits {
        let value = bits
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == Some(true))
            .fold(0u64, |acc, (i, _)| acc | 1 << i);
        steps[step].assignments.insert(name, TraceValue::Scalar(value));
    }

    let mut trace = Trace {
        desc: desc.to_string(),
        steps,
        loopback: None,
    };
    complete_trace(&mut trace, enc, symbols, k);
    trace
}

/// Fills the positions the SAT model left open, so the trace is complete
/// and executable: state variables at every step, inputs from step 1 on,
/// frozen variables at step 0. Booleans default to false, scalars to 0.
fn complete_trace(trace: &mut Trace, enc: &BeEncoder, symbols: &SymbolTable, k: i32) {
    let mut scalar_names: Vec<(String, VarKind)> = Vec::new();
    let mut bool_names: Vec<(String, VarKind)> = Vec::new();

    for kind in [VarKind::State, VarKind::Frozen, VarKind::Input] {
        for &v in enc.untimed_vars(&[kind]).iter() {
            let name = enc.name_of(v);
            match symbols.scalar_of_bit(name) {
                Some((group, _)) => {
                    if !scalar_names.iter().any(|(n, _)| n == &group.name) {
                        scalar_names.push((group.name.clone(), kind));
                    }
                }
                None => bool_names.push((name.to_string(), kind)),
            }
        }
    }

    for step in 0..=k as usize {
        for (name, kind) in scalar_names.iter().chain(bool_names.iter()) {
            let defined = match kind {
                VarKind::State => true,
                VarKind::Frozen => step == 0,
                VarKind::Input => step > 0,
            };
            if !defined {
                continue;
            }
            let default = match symbols.scalar_of_bit(name) {
                Some(_) => TraceValue::Scalar(0),
                None => match symbols.scalar_groups().any(|g| &g.name == name) {
                    true => TraceValue::Scalar(0),
                    false => TraceValue::Bool(false),
                },
            };
            trace.steps[step]
                .assignments
                .entry(name.clone())
                .or_insert(default);
        }
    }
}

/// Inspects which loop equality the model satisfied: the first l whose
/// state assignment coincides with step k, scanned in increasing order.
/// Input assignments take no part in the comparison.
pub fn detect_loopback(trace: &mut Trace, symbols: &SymbolTable) {
    let k = trace.bound();
    if k < 1 {
        return;
    }
    let is_state = |name: &str| -> bool {
        match symbols.kind_of(name) {
            Some(kind) => kind == VarKind::State,
            // a scalar: kind of its first bit
            None => symbols
                .scalar_groups()
                .find(|g| g.name == name)
                .and_then(|g| symbols.kind_of(&g.bits[0]))
                .map(|kind| kind == VarKind::State)
                .unwrap_or(false),
        }
    };

    let state_of = |step: usize| -> Vec<(&String, &TraceValue)> {
        trace.steps[step]
            .assignments
            .iter()
            .filter(|(name, _)| is_state(name))
            .collect()
    };

    let last = state_of(k as usize);
    for l in 0..k {
        if state_of(l as usize) == last {
            trace.loopback = Some(l);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bmc::demo;
    use crate::bmc::model::path_with_init;
    use crate::bmc::BmcEnv;
    use crate::solver::dpll::DpllSolver;
    use crate::solver::{solve_problem, SatOutcome, SatSolver};

    #[test]
    fn trace_of_the_counter_path_is_complete_and_consistent() {
        let (symbols, fsm, _) = demo::mod4_counter();
        let mut env = BmcEnv::new(symbols);
        env.setup(&fsm, false).unwrap();
        let be_fsm = env.fsm_cloned().unwrap();

        let k = 3;
        let problem = path_with_init(&mut env.man, &mut env.enc, &be_fsm, k).unwrap();
        let cnf = env.man.to_cnf(problem);
        let mut solver = DpllSolver::new();
        assert_eq!(solve_problem(&mut solver, &cnf).unwrap(), SatOutcome::Sat);

        let trace = trace_from_cnf_model(
            &env.man,
            &env.enc,
            &env.symbols,
            "BMC counterexample",
            solver.model(),
            k,
        );

        assert_eq!(trace.steps.len(), 4);
        // the counter is deterministic from x=0: 0, 1, 2, 3
        for (i, expected) in [0u64, 1, 2, 3].iter().enumerate() {
            assert_eq!(
                trace.value(i, "x"),
                Some(&TraceValue::Scalar(*expected)),
                "step {}",
                i
            );
        }
    }

    #[test]
    fn loopback_detection_finds_the_first_matching_state() {
        let (symbols, _, _) = demo::mod4_counter();
        let mut steps = vec![TraceStep::default(); 5];
        for (i, v) in [0u64, 1, 2, 1, 2].iter().enumerate() {
            steps[i]
                .assignments
                .insert("x".to_string(), TraceValue::Scalar(*v));
        }
        let mut trace = Trace {
            desc: String::new(),
            steps,
            loopback: None,
        };
        detect_loopback(&mut trace, &symbols);
        assert_eq!(trace.loopback, Some(2));
    }
}

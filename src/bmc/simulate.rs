//! SAT-based simulation: picking an initial state, stepping the machine
//! through one-step problems, and checking candidate constraints for
//! deadlock freedom.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{
    bmc::trace::{Trace, TraceStep, TraceValue},
    bmc::BmcEnv,
    core::be_node::{BeId, BeVarId},
    core::conv::{sexp_to_be, Sexp},
    core::error::BmcError,
    solver::{solve_problem, SatOutcome, SatSolver},
};

/// How the next state is chosen among the satisfying assignments.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SimMode {
    /// The first satisfying assignment found
    Deterministic,
    /// Uniform among the enumerated assignments
    Random,
}

#[derive(Debug, Clone)]
pub struct SimParams {
    pub steps: i32,
    pub mode: SimMode,
    /// Seed of the random mode; fresh entropy when absent
    pub seed: Option<u64>,
    /// Constraint over current and next state, applied at every step
    pub constraint: Option<Sexp>,
}

impl SimParams {
    pub fn new(steps: i32) -> Self {
        SimParams {
            steps,
            mode: SimMode::Deterministic,
            seed: None,
            constraint: None,
        }
    }
}

/// A full assignment to the untimed state (and frozen) variables.
pub type State = Vec<(BeVarId, bool)>;

/// Cap on enumerated choices, for the random and interactive modes.
const MAX_ENUMERATED: usize = 64;

fn state_literals(env: &mut BmcEnv, state: &State, time: i32) -> Result<BeId, BmcError> {
    let mut acc = BeId::TRUE;
    for &(var, value) in state {
        let timed = env.enc.timed_var(var, time)?;
        let be = env.man.var(timed);
        let lit = if value { be } else { !be };
        acc = env.man.and(acc, lit);
    }
    Ok(acc)
}

fn state_from_model(env: &mut BmcEnv, model: &[i32], time: i32) -> Result<State, BmcError> {
    let mut state = State::new();
    let vars: Vec<BeVarId> = env
        .enc
        .state_vars()
        .iter()
        .chain(env.enc.frozen_vars())
        .copied()
        .collect();
    for var in vars {
        let timed = env.enc.timed_var(var, time)?;
        let value = env
            .man
            .find_var_node(timed)
            .and_then(|node| env.man.peek_cnf_var(node))
            .map(|cnf_var| model.contains(&(cnf_var.0 as i32)))
            .unwrap_or(false);
        state.push((var, value));
    }
    Ok(state)
}

/// Enumerates states satisfying `problem` at `time`, blocking each found
/// assignment, up to the enumeration cap.
fn enumerate_states(
    env: &mut BmcEnv,
    mk_solver: &dyn Fn() -> Box<dyn SatSolver>,
    problem: BeId,
    time: i32,
    limit: usize,
) -> Result<Vec<State>, BmcError> {
    let mut found = Vec::new();
    let mut blocked = problem;
    while found.len() < limit {
        env.check_interrupted()?;
        let cnf = env.man.to_cnf(blocked);
        let mut solver = mk_solver();
        let outcome =
            solve_problem(solver.as_mut(), &cnf).map_err(|e| BmcError::Solver(e.0))?;
        if outcome == SatOutcome::Unsat {
            break;
        }
        let state = state_from_model(env, solver.model(), time)?;
        let assignment = state_literals(env, &state, time)?;
        blocked = env.man.and(blocked, !assignment);
        found.push(state);
    }
    Ok(found)
}

fn choose(states: Vec<State>, mode: SimMode, rng: &mut StdRng) -> Option<State> {
    if states.is_empty() {
        return None;
    }
    match mode {
        SimMode::Deterministic => states.into_iter().next(),
        SimMode::Random => {
            let idx = rng.gen_range(0..states.len());
            states.into_iter().nth(idx)
        }
    }
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

/// Picks a state satisfying init, invar and the optional constraint
/// (`bmc_pick_state`).
pub fn pick_state(
    env: &mut BmcEnv,
    mk_solver: &dyn Fn() -> Box<dyn SatSolver>,
    constraint: Option<&Sexp>,
    mode: SimMode,
    seed: Option<u64>,
) -> Result<Option<State>, BmcError> {
    let fsm = env.fsm_cloned()?;
    let mut problem = crate::bmc::model::init0(&mut env.man, &mut env.enc, &fsm)?;
    if let Some(c) = constraint {
        let be = sexp_to_be(&mut env.man, &mut env.enc, &mut env.cache, c)?;
        let at0 = env.enc.shift_to_time(&mut env.man, be, 0)?;
        problem = env.man.and(problem, at0);
    }

    let limit = match mode {
        SimMode::Deterministic => 1,
        SimMode::Random => MAX_ENUMERATED,
    };
    let states = enumerate_states(env, mk_solver, problem, 0, limit)?;
    let mut rng = make_rng(seed);
    Ok(choose(states, mode, &mut rng))
}

/// Enumerates the successor choices of `from` under the transition
/// relation and the optional constraint; used for interactive selection.
pub fn next_state_choices(
    env: &mut BmcEnv,
    mk_solver: &dyn Fn() -> Box<dyn SatSolver>,
    from: &State,
    constraint: Option<&Sexp>,
    limit: usize,
) -> Result<Vec<State>, BmcError> {
    let problem = one_step_problem(env, from, constraint)?;
    enumerate_states(env, mk_solver, problem, 1, limit.min(MAX_ENUMERATED))
}

/// `s(0) ∧ Inv(0) ∧ T(0,1) ∧ Inv(1) ∧ c`, with the constraint shifted so
/// `next()` lands on time 1.
fn one_step_problem(
    env: &mut BmcEnv,
    from: &State,
    constraint: Option<&Sexp>,
) -> Result<BeId, BmcError> {
    let fsm = env.fsm_cloned()?;
    env.enc.grow_to(1);
    let current = state_literals(env, from, 0)?;
    let step = crate::bmc::model::unrolling(&mut env.man, &mut env.enc, &fsm, 0, 1)?;
    let mut problem = env.man.and(current, step);
    if let Some(c) = constraint {
        let be = sexp_to_be(&mut env.man, &mut env.enc, &mut env.cache, c)?;
        let shifted = env.enc.shift_to_time(&mut env.man, be, 0)?;
        problem = env.man.and(problem, shifted);
    }
    Ok(problem)
}

/// Steps the machine `params.steps` times from `from`, returning the
/// resulting trace. Stops early on a deadlock.
pub fn simulate(
    env: &mut BmcEnv,
    mk_solver: &dyn Fn() -> Box<dyn SatSolver>,
    from: &State,
    params: &SimParams,
) -> Result<Trace, BmcError> {
    let mut rng = make_rng(params.seed);
    let mut steps = vec![state_into_step(env, from)];
    let mut current = from.clone();

    for n in 0..params.steps {
        env.check_interrupted()?;
        let limit = match params.mode {
            SimMode::Deterministic => 1,
            SimMode::Random => MAX_ENUMERATED,
        };
        let problem = one_step_problem(env, &current, params.constraint.as_ref())?;
        let choices = enumerate_states(env, mk_solver, problem, 1, limit)?;
        match choose(choices, params.mode, &mut rng) {
            Some(next) => {
                steps.push(state_into_step(env, &next));
                current = next;
            }
            None => {
                log::warn!("simulation deadlocked after {} steps", n);
                break;
            }
        }
    }

    Ok(Trace {
        desc: "Simulation Trace".to_string(),
        steps,
        loopback: None,
    })
}

/// One SAT call per candidate constraint against the current state and
/// the transition relation; reports which do not deadlock.
pub fn check_feasible_constraints(
    env: &mut BmcEnv,
    mk_solver: &dyn Fn() -> Box<dyn SatSolver>,
    from: &State,
    constraints: &[Sexp],
) -> Result<Vec<bool>, BmcError> {
    let mut feasible = Vec::with_capacity(constraints.len());
    for c in constraints {
        env.check_interrupted()?;
        let problem = one_step_problem(env, from, Some(c))?;
        let cnf = env.man.to_cnf(problem);
        let mut solver = mk_solver();
        let outcome =
            solve_problem(solver.as_mut(), &cnf).map_err(|e| BmcError::Solver(e.0))?;
        feasible.push(outcome == SatOutcome::Sat);
    }
    Ok(feasible)
}

/// Renders a state into a trace step, collapsing scalar bits.
fn state_into_step(env: &BmcEnv, state: &State) -> TraceStep {
    let mut step = TraceStep::default();
    let mut scalars: std::collections::BTreeMap<String, u64> = Default::default();
    for &(var, value) in state {
        let name = env.enc.name_of(var);
        match env.symbols.scalar_of_bit(name) {
            Some((group, pos)) => {
                let entry = scalars.entry(group.name.clone()).or_insert(0);
                if value {
                    *entry |= 1 << pos;
                }
            }
            None => {
                step.assignments
                    .insert(name.to_string(), TraceValue::Bool(value));
            }
        }
    }
    for (name, value) in scalars {
        step.assignments.insert(name, TraceValue::Scalar(value));
    }
    step
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bmc::demo;
    use crate::solver::dpll::DpllSolver;

    fn counter_env() -> BmcEnv {
        let (symbols, fsm, _) = demo::mod4_counter();
        let mut env = BmcEnv::new(symbols);
        env.setup(&fsm, false).unwrap();
        env
    }

    fn mk_solver() -> Box<dyn SatSolver> {
        Box::new(DpllSolver::new())
    }

    #[test]
    fn pick_state_returns_the_initial_state() {
        let mut env = counter_env();
        let state = pick_state(&mut env, &mk_solver, None, SimMode::Deterministic, None)
            .unwrap()
            .unwrap();
        // init forces x = 0
        assert!(state.iter().all(|(_, v)| !v));
    }

    #[test]
    fn pick_state_honors_the_constraint() {
        let mut env = counter_env();
        // x = 0 is the only initial state, so constraining x.0 deadlocks
        let c = Sexp::var("x.0");
        let state =
            pick_state(&mut env, &mk_solver, Some(&c), SimMode::Deterministic, None)
                .unwrap();
        assert!(state.is_none());
    }

    #[test]
    fn simulation_follows_the_counter() {
        let mut env = counter_env();
        let start = pick_state(&mut env, &mk_solver, None, SimMode::Deterministic, None)
            .unwrap()
            .unwrap();
        let trace = simulate(&mut env, &mk_solver, &start, &SimParams::new(4)).unwrap();
        assert_eq!(trace.steps.len(), 5);
        for (i, expected) in [0u64, 1, 2, 3, 0].iter().enumerate() {
            assert_eq!(
                trace.value(i, "x"),
                Some(&TraceValue::Scalar(*expected)),
                "step {}",
                i
            );
        }
    }

    #[test]
    fn feasibility_check_separates_live_and_dead_constraints() {
        let mut env = counter_env();
        let start = pick_state(&mut env, &mk_solver, None, SimMode::Deterministic, None)
            .unwrap()
            .unwrap();
        // from x=0 the successor is x=1: next(x.0) holds, next(x.1) not
        let live = Sexp::next_var("x.0");
        let dead = Sexp::next_var("x.1");
        let feasible =
            check_feasible_constraints(&mut env, &mk_solver, &start, &[live, dead])
                .unwrap();
        assert_eq!(feasible, vec![true, false]);
    }

    #[test]
    fn random_simulation_is_reproducible_with_a_seed() {
        let (symbols, fsm, _) = demo::mutex();
        let mut env = BmcEnv::new(symbols);
        env.setup(&fsm, false).unwrap();
        let start = pick_state(&mut env, &mk_solver, None, SimMode::Deterministic, None)
            .unwrap()
            .unwrap();
        let mut params = SimParams::new(3);
        params.mode = SimMode::Random;
        params.seed = Some(7);
        let a = simulate(&mut env, &mk_solver, &start, &params).unwrap();
        let b = simulate(&mut env, &mk_solver, &start, &params).unwrap();
        for (sa, sb) in a.steps.iter().zip(&b.steps) {
            assert_eq!(sa.assignments, sb.assignments);
        }
    }
}

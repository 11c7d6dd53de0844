//! Non-incremental invariant checking: classic k-induction, the
//! Eén–Sörensson scheme and plain falsification. Each query gets a fresh
//! SAT instance; the strategies share the problem builders below.

use enum_dispatch::enum_dispatch;

use crate::{
    bmc::model::{path_with_init, simple_path, unrolling},
    bmc::options::InvarAlgName,
    bmc::trace::trace_from_cnf_model,
    bmc::utils::{expand_filename_macros, Loopback},
    bmc::{BmcEnv, CheckOutcome},
    core::be_node::BeId,
    core::conv::{sexp_to_be, Sexp},
    core::error::BmcError,
    core::fsm::BeFsm,
    solver::{solve_problem, SatOutcome, SatSolver},
};

/// Per-command parameters of an invariant check.
#[derive(Debug, Clone)]
pub struct InvarParams {
    pub max_k: i32,
    /// Strengthened induction step of Eén–Sörensson
    pub extra_step: bool,
    pub dump_template: Option<String>,
    pub input_file: String,
    pub prop_idx: Option<usize>,
    pub dump_only: bool,
}

impl InvarParams {
    pub fn new(max_k: i32) -> Self {
        InvarParams {
            max_k,
            extra_step: false,
            dump_template: None,
            input_file: "model".to_string(),
            prop_idx: None,
            dump_only: false,
        }
    }
}

pub type SolverFactory<'a> = &'a dyn Fn() -> Box<dyn SatSolver>;

#[enum_dispatch(InvarAlgorithmEnum)]
pub trait InvarAlgorithm {
    fn check(
        &self,
        env: &mut BmcEnv,
        mk_solver: SolverFactory,
        phi: &Sexp,
        params: &InvarParams,
    ) -> Result<CheckOutcome, BmcError>;
}

#[enum_dispatch]
pub enum InvarAlgorithmEnum {
    ClassicInvar,
    EenSorensson,
    FalsificationOnly,
}

/// Maps the option name onto the strategy.
pub fn invar_algorithm(name: InvarAlgName, extra_step: bool) -> InvarAlgorithmEnum {
    match name {
        InvarAlgName::Classic => ClassicInvar::default().into(),
        InvarAlgName::EenSorensson => EenSorensson { extra_step }.into(),
        InvarAlgName::Falsification => FalsificationOnly::default().into(),
    }
}

struct InvarQueries<'a> {
    env: &'a mut BmcEnv,
    fsm: BeFsm,
    phi: BeId,
}

impl<'a> InvarQueries<'a> {
    fn new(env: &'a mut BmcEnv, phi: &Sexp) -> Result<Self, BmcError> {
        let fsm = env.fsm_cloned()?;
        let phi = sexp_to_be(&mut env.man, &mut env.enc, &mut env.cache, phi)?;
        Ok(InvarQueries { env, fsm, phi })
    }

    fn phi_at(&mut self, t: i32) -> Result<BeId, BmcError> {
        self.env.enc.grow_to(t);
        self.env.enc.shift_to_time(&mut self.env.man, self.phi, t)
    }

    /// `I(0) ∧ path(n) ∧ !φ(n)`
    fn falsification(&mut self, n: i32) -> Result<BeId, BmcError> {
        let path = path_with_init(&mut self.env.man, &mut self.env.enc, &self.fsm, n)?;
        let bad = self.phi_at(n)?;
        Ok(self.env.man.and(path, !bad))
    }

    /// `path(j..n) ∧ loop-free(n) ∧ ⋀_{i<n} φ(i) ∧ !φ(n)`, the induction
    /// step without initial states.
    fn induction_step(&mut self, n: i32) -> Result<BeId, BmcError> {
        let path = unrolling(&mut self.env.man, &mut self.env.enc, &self.fsm, 0, n)?;
        let unique = simple_path(&mut self.env.man, &mut self.env.enc, n)?;
        let mut acc = self.env.man.and(path, unique);
        for i in 0..n {
            let good = self.phi_at(i)?;
            acc = self.env.man.and(acc, good);
        }
        let bad = self.phi_at(n)?;
        Ok(self.env.man.and(acc, !bad))
    }

    fn solve(
        &mut self,
        mk_solver: SolverFactory,
        problem: BeId,
        n: i32,
        params: &InvarParams,
    ) -> Result<Option<CheckOutcome>, BmcError> {
        let cnf = self.env.man.to_cnf(problem);
        if let Some(template) = &params.dump_template {
            let name = expand_filename_macros(
                template,
                n,
                Loopback::NoLoop,
                params.prop_idx,
                &params.input_file,
            );
            let path = std::path::PathBuf::from(format!("{}.dimacs", name));
            crate::bmc::dump::write_invar_dimacs_file(
                &self.env.man,
                &self.env.enc,
                &cnf,
                &path,
            )?;
        }
        if params.dump_only {
            return Ok(None);
        }

        self.env.check_interrupted()?;
        let mut solver = mk_solver();
        let outcome =
            solve_problem(solver.as_mut(), &cnf).map_err(|e| BmcError::Solver(e.0))?;
        match outcome {
            SatOutcome::Sat => {
                let trace = trace_from_cnf_model(
                    &self.env.man,
                    &self.env.enc,
                    &self.env.symbols,
                    "BMC Counterexample",
                    solver.model(),
                    n,
                );
                Ok(Some(CheckOutcome::False(trace)))
            }
            SatOutcome::Unsat => Ok(None),
        }
    }

    fn solve_unsat_proves(
        &mut self,
        mk_solver: SolverFactory,
        problem: BeId,
    ) -> Result<bool, BmcError> {
        if problem.is_false() {
            return Ok(true);
        }
        self.env.check_interrupted()?;
        let cnf = self.env.man.to_cnf(problem);
        let mut solver = mk_solver();
        let outcome =
            solve_problem(solver.as_mut(), &cnf).map_err(|e| BmcError::Solver(e.0))?;
        Ok(outcome == SatOutcome::Unsat)
    }
}

/// Classic k-induction: per n, a base query refuting the property on an
/// initialized path, and an inductive step on `n+1` transitions.
#[derive(Default)]
pub struct ClassicInvar {}

impl InvarAlgorithm for ClassicInvar {
    fn check(
        &self,
        env: &mut BmcEnv,
        mk_solver: SolverFactory,
        phi: &Sexp,
        params: &InvarParams,
    ) -> Result<CheckOutcome, BmcError> {
        let mut q = InvarQueries::new(env, phi)?;

        for n in 0..=params.max_k {
            q.env.check_interrupted()?;
            log::info!("classic invariant check, depth {}", n);

            let base = q.falsification(n)?;
            if let Some(out) = q.solve(mk_solver, base, n, params)? {
                return Ok(out);
            }
            if params.dump_only {
                continue;
            }

            // step without uniqueness, the plain induction of depth n
            let path =
                unrolling(&mut q.env.man, &mut q.env.enc, &q.fsm, 0, n + 1)?;
            let mut step = path;
            for i in 0..=n {
                let good = q.phi_at(i)?;
                step = q.env.man.and(step, good);
            }
            let bad = q.phi_at(n + 1)?;
            step = q.env.man.and(step, !bad);
            if q.solve_unsat_proves(mk_solver, step)? {
                log::info!("induction step closed at depth {}", n);
                return Ok(CheckOutcome::True);
            }
        }
        Ok(CheckOutcome::Unknown)
    }
}

/// The Eén–Sörensson scheme: interleaved falsification and loop-free
/// induction, optionally with the strengthened extra step.
pub struct EenSorensson {
    pub extra_step: bool,
}

impl InvarAlgorithm for EenSorensson {
    fn check(
        &self,
        env: &mut BmcEnv,
        mk_solver: SolverFactory,
        phi: &Sexp,
        params: &InvarParams,
    ) -> Result<CheckOutcome, BmcError> {
        let mut q = InvarQueries::new(env, phi)?;

        for n in 0..=params.max_k {
            q.env.check_interrupted()?;
            log::info!("een-sorensson, depth {}", n);

            let fals = q.falsification(n)?;
            if let Some(out) = q.solve(mk_solver, fals, n, params)? {
                return Ok(out);
            }
            if params.dump_only {
                continue;
            }

            let step = q.induction_step(n)?;
            if q.solve_unsat_proves(mk_solver, step)? {
                return Ok(CheckOutcome::True);
            }

            if self.extra_step {
                let strengthened = q.induction_step(n + 1)?;
                if q.solve_unsat_proves(mk_solver, strengthened)? {
                    log::info!("extra induction step closed at depth {}", n);
                    return Ok(CheckOutcome::True);
                }
            }
        }
        Ok(CheckOutcome::Unknown)
    }
}

/// Falsification only: no proof capability, each bound checked with a
/// fresh instance.
#[derive(Default)]
pub struct FalsificationOnly {}

impl InvarAlgorithm for FalsificationOnly {
    fn check(
        &self,
        env: &mut BmcEnv,
        mk_solver: SolverFactory,
        phi: &Sexp,
        params: &InvarParams,
    ) -> Result<CheckOutcome, BmcError> {
        let mut q = InvarQueries::new(env, phi)?;
        for n in 0..=params.max_k {
            q.env.check_interrupted()?;
            let fals = q.falsification(n)?;
            if let Some(out) = q.solve(mk_solver, fals, n, params)? {
                return Ok(out);
            }
        }
        Ok(CheckOutcome::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bmc::demo;
    use crate::bmc::trace::TraceValue;
    use crate::solver::dpll::DpllSolver;

    fn counter_env() -> (BmcEnv, Vec<demo::DemoProp>) {
        let (symbols, fsm, props) = demo::mod4_counter();
        let mut env = BmcEnv::new(symbols);
        env.setup(&fsm, false).unwrap();
        (env, props)
    }

    fn mk_solver() -> Box<dyn SatSolver> {
        Box::new(DpllSolver::new())
    }

    fn invar_prop(props: &[demo::DemoProp], name: &str) -> Sexp {
        props
            .iter()
            .find_map(|p| match p {
                demo::DemoProp::Invar { name: n, phi } if n == name => Some(phi.clone()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn een_sorensson_proves_the_range_invariant() {
        let (mut env, props) = counter_env();
        let phi = invar_prop(&props, "x-below-4");
        let alg = EenSorensson { extra_step: false };
        let out = alg
            .check(&mut env, &mk_solver, &phi, &InvarParams::new(5))
            .unwrap();
        assert!(matches!(out, CheckOutcome::True));
    }

    #[test]
    fn falsification_finds_the_step_reaching_three() {
        let (mut env, props) = counter_env();
        let phi = invar_prop(&props, "x-never-3");
        let alg = FalsificationOnly::default();
        let out = alg
            .check(&mut env, &mk_solver, &phi, &InvarParams::new(4))
            .unwrap();
        match out {
            CheckOutcome::False(trace) => {
                assert_eq!(trace.steps.len(), 4);
                assert_eq!(trace.value(3, "x"), Some(&TraceValue::Scalar(3)));
            }
            other => panic!("expected a counterexample, got {:?}", other),
        }
    }

    #[test]
    fn classic_induction_proves_mutual_exclusion() {
        let (symbols, fsm, props) = demo::mutex();
        let mut env = BmcEnv::new(symbols);
        env.setup(&fsm, false).unwrap();
        let phi = invar_prop(&props, "mutual-exclusion");
        let alg = ClassicInvar::default();
        let out = alg
            .check(&mut env, &mk_solver, &phi, &InvarParams::new(5))
            .unwrap();
        assert!(matches!(out, CheckOutcome::True));
    }

    #[test]
    fn classic_induction_refutes_the_false_invariant() {
        let (mut env, props) = counter_env();
        let phi = invar_prop(&props, "x-never-3");
        let alg = ClassicInvar::default();
        let out = alg
            .check(&mut env, &mk_solver, &phi, &InvarParams::new(5))
            .unwrap();
        assert!(matches!(out, CheckOutcome::False(_)));
    }

    #[test]
    fn extra_step_also_proves() {
        let (mut env, props) = counter_env();
        let phi = invar_prop(&props, "x-below-4");
        let alg = EenSorensson { extra_step: true };
        let mut params = InvarParams::new(5);
        params.extra_step = true;
        let out = alg.check(&mut env, &mk_solver, &phi, &params).unwrap();
        assert!(matches!(out, CheckOutcome::True));
    }
}

//! Generation and solving of LTL problems: the negated property is
//! encoded over the unrolled path, iterating the bound upward, either
//! one fresh SAT instance per bound or one incremental instance overall.

use std::path::PathBuf;

use crate::{
    bmc::model::{fairness_constraint, path_with_init, state_equality, unrolling},
    bmc::trace::{detect_loopback, trace_from_cnf_model, Trace},
    bmc::utils::{check_bound_and_loopback, expand_filename_macros, Loopback},
    bmc::{BmcEnv, CheckOutcome},
    core::be_manager::BeManager,
    core::be_node::BeId,
    core::cnf::FormulaLit,
    core::enc::BeEncoder,
    core::error::BmcError,
    core::fsm::BeFsm,
    ltl::formula::{LtlExpr, LtlFormula},
    ltl::pltl::pltl_tableau,
    ltl::tableau::tableau,
    solver::{solve_problem, SatIncSolver, SatOutcome, SatSolver},
};

/// Per-command parameters of an LTL check.
#[derive(Debug, Clone)]
pub struct LtlParams {
    pub max_k: i32,
    pub loopback: Loopback,
    /// DIMACS dump template; `@`-macros are expanded per bound
    pub dump_template: Option<String>,
    /// Input file name feeding the `@F`/`@f` macros
    pub input_file: String,
    pub prop_idx: Option<usize>,
    /// Solve at exactly `max_k` instead of iterating from 0
    pub onepb: bool,
    /// Generate (and dump) without calling the solver
    pub dump_only: bool,
    pub force_pltl_tableau: bool,
    /// Encode through the ltl2smv observer product instead of the
    /// monolithic tableau (the non-optimized-tableau path)
    pub observer_encoding: bool,
}

impl LtlParams {
    pub fn new(max_k: i32, loopback: Loopback) -> Self {
        LtlParams {
            max_k,
            loopback,
            dump_template: None,
            input_file: "model".to_string(),
            prop_idx: None,
            onepb: false,
            dump_only: false,
            force_pltl_tableau: false,
            observer_encoding: false,
        }
    }
}

fn single_tableau(
    man: &mut BeManager,
    enc: &mut BeEncoder,
    f: &LtlFormula,
    k: i32,
    loopback: Option<i32>,
    force_pltl: bool,
) -> Result<BeId, BmcError> {
    if force_pltl || f.has_past() {
        pltl_tableau(man, enc, f, k, loopback)
    } else {
        tableau(man, enc, f, k, loopback)
    }
}

/// The tableau side of a problem: the disjunction over the requested
/// loopback candidates, each conjoined with its loop equality and
/// fairness window. Candidates are enumerated in order -1, 0, .., k-1.
pub fn generate_tableau_part(
    man: &mut BeManager,
    enc: &mut BeEncoder,
    fsm: &BeFsm,
    f: &LtlFormula,
    k: i32,
    loopback: Loopback,
    force_pltl: bool,
) -> Result<BeId, BmcError> {
    match loopback {
        Loopback::NoLoop => single_tableau(man, enc, f, k, None, force_pltl),
        Loopback::At(l) => {
            let tab = single_tableau(man, enc, f, k, Some(l), force_pltl)?;
            let loop_cond = state_equality(man, enc, l, k)?;
            let fair = fairness_constraint(man, enc, fsm, l, k)?;
            let with_fair = man.and(tab, fair);
            Ok(man.and(loop_cond, with_fair))
        }
        Loopback::AllLoops => {
            let mut disj = single_tableau(man, enc, f, k, None, force_pltl)?;
            for l in 0..k {
                let tab = single_tableau(man, enc, f, k, Some(l), force_pltl)?;
                let loop_cond = state_equality(man, enc, l, k)?;
                let fair = fairness_constraint(man, enc, fsm, l, k)?;
                let with_fair = man.and(tab, fair);
                let cand = man.and(loop_cond, with_fair);
                disj = man.or(disj, cand);
            }
            Ok(disj)
        }
    }
}

/// The complete problem `path(k) ∧ tableau(¬φ, k, l)`.
pub fn generate_ltl_problem(
    man: &mut BeManager,
    enc: &mut BeEncoder,
    fsm: &BeFsm,
    f_neg: &LtlFormula,
    k: i32,
    loopback: Loopback,
    force_pltl: bool,
) -> Result<BeId, BmcError> {
    let path = path_with_init(man, enc, fsm, k)?;
    let tab = generate_tableau_part(man, enc, fsm, f_neg, k, loopback, force_pltl)?;
    Ok(man.and(path, tab))
}

fn dump_if_requested(
    env: &BmcEnv,
    cnf: &crate::core::cnf::BeCnf,
    k: i32,
    loopback: Loopback,
    params: &LtlParams,
) -> Result<(), BmcError> {
    if let Some(template) = &params.dump_template {
        let name = expand_filename_macros(
            template,
            k,
            loopback,
            params.prop_idx,
            &params.input_file,
        );
        let path = PathBuf::from(format!("{}.dimacs", name));
        crate::bmc::dump::write_dimacs_file(&env.man, &env.enc, cnf, k, &path)?;
    }
    Ok(())
}

pub(crate) fn build_counterexample(
    env: &BmcEnv,
    model: &[crate::solver::Lit],
    k: i32,
    loopback: Loopback,
) -> Trace {
    let mut trace = trace_from_cnf_model(
        &env.man,
        &env.enc,
        &env.symbols,
        "BMC Counterexample",
        model,
        k,
    );
    match loopback {
        Loopback::NoLoop => {}
        Loopback::At(l) => trace.loopback = Some(l),
        Loopback::AllLoops => detect_loopback(&mut trace, &env.symbols),
    }
    trace
}

/// Falsification of an LTL property up to `params.max_k`, one fresh SAT
/// instance per bound.
pub fn check_ltl_spec(
    env: &mut BmcEnv,
    mk_solver: &dyn Fn() -> Box<dyn SatSolver>,
    prop: &LtlExpr,
    params: &LtlParams,
) -> Result<CheckOutcome, BmcError> {
    let fsm = env.fsm_cloned()?;
    check_bound_and_loopback(params.max_k, params.loopback)?;

    let negated = LtlExpr::not(prop.clone());
    let f_neg =
        LtlFormula::normalize(&mut env.man, &mut env.enc, &mut env.cache, &negated)?;

    if params.observer_encoding {
        return check_via_observer(env, mk_solver, &fsm, &f_neg, params);
    }

    let start = if params.onepb { params.max_k } else { 0 };
    for k in start..=params.max_k {
        env.check_interrupted()?;
        let loopback = params.loopback.to_absolute(k);
        if let Loopback::At(l) = loopback {
            if l < 0 || l >= k {
                log::debug!("no loopback {} possible at length {}, skipped", l, k);
                continue;
            }
        }

        log::info!("generating LTL problem of length {} (loop {})", k, loopback);
        let problem = generate_ltl_problem(
            &mut env.man,
            &mut env.enc,
            &fsm,
            &f_neg,
            k,
            loopback,
            params.force_pltl_tableau,
        )?;
        let cnf = env.man.to_cnf(problem);
        dump_if_requested(env, &cnf, k, loopback, params)?;
        if params.dump_only {
            continue;
        }

        env.check_interrupted()?;
        let mut solver = mk_solver();
        let outcome =
            solve_problem(solver.as_mut(), &cnf).map_err(|e| BmcError::Solver(e.0))?;
        if outcome == SatOutcome::Sat {
            let trace = build_counterexample(env, solver.model(), k, loopback);
            return Ok(CheckOutcome::False(trace));
        }
        log::info!("no counterexample of length {}", k);
    }

    Ok(CheckOutcome::Unknown)
}

/// Falsification through the ltl2smv observer: the negated property
/// becomes a monitor sub-machine put in synchronous product with the
/// model; a lasso of the product on which every justice condition fires
/// inside the loop witnesses the violation. The monitor layer is removed
/// again on every exit path.
fn check_via_observer(
    env: &mut BmcEnv,
    mk_solver: &dyn Fn() -> Box<dyn SatSolver>,
    fsm: &BeFsm,
    f_neg: &LtlFormula,
    params: &LtlParams,
) -> Result<CheckOutcome, BmcError> {
    let spec = params.prop_idx.unwrap_or(0) as u32;
    let observer = crate::ltl::ltl2smv::ltl2smv(&mut env.man, &mut env.enc, f_neg, spec)?;
    let mut product = fsm.clone();
    product.apply_synchronous_product(&mut env.man, &observer.fsm);

    let result = observer_search(env, mk_solver, &product, observer.property, params);
    env.enc.pop_layer(&observer.layer_name)?;
    result
}

fn observer_search(
    env: &mut BmcEnv,
    mk_solver: &dyn Fn() -> Box<dyn SatSolver>,
    product: &BeFsm,
    property: BeId,
    params: &LtlParams,
) -> Result<CheckOutcome, BmcError> {
    let start = if params.onepb { params.max_k } else { 0 };
    for k in start..=params.max_k {
        env.check_interrupted()?;
        // justice obligations need a loop, so only looping problems exist
        let candidates: Vec<i32> = match params.loopback.to_absolute(k) {
            Loopback::NoLoop => Vec::new(),
            Loopback::At(l) if l >= 0 && l < k => vec![l],
            Loopback::At(_) => Vec::new(),
            Loopback::AllLoops => (0..k).collect(),
        };
        if candidates.is_empty() {
            continue;
        }

        let path = path_with_init(&mut env.man, &mut env.enc, product, k)?;
        let holds0 = env.enc.shift_to_time(&mut env.man, property, 0)?;
        let mut disj = BeId::FALSE;
        for l in candidates {
            let loop_cond = state_equality(&mut env.man, &mut env.enc, l, k)?;
            let fair = fairness_constraint(&mut env.man, &mut env.enc, product, l, k)?;
            let cand = env.man.and(loop_cond, fair);
            disj = env.man.or(disj, cand);
        }
        let with_prop = env.man.and(path, holds0);
        let problem = env.man.and(with_prop, disj);

        env.check_interrupted()?;
        let cnf = env.man.to_cnf(problem);
        let mut solver = mk_solver();
        let outcome =
            solve_problem(solver.as_mut(), &cnf).map_err(|e| BmcError::Solver(e.0))?;
        if outcome == SatOutcome::Sat {
            let trace =
                build_counterexample(env, solver.model(), k, Loopback::AllLoops);
            return Ok(CheckOutcome::False(trace));
        }
        log::info!("no observer counterexample of length {}", k);
    }
    Ok(CheckOutcome::Unknown)
}

/// Incremental variant: the path unrolling is added to one SAT instance
/// permanently, the per-bound tableau under an activation literal.
pub fn check_ltl_spec_inc(
    env: &mut BmcEnv,
    solver: &mut dyn SatIncSolver,
    prop: &LtlExpr,
    params: &LtlParams,
) -> Result<CheckOutcome, BmcError> {
    let fsm = env.fsm_cloned()?;
    check_bound_and_loopback(params.max_k, params.loopback)?;

    let negated = LtlExpr::not(prop.clone());
    let f_neg =
        LtlFormula::normalize(&mut env.man, &mut env.enc, &mut env.cache, &negated)?;
    let cosafety = f_neg.is_cosafety();
    // first bound at which no loop-free initialized path exists
    let mut exhausted_at: Option<i32> = None;

    for k in 0..=params.max_k {
        env.check_interrupted()?;

        // extend the path: I(0) at the first iteration, one transition
        // per following one
        let extension = if k == 0 {
            crate::bmc::model::init0(&mut env.man, &mut env.enc, &fsm)?
        } else {
            unrolling(&mut env.man, &mut env.enc, &fsm, k - 1, k)?
        };
        let path_cnf = env.man.to_cnf(extension);
        solver.assert_cnf(&path_cnf);

        let loopback = params.loopback.to_absolute(k);
        let loopback_possible = match loopback {
            Loopback::At(l) => l >= 0 && l < k,
            _ => true,
        };

        if loopback_possible {
            let tab = generate_tableau_part(
                &mut env.man,
                &mut env.enc,
                &fsm,
                &f_neg,
                k,
                loopback,
                params.force_pltl_tableau,
            )?;
            if !tab.is_false() {
                let tab_cnf = env.man.to_cnf(tab);
                solver.add_cnf(&tab_cnf);

                // activate this bound's tableau for this call only
                let assumptions: Vec<i32> = match tab_cnf.formula_lit() {
                    FormulaLit::Constant(false) => unreachable!("tab is not false"),
                    FormulaLit::Constant(true) => Vec::new(),
                    FormulaLit::Lit(lit) => {
                        let guard = env.man.fresh_cnf_var().0 as i32;
                        solver.add_clause(&[-guard, lit]);
                        vec![guard]
                    }
                };

                env.check_interrupted()?;
                log::info!("solving incremental LTL problem of length {}", k);
                let outcome = solver
                    .solve_under_assumptions(&assumptions)
                    .map_err(|e| BmcError::Solver(e.0))?;
                if outcome == SatOutcome::Sat {
                    let trace = build_counterexample(env, solver.model(), k, loopback);
                    return Ok(CheckOutcome::False(trace));
                }
            }
        }

        // a co-safety violation has an informative prefix: once every
        // loop-free initialized path fits below the bound, continuing a
        // formula-length margin beyond that point exhausts the search
        if cosafety && k > 0 && exhausted_at.is_none() {
            let unique = crate::bmc::model::simple_path(&mut env.man, &mut env.enc, k)?;
            let unique_cnf = env.man.to_cnf(unique);
            solver.add_cnf(&unique_cnf);
            let assumptions: Vec<i32> = match unique_cnf.formula_lit() {
                FormulaLit::Constant(true) => Vec::new(),
                FormulaLit::Constant(false) => continue,
                FormulaLit::Lit(lit) => {
                    let guard = env.man.fresh_cnf_var().0 as i32;
                    solver.add_clause(&[-guard, lit]);
                    vec![guard]
                }
            };
            env.check_interrupted()?;
            let outcome = solver
                .solve_under_assumptions(&assumptions)
                .map_err(|e| BmcError::Solver(e.0))?;
            if outcome == SatOutcome::Unsat {
                log::info!("no loop-free initialized path of length {}", k);
                exhausted_at = Some(k);
            }
        }
        if let Some(k0) = exhausted_at {
            if k >= k0 + f_neg.temporal_depth() as i32 + 1 {
                log::info!("completeness threshold {} reached, property proved", k);
                return Ok(CheckOutcome::True);
            }
        }
    }

    Ok(CheckOutcome::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bmc::demo;
    use crate::bmc::trace::TraceValue;
    use crate::solver::dpll::DpllSolver;

    fn env_for(model: &str) -> (BmcEnv, Vec<demo::DemoProp>) {
        let (symbols, fsm, props) = demo::by_name(model).unwrap();
        let mut env = BmcEnv::new(symbols);
        env.setup(&fsm, false).unwrap();
        (env, props)
    }

    fn mk_solver() -> Box<dyn SatSolver> {
        Box::new(DpllSolver::new())
    }

    fn ltl_prop(props: &[demo::DemoProp], name: &str) -> LtlExpr {
        props
            .iter()
            .find_map(|p| match p {
                demo::DemoProp::Ltl { name: n, formula } if n == name => {
                    Some(formula.clone())
                }
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn eventually_three_is_falsified_on_the_counter() {
        // F (x = 3) holds on every path, so its negation never yields a
        // counterexample; the dual check is the G property below
        let (mut env, props) = env_for("counter");
        let prop = ltl_prop(&props, "eventually-3");
        let params = LtlParams::new(2, Loopback::AllLoops);
        // x reaches 3 only at step 3, so up to k=2 nothing is found
        let out = check_ltl_spec(&mut env, &mk_solver, &prop, &params).unwrap();
        assert!(matches!(out, CheckOutcome::Unknown));
    }

    #[test]
    fn mutex_ltl_spec_has_no_counterexample() {
        let (mut env, props) = env_for("mutex");
        let prop = ltl_prop(&props, "mutual-exclusion-ltl");
        let params = LtlParams::new(6, Loopback::AllLoops);
        let out = check_ltl_spec(&mut env, &mk_solver, &prop, &params).unwrap();
        assert!(matches!(out, CheckOutcome::Unknown));
    }

    #[test]
    fn fg_p_at_bound_four_loops_back_to_two() {
        let (mut env, props) = env_for("cycle");
        let prop = ltl_prop(&props, "eventually-always-p");
        let mut params = LtlParams::new(4, Loopback::AllLoops);
        params.onepb = true;
        let out = check_ltl_spec(&mut env, &mk_solver, &prop, &params).unwrap();
        match out {
            CheckOutcome::False(trace) => {
                assert_eq!(trace.bound(), 4);
                assert_eq!(trace.loopback, Some(2));
            }
            other => panic!("expected a counterexample, got {:?}", other),
        }
    }

    #[test]
    fn iterative_search_finds_the_shortest_lasso() {
        // iterating from 0 hits the two-state loop one bound earlier
        let (mut env, props) = env_for("cycle");
        let prop = ltl_prop(&props, "eventually-always-p");
        let params = LtlParams::new(4, Loopback::AllLoops);
        let out = check_ltl_spec(&mut env, &mk_solver, &prop, &params).unwrap();
        match out {
            CheckOutcome::False(trace) => {
                assert_eq!(trace.bound(), 3);
                assert_eq!(trace.loopback, Some(1));
            }
            other => panic!("expected a counterexample, got {:?}", other),
        }
    }

    #[test]
    fn incremental_check_agrees_with_the_monolithic_one() {
        let (mut env, props) = env_for("cycle");
        let prop = ltl_prop(&props, "eventually-always-p");
        let params = LtlParams::new(4, Loopback::AllLoops);
        let mut solver = DpllSolver::new();
        let out = check_ltl_spec_inc(&mut env, &mut solver, &prop, &params).unwrap();
        assert!(matches!(out, CheckOutcome::False(_)));
    }

    #[test]
    fn incremental_check_proves_safety_via_completeness() {
        // the violation of a G-safety property is co-safety, so the
        // incremental loop can conclude TRUE once the loop-free paths
        // are exhausted
        let (mut env, props) = env_for("mutex");
        let prop = ltl_prop(&props, "mutual-exclusion-ltl");
        let params = LtlParams::new(10, Loopback::AllLoops);
        let mut solver = DpllSolver::new();
        let out = check_ltl_spec_inc(&mut env, &mut solver, &prop, &params).unwrap();
        assert!(matches!(out, CheckOutcome::True));
    }

    #[test]
    fn past_property_is_refuted_immediately() {
        // H p with p = (x > 0) fails at time 0 on the chain
        let (mut env, props) = env_for("chain");
        let prop = ltl_prop(&props, "historically-positive");
        let params = LtlParams::new(3, Loopback::AllLoops);
        let out = check_ltl_spec(&mut env, &mk_solver, &prop, &params).unwrap();
        match out {
            CheckOutcome::False(trace) => {
                assert_eq!(trace.value(0, "x"), Some(&TraceValue::Scalar(0)));
            }
            other => panic!("expected a counterexample, got {:?}", other),
        }
    }

    #[test]
    fn onepb_solves_only_the_last_bound() {
        let (mut env, props) = env_for("cycle");
        let prop = ltl_prop(&props, "eventually-always-p");
        let mut params = LtlParams::new(4, Loopback::AllLoops);
        params.onepb = true;
        let out = check_ltl_spec(&mut env, &mk_solver, &prop, &params).unwrap();
        assert!(matches!(out, CheckOutcome::False(_)));
    }

    #[test]
    fn observer_encoding_agrees_with_the_tableau() {
        let (mut env, props) = env_for("cycle");
        let prop = ltl_prop(&props, "eventually-always-p");
        let mut params = LtlParams::new(4, Loopback::AllLoops);
        params.observer_encoding = true;
        let out = check_ltl_spec(&mut env, &mk_solver, &prop, &params).unwrap();
        match out {
            CheckOutcome::False(trace) => {
                // monitor variables never leak into the trace
                for step in &trace.steps {
                    assert!(step.assignments.keys().all(|n| !n.starts_with("LTL_")));
                }
            }
            other => panic!("expected a counterexample, got {:?}", other),
        }
    }

    #[test]
    fn observer_layer_is_removed_after_the_check() {
        let (mut env, props) = env_for("cycle");
        let prop = ltl_prop(&props, "infinitely-often-p");
        let mut params = LtlParams::new(3, Loopback::AllLoops);
        params.observer_encoding = true;
        // G F p holds on the cycle, so the search is inconclusive
        let out = check_ltl_spec(&mut env, &mk_solver, &prop, &params).unwrap();
        assert!(matches!(out, CheckOutcome::Unknown));
        // the monitor layer was popped, a second run commits it again
        let out = check_ltl_spec(&mut env, &mk_solver, &prop, &params).unwrap();
        assert!(matches!(out, CheckOutcome::Unknown));
    }

    #[test]
    fn model_not_built_is_reported() {
        let (symbols, _, props) = demo::by_name("counter").unwrap();
        let mut env = BmcEnv::new(symbols);
        let prop = ltl_prop(&props, "eventually-3");
        let params = LtlParams::new(2, Loopback::AllLoops);
        assert!(matches!(
            check_ltl_spec(&mut env, &mk_solver, &prop, &params),
            Err(BmcError::ModelNotBuilt)
        ));
    }
}

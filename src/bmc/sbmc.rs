//! Simple bounded model checking for PLTL: the past-capable encoding
//! with virtual unrolling, in a one-instance-per-bound and in an
//! incremental flavor, with the optional completeness certificate.

use crate::{
    bmc::ltl_check::build_counterexample,
    bmc::model::{fairness_constraint, init0, path_with_init, simple_path, state_equality, unrolling},
    bmc::utils::Loopback,
    bmc::{BmcEnv, CheckOutcome},
    core::be_manager::BeManager,
    core::be_node::BeId,
    core::cnf::FormulaLit,
    core::enc::BeEncoder,
    core::error::BmcError,
    core::fsm::BeFsm,
    ltl::formula::{LtlExpr, LtlFormula, NormOp},
    ltl::pltl::pltl_tableau_with_depth,
    solver::{solve_problem, SatIncSolver, SatOutcome, SatSolver},
};

#[derive(Debug, Clone)]
pub struct SbmcParams {
    pub max_k: i32,
    /// `-c`: certify TRUE once the co-safety search space is exhausted
    pub completeness_check: bool,
    /// cleared by `-N`: evaluate past operators without extra loop rounds
    pub virtual_unrolling: bool,
    /// dedicated small encodings for GF / FG shaped formulas
    pub gf_fg_opt: bool,
    /// keep the per-bound tableau parts cached across the run
    pub cache_opt: bool,
}

impl SbmcParams {
    pub fn new(max_k: i32) -> Self {
        SbmcParams {
            max_k,
            completeness_check: false,
            virtual_unrolling: true,
            gf_fg_opt: true,
            cache_opt: true,
        }
    }
}

/// GF/FG shape of a normalized formula, the target of the dedicated
/// encoding: a witness (or its absence) inside the loop window decides
/// the whole formula.
enum GfFg {
    /// `G F g`: g holds somewhere in every loop traversal
    Gf(BeId),
    /// `F G g`: g holds everywhere in the loop
    Fg(BeId),
}

fn gf_fg_shape(f: &LtlFormula) -> Option<GfFg> {
    let is_true_atom = |id| matches!(f.op(id), NormOp::Atom(be) if be == BeId::TRUE);
    match f.op(f.root()) {
        // G F g  =  !(true U !(true U g))
        NormOp::Not(u1) => {
            let NormOp::U(t1, inner) = f.op(u1) else {
                return None;
            };
            let NormOp::Not(u2) = f.op(inner) else {
                return None;
            };
            let NormOp::U(t2, g) = f.op(u2) else {
                return None;
            };
            match (is_true_atom(t1) && is_true_atom(t2), f.op(g)) {
                (true, NormOp::Atom(be)) => Some(GfFg::Gf(be)),
                _ => None,
            }
        }
        // F G g  =  true U !(true U !g)
        NormOp::U(t1, inner) => {
            let NormOp::Not(u2) = f.op(inner) else {
                return None;
            };
            let NormOp::U(t2, ng) = f.op(u2) else {
                return None;
            };
            match (is_true_atom(t1) && is_true_atom(t2), f.op(ng)) {
                (true, NormOp::Atom(be)) => Some(GfFg::Fg(!be)),
                _ => None,
            }
        }
        _ => None,
    }
}

fn sbmc_single_tableau(
    man: &mut BeManager,
    enc: &mut BeEncoder,
    f: &LtlFormula,
    k: i32,
    loopback: Option<i32>,
    params: &SbmcParams,
) -> Result<BeId, BmcError> {
    if params.gf_fg_opt {
        if let Some(shape) = gf_fg_shape(f) {
            return match loopback {
                // a prefix certifies neither an infinitely-often nor a
                // forever
                None => Ok(BeId::FALSE),
                Some(l) => {
                    enc.grow_to(k);
                    match shape {
                        GfFg::Gf(g) => {
                            let mut acc = BeId::FALSE;
                            for t in l..k {
                                let gt = enc.shift_to_time(man, g, t)?;
                                acc = man.or(acc, gt);
                            }
                            Ok(acc)
                        }
                        GfFg::Fg(g) => {
                            let mut acc = BeId::TRUE;
                            for t in l..k {
                                let gt = enc.shift_to_time(man, g, t)?;
                                acc = man.and(acc, gt);
                            }
                            Ok(acc)
                        }
                    }
                }
            };
        }
    }

    let rounds = if params.virtual_unrolling {
        f.past_depth() as i32
    } else {
        0
    };
    pltl_tableau_with_depth(man, enc, f, k, loopback, rounds)
}

/// The disjunction over all loopback candidates, SBMC-encoded.
fn sbmc_tableau_part(
    env: &mut BmcEnv,
    fsm: &BeFsm,
    f: &LtlFormula,
    k: i32,
    params: &SbmcParams,
) -> Result<BeId, BmcError> {
    let mut disj = sbmc_single_tableau(&mut env.man, &mut env.enc, f, k, None, params)?;
    for l in 0..k {
        let tab = sbmc_single_tableau(&mut env.man, &mut env.enc, f, k, Some(l), params)?;
        let loop_cond = state_equality(&mut env.man, &mut env.enc, l, k)?;
        let fair = fairness_constraint(&mut env.man, &mut env.enc, fsm, l, k)?;
        let with_fair = env.man.and(tab, fair);
        let cand = env.man.and(loop_cond, with_fair);
        disj = env.man.or(disj, cand);
    }
    Ok(disj)
}

struct TableauCache {
    enabled: bool,
    parts: crate::misc::hash_select::HashMap<i32, BeId>,
}

impl TableauCache {
    fn get_or_build(
        &mut self,
        env: &mut BmcEnv,
        fsm: &BeFsm,
        f: &LtlFormula,
        k: i32,
        params: &SbmcParams,
    ) -> Result<BeId, BmcError> {
        if self.enabled {
            if let Some(&part) = self.parts.get(&k) {
                return Ok(part);
            }
        }
        let part = sbmc_tableau_part(env, fsm, f, k, params)?;
        if self.enabled {
            self.parts.insert(k, part);
        }
        Ok(part)
    }
}

/// SBMC with one fresh SAT instance per bound.
pub fn check_ltl_spec_sbmc(
    env: &mut BmcEnv,
    mk_solver: &dyn Fn() -> Box<dyn SatSolver>,
    prop: &LtlExpr,
    params: &SbmcParams,
) -> Result<CheckOutcome, BmcError> {
    let fsm = env.fsm_cloned()?;
    let negated = LtlExpr::not(prop.clone());
    let f_neg =
        LtlFormula::normalize(&mut env.man, &mut env.enc, &mut env.cache, &negated)?;
    let cosafety = f_neg.is_cosafety();
    let mut cache = TableauCache {
        enabled: params.cache_opt,
        parts: Default::default(),
    };
    let mut exhausted_at: Option<i32> = None;

    for k in 0..=params.max_k {
        env.check_interrupted()?;
        log::info!("SBMC problem of length {}", k);

        let path = path_with_init(&mut env.man, &mut env.enc, &fsm, k)?;
        let tab = cache.get_or_build(env, &fsm, &f_neg, k, params)?;
        let problem = env.man.and(path, tab);
        if !problem.is_false() {
            let cnf = env.man.to_cnf(problem);
            let mut solver = mk_solver();
            let outcome =
                solve_problem(solver.as_mut(), &cnf).map_err(|e| BmcError::Solver(e.0))?;
            if outcome == SatOutcome::Sat {
                let trace =
                    build_counterexample(env, solver.model(), k, Loopback::AllLoops);
                return Ok(CheckOutcome::False(trace));
            }
        }

        if params.completeness_check && cosafety && k > 0 && exhausted_at.is_none() {
            let unique = simple_path(&mut env.man, &mut env.enc, k)?;
            let with_path = path_with_init(&mut env.man, &mut env.enc, &fsm, k)?;
            let query = env.man.and(with_path, unique);
            let cnf = env.man.to_cnf(query);
            let mut solver = mk_solver();
            env.check_interrupted()?;
            let outcome =
                solve_problem(solver.as_mut(), &cnf).map_err(|e| BmcError::Solver(e.0))?;
            if outcome == SatOutcome::Unsat {
                exhausted_at = Some(k);
            }
        }
        if let Some(k0) = exhausted_at {
            if k >= k0 + f_neg.temporal_depth() as i32 + 1 {
                log::info!("SBMC completeness threshold {} reached", k);
                return Ok(CheckOutcome::True);
            }
        }
    }
    Ok(CheckOutcome::Unknown)
}

/// Incremental SBMC: one SAT context, the path asserted permanently and
/// each bound's tableau behind an activation literal.
pub fn check_ltl_spec_sbmc_inc(
    env: &mut BmcEnv,
    solver: &mut dyn SatIncSolver,
    prop: &LtlExpr,
    params: &SbmcParams,
) -> Result<CheckOutcome, BmcError> {
    let fsm = env.fsm_cloned()?;
    let negated = LtlExpr::not(prop.clone());
    let f_neg =
        LtlFormula::normalize(&mut env.man, &mut env.enc, &mut env.cache, &negated)?;
    let cosafety = f_neg.is_cosafety();
    let mut cache = TableauCache {
        enabled: params.cache_opt,
        parts: Default::default(),
    };
    let mut exhausted_at: Option<i32> = None;

    for k in 0..=params.max_k {
        env.check_interrupted()?;

        let extension = if k == 0 {
            init0(&mut env.man, &mut env.enc, &fsm)?
        } else {
            unrolling(&mut env.man, &mut env.enc, &fsm, k - 1, k)?
        };
        let ext_cnf = env.man.to_cnf(extension);
        solver.assert_cnf(&ext_cnf);

        let tab = cache.get_or_build(env, &fsm, &f_neg, k, params)?;
        if !tab.is_false() {
            let tab_cnf = env.man.to_cnf(tab);
            solver.add_cnf(&tab_cnf);
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
            log::info!("solving incremental SBMC problem of length {}", k);
            let outcome = solver
                .solve_under_assumptions(&assumptions)
                .map_err(|e| BmcError::Solver(e.0))?;
            if outcome == SatOutcome::Sat {
                let trace =
                    build_counterexample(env, solver.model(), k, Loopback::AllLoops);
                return Ok(CheckOutcome::False(trace));
            }
        }

        if params.completeness_check && cosafety && k > 0 && exhausted_at.is_none() {
            let unique = simple_path(&mut env.man, &mut env.enc, k)?;
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
                exhausted_at = Some(k);
            }
        }
        if let Some(k0) = exhausted_at {
            if k >= k0 + f_neg.temporal_depth() as i32 + 1 {
                log::info!("SBMC completeness threshold {} reached", k);
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
    fn sbmc_refutes_fg_p_on_the_cycle() {
        let (mut env, props) = env_for("cycle");
        let prop = ltl_prop(&props, "eventually-always-p");
        let out =
            check_ltl_spec_sbmc(&mut env, &mk_solver, &prop, &SbmcParams::new(4))
                .unwrap();
        match out {
            CheckOutcome::False(trace) => {
                // the shortest lasso closes from step 3 back to step 1
                assert_eq!(trace.bound(), 3);
                assert_eq!(trace.loopback, Some(1));
            }
            other => panic!("expected a counterexample, got {:?}", other),
        }
    }

    #[test]
    fn sbmc_gf_peephole_agrees_with_the_generic_encoding() {
        for gf_fg_opt in [false, true] {
            let (mut env, props) = env_for("cycle");
            let prop = ltl_prop(&props, "eventually-always-p");
            let mut params = SbmcParams::new(4);
            params.gf_fg_opt = gf_fg_opt;
            let out =
                check_ltl_spec_sbmc(&mut env, &mk_solver, &prop, &params).unwrap();
            assert!(
                matches!(out, CheckOutcome::False(_)),
                "gf_fg_opt = {}",
                gf_fg_opt
            );
        }
    }

    #[test]
    fn sbmc_incremental_handles_past_formulas() {
        let (mut env, props) = env_for("chain");
        let prop = ltl_prop(&props, "historically-positive");
        let mut solver = DpllSolver::new();
        let out = check_ltl_spec_sbmc_inc(
            &mut env,
            &mut solver,
            &prop,
            &SbmcParams::new(3),
        )
        .unwrap();
        assert!(matches!(out, CheckOutcome::False(_)));
    }

    #[test]
    fn sbmc_completeness_proves_safety() {
        let (mut env, props) = env_for("mutex");
        let prop = ltl_prop(&props, "mutual-exclusion-ltl");
        let mut params = SbmcParams::new(10);
        params.completeness_check = true;
        let mut solver = DpllSolver::new();
        let out =
            check_ltl_spec_sbmc_inc(&mut env, &mut solver, &prop, &params).unwrap();
        assert!(matches!(out, CheckOutcome::True));
    }

    #[test]
    fn sbmc_without_virtual_unrolling_still_finds_prefix_violations() {
        let (mut env, props) = env_for("chain");
        let prop = ltl_prop(&props, "historically-positive");
        let mut params = SbmcParams::new(3);
        params.virtual_unrolling = false;
        let out = check_ltl_spec_sbmc(&mut env, &mk_solver, &prop, &params).unwrap();
        assert!(matches!(out, CheckOutcome::False(_)));
    }
}

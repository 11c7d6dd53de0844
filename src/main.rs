use clap::{Parser, Subcommand};

use bmck::bmc::demo::{self, DemoProp};
use bmck::bmc::invar::{invar_algorithm, InvarAlgorithm, InvarParams};
use bmck::bmc::invar_inc::{inc_invar_algorithm, IncInvarAlgorithm, IncInvarParams};
use bmck::bmc::ltl_check::{check_ltl_spec, check_ltl_spec_inc, LtlParams};
use bmck::bmc::options::{ClosureStrategy, IncInvarAlgName, InvarAlgName, Options};
use bmck::bmc::sbmc::{check_ltl_spec_sbmc, check_ltl_spec_sbmc_inc, SbmcParams};
use bmck::bmc::simulate::{pick_state, simulate, SimMode, SimParams};
use bmck::bmc::utils::Loopback;
use bmck::bmc::{BmcEnv, CheckOutcome};
use bmck::core::conv::Sexp;
use bmck::core::error::BmcError;
use bmck::ltl::formula::LtlExpr;
use bmck::solver::dpll::DpllSolver;
use bmck::solver::SatSolver;

#[derive(Parser)]
#[command(
    name = "bmck",
    about = "SAT-based bounded model checking over the bundled demo systems",
    version
)]
struct Cli {
    /// Demo system to load (counter, mutex, cycle, chain)
    #[arg(long, global = true, default_value = "counter")]
    model: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug, Default)]
struct PropSelect {
    /// Property index
    #[arg(short = 'n')]
    index: Option<usize>,
    /// Property name
    #[arg(short = 'P')]
    name: Option<String>,
    /// Property formula (needs the external parser, not bundled)
    #[arg(short = 'p')]
    formula: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Build the BE model out of the boolean FSM
    #[command(name = "bmc_setup")]
    BmcSetup {
        /// Force a rebuild
        #[arg(short = 'f')]
        force: bool,
    },

    /// Falsify an LTL property up to a bound
    #[command(name = "check_ltlspec_bmc")]
    CheckLtlspecBmc {
        #[command(flatten)]
        prop: PropSelect,
        /// Maximum bound (default: bmc_length)
        #[arg(short = 'k')]
        length: Option<i32>,
        /// Loopback: a number, `X` for none, `*` for all
        #[arg(short = 'l')]
        loopback: Option<String>,
        /// DIMACS dump template (@f, @k, @l, @n macros)
        #[arg(short = 'o')]
        dimacs: Option<String>,
        /// Solve only at the exact bound
        #[arg(long)]
        onepb: bool,
        /// Generate and dump without solving
        #[arg(long)]
        dump_only: bool,
    },

    /// Run the selected invariant checking algorithm
    #[command(name = "check_invar_bmc")]
    CheckInvarBmc {
        #[command(flatten)]
        prop: PropSelect,
        #[arg(short = 'k')]
        length: Option<i32>,
        /// classic, een-sorensson or falsification
        #[arg(short = 'a')]
        algorithm: Option<String>,
        /// Strengthened extra induction step
        #[arg(short = 'e')]
        extra_step: bool,
        #[arg(short = 'o')]
        dimacs: Option<String>,
    },

    /// Incremental LTL falsification
    #[command(name = "check_ltlspec_bmc_inc")]
    CheckLtlspecBmcInc {
        #[command(flatten)]
        prop: PropSelect,
        #[arg(short = 'k')]
        length: Option<i32>,
        #[arg(short = 'l')]
        loopback: Option<String>,
    },

    /// Incremental invariant checking
    #[command(name = "check_invar_bmc_inc")]
    CheckInvarBmcInc {
        #[command(flatten)]
        prop: PropSelect,
        #[arg(short = 'k')]
        length: Option<i32>,
        /// dual, zigzag, falsification, interp_seq or interpolants
        #[arg(short = 'a')]
        algorithm: Option<String>,
        /// Closure strategy of dual: backward or forward
        #[arg(short = 's')]
        strategy: Option<String>,
    },

    /// Simple bounded model checking for PLTL
    #[command(name = "check_ltlspec_sbmc")]
    CheckLtlspecSbmc {
        #[command(flatten)]
        prop: PropSelect,
        #[arg(short = 'k')]
        length: Option<i32>,
        /// Completeness check
        #[arg(short = 'c')]
        completeness: bool,
        /// Disable virtual unrolling
        #[arg(short = 'N')]
        no_virtual_unrolling: bool,
    },

    /// Incremental SBMC
    #[command(name = "check_ltlspec_sbmc_inc")]
    CheckLtlspecSbmcInc {
        #[command(flatten)]
        prop: PropSelect,
        #[arg(short = 'k')]
        length: Option<i32>,
        #[arg(short = 'c')]
        completeness: bool,
        #[arg(short = 'N')]
        no_virtual_unrolling: bool,
    },

    /// Pick an initial state by SAT
    #[command(name = "bmc_pick_state")]
    BmcPickState {
        /// Random choice among the satisfying states
        #[arg(short = 'r')]
        random: bool,
        /// Constraint string (needs the external parser, not bundled)
        #[arg(short = 'c')]
        constraint: Option<String>,
    },

    /// Step-wise SAT-based simulation
    #[command(name = "bmc_simulate")]
    BmcSimulate {
        /// Number of steps
        #[arg(short = 'k', default_value_t = 10)]
        steps: i32,
        #[arg(short = 'r')]
        random: bool,
        #[arg(short = 'c')]
        constraint: Option<String>,
    },

    /// Step-wise simulation reusing one incremental context
    #[command(name = "bmc_inc_simulate")]
    BmcIncSimulate {
        #[arg(short = 'k', default_value_t = 10)]
        steps: i32,
        #[arg(short = 'r')]
        random: bool,
        #[arg(short = 'c')]
        constraint: Option<String>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    std::process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let Some((symbols, fsm, props)) = demo::by_name(&cli.model) else {
        eprintln!(
            "unknown model '{}' (available: {})",
            cli.model,
            demo::DEMO_NAMES.join(", ")
        );
        return 1;
    };

    let opts = Options::from_env();
    let mut env = BmcEnv::new(symbols);

    let result = match &cli.command {
        Command::BmcSetup { force } => {
            return match env.setup(&fsm, *force) {
                Ok(()) => {
                    println!("BE model built for '{}'", cli.model);
                    0
                }
                Err(e) => {
                    eprintln!("{}", e);
                    1
                }
            };
        }
        other => {
            // every checking command needs the model
            if let Err(e) = env.setup(&fsm, false) {
                eprintln!("{}", e);
                return 1;
            }
            dispatch(other, &mut env, &props, &opts, &cli.model)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e);
            1
        }
    }
}

fn mk_solver() -> Box<dyn SatSolver> {
    Box::new(DpllSolver::new())
}

fn dispatch(
    command: &Command,
    env: &mut BmcEnv,
    props: &[DemoProp],
    opts: &Options,
    model_name: &str,
) -> Result<i32, BmcError> {
    match command {
        Command::BmcSetup { .. } => unreachable!("handled by the caller"),

        Command::CheckLtlspecBmc {
            prop,
            length,
            loopback,
            dimacs,
            onepb,
            dump_only,
        } => {
            let (name, formula) = select_ltl(props, prop)?;
            let mut params = LtlParams::new(
                length.unwrap_or(opts.length),
                parse_loopback(loopback, opts)?,
            );
            params.dump_template = dimacs.clone().or_else(|| opts.dimacs_filename.clone());
            params.input_file = model_name.to_string();
            params.prop_idx = prop.index;
            params.onepb = *onepb;
            params.dump_only = *dump_only;
            params.force_pltl_tableau = opts.force_pltl_tableau;
            params.observer_encoding = !opts.optimized_tableau;
            let out = check_ltl_spec(env, &mk_solver, &formula, &params)?;
            Ok(report(&name, out))
        }

        Command::CheckInvarBmc {
            prop,
            length,
            algorithm,
            extra_step,
            dimacs,
        } => {
            let (name, phi) = select_invar(props, prop)?;
            let alg_name = match algorithm {
                Some(s) => InvarAlgName::parse(s).ok_or_else(|| {
                    BmcError::Type(format!("unknown invariant algorithm '{}'", s))
                })?,
                None => opts.invar_alg,
            };
            let mut params = InvarParams::new(length.unwrap_or(opts.length));
            params.extra_step = *extra_step;
            params.dump_template =
                dimacs.clone().or_else(|| opts.invar_dimacs_filename.clone());
            params.input_file = model_name.to_string();
            params.prop_idx = prop.index;
            let alg = invar_algorithm(alg_name, *extra_step);
            let out = alg.check(env, &mk_solver, &phi, &params)?;
            Ok(report(&name, out))
        }

        Command::CheckLtlspecBmcInc {
            prop,
            length,
            loopback,
        } => {
            let (name, formula) = select_ltl(props, prop)?;
            let mut params = LtlParams::new(
                length.unwrap_or(opts.length),
                parse_loopback(loopback, opts)?,
            );
            params.force_pltl_tableau = opts.force_pltl_tableau;
            let mut solver = DpllSolver::new();
            let out = check_ltl_spec_inc(env, &mut solver, &formula, &params)?;
            Ok(report(&name, out))
        }

        Command::CheckInvarBmcInc {
            prop,
            length,
            algorithm,
            strategy,
        } => {
            let (name, phi) = select_invar(props, prop)?;
            let alg_name = match algorithm {
                Some(s) => IncInvarAlgName::parse(s).ok_or_else(|| {
                    BmcError::Type(format!("unknown incremental algorithm '{}'", s))
                })?,
                None => opts.inc_invar_alg,
            };
            let mut params = IncInvarParams::new(length.unwrap_or(opts.length));
            if let Some(s) = strategy {
                params.closure = ClosureStrategy::parse(s).ok_or_else(|| {
                    BmcError::Type(format!("unknown closure strategy '{}'", s))
                })?;
            }
            let alg = inc_invar_algorithm(alg_name);
            let mut solver = DpllSolver::new();
            let out = alg.check(env, &mut solver, &phi, &params)?;
            Ok(report(&name, out))
        }

        Command::CheckLtlspecSbmc {
            prop,
            length,
            completeness,
            no_virtual_unrolling,
        } => {
            let (name, formula) = select_ltl(props, prop)?;
            let params = sbmc_params(
                length.unwrap_or(opts.length),
                *completeness,
                *no_virtual_unrolling,
                opts,
            );
            let out = check_ltl_spec_sbmc(env, &mk_solver, &formula, &params)?;
            Ok(report(&name, out))
        }

        Command::CheckLtlspecSbmcInc {
            prop,
            length,
            completeness,
            no_virtual_unrolling,
        } => {
            let (name, formula) = select_ltl(props, prop)?;
            let params = sbmc_params(
                length.unwrap_or(opts.length),
                *completeness,
                *no_virtual_unrolling,
                opts,
            );
            let mut solver = DpllSolver::new();
            let out = check_ltl_spec_sbmc_inc(env, &mut solver, &formula, &params)?;
            Ok(report(&name, out))
        }

        Command::BmcPickState { random, constraint } => {
            let constraint = parse_constraint(constraint)?;
            let mode = if *random {
                SimMode::Random
            } else {
                SimMode::Deterministic
            };
            match pick_state(env, &mk_solver, constraint.as_ref(), mode, None)? {
                Some(state) => {
                    println!("picked state:");
                    for (var, value) in &state {
                        println!("    {} = {}", env.enc.name_of(*var), value);
                    }
                    Ok(0)
                }
                None => {
                    eprintln!("no state satisfies the given constraints");
                    Ok(1)
                }
            }
        }

        Command::BmcSimulate {
            steps,
            random,
            constraint,
        }
        | Command::BmcIncSimulate {
            steps,
            random,
            constraint,
        } => {
            let constraint = parse_constraint(constraint)?;
            let start = pick_state(env, &mk_solver, None, SimMode::Deterministic, None)?
                .ok_or_else(|| {
                    BmcError::Type("the model has no initial state".to_string())
                })?;
            let mut params = SimParams::new(*steps);
            params.mode = if *random {
                SimMode::Random
            } else {
                SimMode::Deterministic
            };
            params.constraint = constraint;
            let trace = simulate(env, &mk_solver, &start, &params)?;
            print!("{}", trace);
            Ok(0)
        }
    }
}

fn sbmc_params(
    max_k: i32,
    completeness: bool,
    no_virtual_unrolling: bool,
    opts: &Options,
) -> SbmcParams {
    let mut params = SbmcParams::new(max_k);
    params.completeness_check = completeness;
    params.virtual_unrolling = !no_virtual_unrolling;
    params.gf_fg_opt = opts.sbmc_gf_fg_opt;
    params.cache_opt = opts.sbmc_cache_opt;
    params
}

fn parse_loopback(arg: &Option<String>, opts: &Options) -> Result<Loopback, BmcError> {
    match arg {
        Some(s) => Loopback::parse(s),
        None => Ok(opts.loopback),
    }
}

/// Formula and constraint strings need the external parser, which is a
/// separate collaborator; reaching for it here is a parse error.
fn parse_constraint(arg: &Option<String>) -> Result<Option<Sexp>, BmcError> {
    match arg {
        Some(s) => Err(BmcError::Parse(format!(
            "constraint parsing is not bundled, cannot read '{}'",
            s
        ))),
        None => Ok(None),
    }
}

fn select_ltl(props: &[DemoProp], sel: &PropSelect) -> Result<(String, LtlExpr), BmcError> {
    match select(props, sel)? {
        DemoProp::Ltl { name, formula } => Ok((name.clone(), formula.clone())),
        DemoProp::Invar { name, .. } => Err(BmcError::Type(format!(
            "property '{}' is an invariant, not an LTL specification",
            name
        ))),
    }
}

fn select_invar(props: &[DemoProp], sel: &PropSelect) -> Result<(String, Sexp), BmcError> {
    match select(props, sel)? {
        DemoProp::Invar { name, phi } => Ok((name.clone(), phi.clone())),
        DemoProp::Ltl { name, .. } => Err(BmcError::Type(format!(
            "property '{}' is an LTL specification, not an invariant",
            name
        ))),
    }
}

fn select<'a>(props: &'a [DemoProp], sel: &PropSelect) -> Result<&'a DemoProp, BmcError> {
    if let Some(s) = &sel.formula {
        return Err(BmcError::Parse(format!(
            "property parsing is not bundled, cannot read '{}'; use -n or -P",
            s
        )));
    }
    if let Some(name) = &sel.name {
        return props
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| BmcError::Type(format!("no property named '{}'", name)));
    }
    let idx = sel.index.unwrap_or(0);
    props.get(idx).ok_or_else(|| {
        BmcError::Type(format!(
            "property index {} out of range (the model has {})",
            idx,
            props.len()
        ))
    })
}

fn report(name: &str, outcome: CheckOutcome) -> i32 {
    match outcome {
        CheckOutcome::True => {
            println!("-- property {} is true", name);
            0
        }
        CheckOutcome::False(trace) => {
            println!("-- property {} is false, a counterexample follows", name);
            print!("{}", trace);
            0
        }
        CheckOutcome::Unknown => {
            println!(
                "-- cannot verify property {} within the given bound",
                name
            );
            0
        }
    }
}

//! DIMACS dumping of generated problems, and the matching reader.
//!
//! The writer leads with a comment block mapping CNF indices back to
//! (time, model variable) pairs, then a `c model` line listing the model
//! variable indices, then the standard DIMACS body with the formula
//! literal as the first (unit) clause.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use regex::Regex;

use crate::{
    core::be_manager::BeManager,
    core::cnf::{BeCnf, FormulaLit},
    core::enc::BeEncoder,
    core::error::BmcError,
    core::symbols::VarKind,
};

const TOOL_NAME: &str = "bmck";

/// Dumps an LTL problem of bound `k` to `path`.
pub fn write_dimacs_file(
    man: &BeManager,
    enc: &BeEncoder,
    cnf: &BeCnf,
    k: i32,
    path: &Path,
) -> Result<(), BmcError> {
    log::info!("dumping problem to DIMACS file {}", path.display());
    let mut file = File::create(path)?;
    write_dimacs(man, enc, cnf, k, &mut file)?;
    Ok(())
}

/// Dumps an invariant problem, which by construction spans times 0 and 1.
pub fn write_invar_dimacs_file(
    man: &BeManager,
    enc: &BeEncoder,
    cnf: &BeCnf,
    path: &Path,
) -> Result<(), BmcError> {
    write_dimacs_file(man, enc, cnf, 1, path)
}

pub fn write_dimacs(
    man: &BeManager,
    enc: &BeEncoder,
    cnf: &BeCnf,
    k: i32,
    out: &mut impl Write,
) -> io::Result<()> {
    writeln!(out, "c BMC problem generated by {}", TOOL_NAME)?;
    writeln!(
        out,
        "c Time steps from 0 to {}, {} State Variables, {} Frozen Variables and {} Input Variables",
        k,
        enc.state_vars().len(),
        enc.frozen_vars().len(),
        enc.input_vars().len()
    )?;
    writeln!(out, "c Model to Dimacs Conversion Table")?;

    let untimed = enc.untimed_vars(&[VarKind::State, VarKind::Frozen, VarKind::Input]);
    for time in 0..=k {
        writeln!(out, "c ")?;
        writeln!(out, "c @@@@@ Time {}", time)?;
        for &v in &untimed {
            // inputs do not exist at time k, frozen vars only at time 0
            let kind = enc.kind_of(v);
            if (kind == VarKind::Input && time == k) || (kind == VarKind::Frozen && time > 0) {
                continue;
            }
            let Some(timed) = enc.peek_timed(v, time) else {
                continue;
            };
            let Some(node) = man.find_var_node(timed) else {
                continue;
            };
            let Some(cnf_var) = man.peek_cnf_var(node) else {
                continue;
            };
            writeln!(
                out,
                "c CNF variable {} => Time {}, Model Variable {}",
                cnf_var.0,
                time,
                enc.name_of(v)
            )?;
        }
    }
    writeln!(out, "c ")?;

    writeln!(out, "c Beginning of the DIMACS dumping")?;
    writeln!(out, "c model {}", cnf.model_vars().len())?;
    write!(out, "c ")?;
    for v in cnf.model_vars() {
        write!(out, "{} ", v.0)?;
    }
    writeln!(out, "0")?;

    match cnf.formula_lit() {
        FormulaLit::Constant(value) => {
            writeln!(out, "p cnf {} {}", cnf.max_var(), cnf.num_clauses())?;
            if value {
                writeln!(out, "c Warning: the true constant is printed out")?;
            } else {
                writeln!(out, "c Warning: the false constant is printed out")?;
                for clause in cnf.clauses() {
                    for lit in clause {
                        write!(out, "{} ", lit)?;
                    }
                    writeln!(out, "0")?;
                }
            }
        }
        FormulaLit::Lit(lit) => {
            // one extra clause for the formula literal
            writeln!(out, "p cnf {} {}", cnf.max_var(), cnf.num_clauses() + 1)?;
            writeln!(out, "{} 0", lit)?;
            for clause in cnf.clauses() {
                for l in clause {
                    write!(out, "{} ", l)?;
                }
                writeln!(out, "0")?;
            }
        }
    }
    writeln!(out, "c End of dimacs dumping")?;
    Ok(())
}

/// A DIMACS problem read back from a file.
#[derive(Debug, Clone)]
pub struct DimacsInstance {
    pub num_vars: u32,
    pub num_clauses: u32,
    pub clauses: Vec<Vec<i32>>,
    /// Indices listed by a `c model` block, when present
    pub model_vars: Vec<u32>,
}

pub fn read_dimacs_file(path: &Path) -> Result<DimacsInstance, BmcError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let lines = reader
        .lines()
        .collect::<Result<Vec<_>, _>>()
        .map_err(BmcError::Io)?;
    read_dimacs(lines.iter().map(|l| l.as_str()))
}

pub fn read_dimacs<'a>(
    lines: impl IntoIterator<Item = &'a str>,
) -> Result<DimacsInstance, BmcError> {
    let re_p = Regex::new(r"^p\s+cnf\s+(?P<vars>\d+)\s+(?P<clauses>\d+)\s*$").unwrap();
    let re_clause = Regex::new(r"^\s*(-?\d+\s+)*0\s*$").unwrap();
    let re_model = Regex::new(r"^c\s+model\s+(?P<count>\d+)\s*$").unwrap();

    let mut header: Option<(u32, u32)> = None;
    let mut clauses: Vec<Vec<i32>> = Vec::new();
    let mut model_vars: Vec<u32> = Vec::new();
    let mut expect_model_line = false;

    for line in lines {
        if let Some(cap) = re_model.captures(line) {
            let _count: usize = cap["count"].parse().unwrap_or(0);
            expect_model_line = true;
            continue;
        }
        if line.starts_with('c') {
            if expect_model_line {
                // "c v1 v2 ... 0" right after the count
                let body = line.trim_start_matches('c').trim();
                let mut vars: Vec<u32> = Vec::new();
                let mut terminated = false;
                for tok in body.split_whitespace() {
                    match tok.parse::<u32>() {
                        Ok(0) => {
                            terminated = true;
                            break;
                        }
                        Ok(v) => vars.push(v),
                        Err(_) => break,
                    }
                }
                if terminated {
                    model_vars = vars;
                }
                expect_model_line = false;
            }
            continue;
        }
        expect_model_line = false;

        if header.is_none() {
            if let Some(cap) = re_p.captures(line) {
                header = Some((
                    cap["vars"].parse().map_err(|_| {
                        BmcError::Parse("bad variable count in header".to_string())
                    })?,
                    cap["clauses"].parse().map_err(|_| {
                        BmcError::Parse("bad clause count in header".to_string())
                    })?,
                ));
                continue;
            }
        }

        if re_clause.is_match(line) {
            let mut lits: Vec<i32> = line
                .split_whitespace()
                .map(|tok| {
                    tok.parse::<i32>()
                        .map_err(|_| BmcError::Parse(format!("bad literal '{}'", tok)))
                })
                .collect::<Result<Vec<_>, _>>()?;
            if lits.pop() != Some(0) {
                return Err(BmcError::Parse(
                    "clause line not terminated by 0".to_string(),
                ));
            }
            clauses.push(lits);
            continue;
        }
        if !line.trim().is_empty() {
            return Err(BmcError::Parse(format!("unknown line '{}'", line)));
        }
    }

    let (num_vars, num_clauses) = header
        .ok_or_else(|| BmcError::Parse("missing problem header".to_string()))?;
    Ok(DimacsInstance {
        num_vars,
        num_clauses,
        clauses,
        model_vars,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bmc::demo;
    use crate::bmc::model::path_with_init;
    use crate::bmc::BmcEnv;
    use crate::core::be_node::BeId;

    fn counter_problem(k: i32) -> (BmcEnv, BeCnf) {
        let (symbols, fsm, _) = demo::mod4_counter();
        let mut env = BmcEnv::new(symbols);
        env.setup(&fsm, false).unwrap();
        let be_fsm = env.fsm_cloned().unwrap();
        let problem = path_with_init(&mut env.man, &mut env.enc, &be_fsm, k).unwrap();
        let cnf = env.man.to_cnf(problem);
        (env, cnf)
    }

    fn dump_to_string(env: &BmcEnv, cnf: &BeCnf, k: i32) -> String {
        let mut buf = Vec::new();
        write_dimacs(&env.man, &env.enc, cnf, k, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn dump_round_trips_through_the_reader() {
        let (env, cnf) = counter_problem(3);
        let text = dump_to_string(&env, &cnf, 3);

        let inst = read_dimacs(text.lines()).unwrap();
        assert_eq!(inst.num_vars, cnf.max_var());
        // formula literal plus the clause list
        assert_eq!(inst.clauses.len(), cnf.num_clauses() + 1);
        assert_eq!(inst.clauses[0].len(), 1);
        assert_eq!(
            inst.model_vars,
            cnf.model_vars().iter().map(|v| v.0).collect::<Vec<_>>()
        );
        // the clause bodies survive verbatim
        for (read, orig) in inst.clauses[1..].iter().zip(cnf.clauses()) {
            assert_eq!(read, orig);
        }
    }

    #[test]
    fn model_variable_count_matches_the_unrolling() {
        // a bound-3 path over 2 state vars and no inputs or frozen vars
        // touches exactly 4 * 2 model variables
        let (_, cnf) = counter_problem(3);
        assert_eq!(cnf.model_vars().len(), 8);
    }

    #[test]
    fn constant_true_dump_has_no_clauses() {
        let (symbols, fsm, _) = demo::mod4_counter();
        let mut env = BmcEnv::new(symbols);
        env.setup(&fsm, false).unwrap();
        let cnf = env.man.to_cnf(BeId::TRUE);
        let text = dump_to_string(&env, &cnf, 0);
        assert!(text.contains("p cnf 0 0"));
        assert!(text.contains("true constant"));
    }

    #[test]
    fn constant_false_dump_carries_the_contradictory_pair() {
        let (symbols, fsm, _) = demo::mod4_counter();
        let mut env = BmcEnv::new(symbols);
        env.setup(&fsm, false).unwrap();
        let cnf = env.man.to_cnf(BeId::FALSE);
        let text = dump_to_string(&env, &cnf, 0);
        assert!(text.contains("false constant"));
        let inst = read_dimacs(text.lines()).unwrap();
        assert_eq!(inst.clauses.len(), 2);
        assert_eq!(inst.clauses[0][0], -inst.clauses[1][0]);
    }

    #[test]
    fn conversion_table_lists_timed_variables() {
        let (env, cnf) = counter_problem(2);
        let text = dump_to_string(&env, &cnf, 2);
        assert!(text.contains("@@@@@ Time 0"));
        assert!(text.contains("@@@@@ Time 2"));
        assert!(text.contains("Model Variable x.0"));
    }
}

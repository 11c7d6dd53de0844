//! A plain DPLL solver with unit propagation and chronological
//! backtracking. Not competitive with a real backend, but complete, and
//! sufficient to run the whole pipeline self-contained.

use crate::solver::{Lit, SatIncSolver, SatOutcome, SatSolver, SolverError};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Assign {
    /// Set by unit propagation or by an assumption
    Forced(u32),
    /// Set by a branching decision; `flipped` records whether the second
    /// phase was already tried
    Decision { var: u32, flipped: bool },
}

#[derive(Default)]
pub struct DpllSolver {
    clauses: Vec<Vec<Lit>>,
    num_vars: u32,
    model: Vec<Lit>,
}

impl DpllSolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn note_var(&mut self, v: u32) {
        if v > self.num_vars {
            self.num_vars = v;
        }
    }
}

impl SatSolver for DpllSolver {
    fn name(&self) -> &str {
        "dpll"
    }

    fn add_clause(&mut self, clause: &[Lit]) {
        for lit in clause {
            self.note_var(lit.unsigned_abs());
        }
        self.clauses.push(clause.to_vec());
    }

    fn solve(&mut self) -> Result<SatOutcome, SolverError> {
        self.solve_under_assumptions(&[])
    }

    fn model(&self) -> &[Lit] {
        &self.model
    }
}

impl SatIncSolver for DpllSolver {
    fn solve_under_assumptions(&mut self, assumptions: &[Lit]) -> Result<SatOutcome, SolverError> {
        for lit in assumptions {
            self.note_var(lit.unsigned_abs());
        }

        let n = self.num_vars as usize;
        let mut values: Vec<Option<bool>> = vec![None; n + 1];
        let mut trail: Vec<Assign> = Vec::new();

        self.model.clear();

        // assumptions go in below every decision; a conflict among them
        // is final
        for &lit in assumptions {
            let var = lit.unsigned_abs();
            let val = lit > 0;
            match values[var as usize] {
                Some(v) if v != val => return Ok(SatOutcome::Unsat),
                Some(_) => {}
                None => {
                    values[var as usize] = Some(val);
                    trail.push(Assign::Forced(var));
                }
            }
        }

        loop {
            match propagate(&self.clauses, &mut values, &mut trail) {
                Propagation::Conflict => {
                    if !backtrack(&mut values, &mut trail) {
                        return Ok(SatOutcome::Unsat);
                    }
                }
                Propagation::Satisfied => {
                    for (var, val) in values.iter().enumerate().skip(1) {
                        if let Some(v) = val {
                            let var = var as Lit;
                            self.model.push(if *v { var } else { -var });
                        }
                    }
                    return Ok(SatOutcome::Sat);
                }
                Propagation::Open(var) => {
                    values[var as usize] = Some(true);
                    trail.push(Assign::Decision {
                        var,
                        flipped: false,
                    });
                }
            }
        }
    }
}

enum Propagation {
    /// Some clause is falsified under the current assignment
    Conflict,
    /// Every clause has a satisfied literal
    Satisfied,
    /// Propagation reached a fixpoint; branch on this variable
    Open(u32),
}

fn propagate(
    clauses: &[Vec<Lit>],
    values: &mut Vec<Option<bool>>,
    trail: &mut Vec<Assign>,
) -> Propagation {
    loop {
        let mut all_satisfied = true;
        let mut branch_var: Option<u32> = None;
        let mut progress = false;

        for clause in clauses {
            let mut satisfied = false;
            let mut unassigned: Option<Lit> = None;
            let mut unassigned_count = 0;

            for &lit in clause {
                match values[lit.unsigned_abs() as usize] {
                    Some(v) if v == (lit > 0) => {
                        satisfied = true;
                        break;
                    }
                    Some(_) => {}
                    None => {
                        unassigned = Some(lit);
                        unassigned_count += 1;
                    }
                }
            }
            if satisfied {
                continue;
            }

            match unassigned_count {
                0 => return Propagation::Conflict,
                1 => {
                    let lit = unassigned.unwrap();
                    values[lit.unsigned_abs() as usize] = Some(lit > 0);
                    trail.push(Assign::Forced(lit.unsigned_abs()));
                    progress = true;
                }
                _ => {
                    all_satisfied = false;
                    if branch_var.is_none() {
                        branch_var = unassigned.map(|l| l.unsigned_abs());
                    }
                }
            }
        }

        if progress {
            continue;
        }
        if all_satisfied {
            return Propagation::Satisfied;
        }
        return Propagation::Open(branch_var.unwrap());
    }
}

/// Unwinds the trail to the most recent unflipped decision and tries its
/// other phase. Returns false when no decision is left, i.e. UNSAT.
fn backtrack(values: &mut [Option<bool>], trail: &mut Vec<Assign>) -> bool {
    while let Some(entry) = trail.pop() {
        match entry {
            Assign::Forced(var) => {
                // an assumption is never popped past: assumptions sit at
                // the bottom of the trail below any decision, so reaching
                // them means the decisions above are exhausted
                values[var as usize] = None;
            }
            Assign::Decision { var, flipped } => {
                if flipped {
                    values[var as usize] = None;
                } else {
                    values[var as usize] = Some(false);
                    trail.push(Assign::Decision { var, flipped: true });
                    return true;
                }
            }
        }
    }
    false
}

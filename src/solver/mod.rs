//! The SAT backend boundary. The checking algorithms talk to a solver
//! exclusively through these traits; a small DPLL implementation is
//! bundled so the crate is usable without an external backend.

pub mod dpll;

use std::fmt;

use crate::core::cnf::{BeCnf, CnfLit, FormulaLit};

/// A signed DIMACS literal.
pub type Lit = CnfLit;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SatOutcome {
    Sat,
    Unsat,
}

#[derive(Debug)]
pub struct SolverError(pub String);

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SolverError {}

/// A solver instance holding a growing clause database.
pub trait SatSolver {
    fn name(&self) -> &str;

    fn add_clause(&mut self, clause: &[Lit]);

    fn solve(&mut self) -> Result<SatOutcome, SolverError>;

    /// The satisfying assignment of the last [`SatOutcome::Sat`] answer,
    /// as a list of signed literals. Variables the solver never had to
    /// assign are absent.
    fn model(&self) -> &[Lit];

    /// Loads the clause set of a converted problem, without asserting
    /// its formula literal.
    fn add_cnf(&mut self, cnf: &BeCnf) {
        for clause in cnf.clauses() {
            self.add_clause(clause);
        }
    }

    /// Loads a converted problem and asserts its formula literal
    /// permanently. Constant formulas carry their truth in the clause
    /// set: a true constant has none, a false constant a contradictory
    /// pair.
    fn assert_cnf(&mut self, cnf: &BeCnf) {
        self.add_cnf(cnf);
        if let FormulaLit::Lit(l) = cnf.formula_lit() {
            self.add_clause(&[l]);
        }
    }
}

/// Incremental capability: solving under a set of assumption literals
/// that hold for this call only.
pub trait SatIncSolver: SatSolver {
    fn solve_under_assumptions(&mut self, assumptions: &[Lit]) -> Result<SatOutcome, SolverError>;
}

/// Outcome of an interpolating solve over an (A, B) clause partition.
pub enum InterpolationOutcome {
    Sat,
    /// UNSAT, with a Craig interpolant over the shared variables, in CNF
    Unsat(Vec<Vec<Lit>>),
}

/// Capability prerequisite of the interpolation-based invariant
/// algorithms. The bundled DPLL backend does not provide it.
pub trait InterpolatingSatSolver: SatIncSolver {
    fn solve_with_interpolation(
        &mut self,
        a: &[Vec<Lit>],
        b: &[Vec<Lit>],
    ) -> Result<InterpolationOutcome, SolverError>;
}

/// Loads a converted problem, asserts its formula literal and solves.
pub fn solve_problem(
    solver: &mut dyn SatSolver,
    cnf: &BeCnf,
) -> Result<SatOutcome, SolverError> {
    solver.assert_cnf(cnf);
    solver.solve()
}

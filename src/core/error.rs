//! The error taxonomy shared by the whole checking pipeline. Algorithm
//! entry points return `Result<_, BmcError>`; the driver reports the
//! error and moves on to the next property.

use std::fmt;

#[derive(Debug)]
pub enum BmcError {
    /// A constraint or property could not be parsed
    Parse(String),
    /// The property kind does not match the command
    Type(String),
    /// The formula uses a construct the encoding cannot express
    UnsupportedFormula(String),
    /// Bound or loopback outside the admissible range
    InvalidBound(String),
    /// Input variables are undefined at the final time step
    InvalidTimeForInput { var: String, time: i32 },
    /// The selected capability is not offered by the SAT backend
    BackendUnavailable(String),
    /// bmc_setup has not been performed
    ModelNotBuilt,
    /// The SAT backend reported a failure
    Solver(String),
    /// The cancellation flag was raised
    Interrupted,
    Io(std::io::Error),
}

impl fmt::Display for BmcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BmcError::Parse(msg) => write!(f, "parse error: {}", msg),
            BmcError::Type(msg) => write!(f, "type error: {}", msg),
            BmcError::UnsupportedFormula(msg) => write!(f, "unsupported formula: {}", msg),
            BmcError::InvalidBound(msg) => write!(f, "invalid bound: {}", msg),
            BmcError::InvalidTimeForInput { var, time } => write!(
                f,
                "input variable {} is undefined at time {}",
                var, time
            ),
            BmcError::BackendUnavailable(msg) => {
                write!(f, "SAT backend capability unavailable: {}", msg)
            }
            BmcError::ModelNotBuilt => {
                write!(f, "the BE model must be built before (use bmc_setup)")
            }
            BmcError::Solver(msg) => write!(f, "SAT solver error: {}", msg),
            BmcError::Interrupted => write!(f, "interrupted"),
            BmcError::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for BmcError {}

impl From<std::io::Error> for BmcError {
    fn from(e: std::io::Error) -> Self {
        BmcError::Io(e)
    }
}

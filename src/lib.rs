pub mod bmc;
pub mod core;
pub mod ltl;
pub mod misc;
pub mod solver;

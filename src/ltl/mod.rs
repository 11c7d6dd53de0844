pub mod formula;
pub mod ltl2smv;
pub mod pltl;
pub mod tableau;

//! Checking options: defaults, environment overrides and the builders
//! used by the CLI. Flags beat environment variables beat defaults.

use std::env;

use crate::bmc::utils::Loopback;

/// Non-incremental invariant checking strategy (`bmc_invar_alg`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InvarAlgName {
    Classic,
    EenSorensson,
    Falsification,
}

impl InvarAlgName {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "classic" => Some(InvarAlgName::Classic),
            "een-sorensson" => Some(InvarAlgName::EenSorensson),
            "falsification" => Some(InvarAlgName::Falsification),
            _ => None,
        }
    }
}

/// Incremental invariant checking strategy (`bmc_inc_invar_alg`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IncInvarAlgName {
    Dual,
    Zigzag,
    Falsification,
    InterpSeq,
    Interpolants,
}

impl IncInvarAlgName {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dual" => Some(IncInvarAlgName::Dual),
            "zigzag" => Some(IncInvarAlgName::Zigzag),
            "falsification" => Some(IncInvarAlgName::Falsification),
            "interp_seq" => Some(IncInvarAlgName::InterpSeq),
            "interpolants" => Some(IncInvarAlgName::Interpolants),
            _ => None,
        }
    }
}

/// Closure direction of the dual algorithm.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClosureStrategy {
    Backward,
    Forward,
}

impl ClosureStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "backward" => Some(ClosureStrategy::Backward),
            "forward" => Some(ClosureStrategy::Forward),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Options {
    /// Default unrolling bound (`bmc_length`)
    pub length: i32,
    /// Default loopback (`bmc_loopback`)
    pub loopback: Loopback,
    /// DIMACS template for LTL problems (`bmc_dimacs_filename`)
    pub dimacs_filename: Option<String>,
    /// DIMACS template for invariant problems (`bmc_invar_dimacs_filename`)
    pub invar_dimacs_filename: Option<String>,
    pub invar_alg: InvarAlgName,
    pub inc_invar_alg: IncInvarAlgName,
    /// Prefer the optimized monolithic tableau when applicable
    pub optimized_tableau: bool,
    /// Always use the past-capable tableau
    pub force_pltl_tableau: bool,
    /// SBMC incremental-loop optimization
    pub sbmc_il_opt: bool,
    /// SBMC dedicated encoding for GF / FG shaped formulas
    pub sbmc_gf_fg_opt: bool,
    /// SBMC tableau cache across bounds
    pub sbmc_cache_opt: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            length: 10,
            loopback: Loopback::AllLoops,
            dimacs_filename: None,
            invar_dimacs_filename: None,
            invar_alg: InvarAlgName::Classic,
            inc_invar_alg: IncInvarAlgName::Dual,
            optimized_tableau: true,
            force_pltl_tableau: false,
            sbmc_il_opt: true,
            sbmc_gf_fg_opt: true,
            sbmc_cache_opt: true,
        }
    }
}

impl Options {
    /// Defaults overridden by the `bmc_*` environment variables.
    pub fn from_env() -> Self {
        let mut opts = Options::default();
        if let Some(k) = env_parse("bmc_length", |s| s.parse::<i32>().ok()) {
            opts.length = k;
        }
        if let Some(l) = env_parse("bmc_loopback", |s| Loopback::parse(s).ok()) {
            opts.loopback = l;
        }
        if let Ok(f) = env::var("bmc_dimacs_filename") {
            opts.dimacs_filename = Some(f);
        }
        if let Ok(f) = env::var("bmc_invar_dimacs_filename") {
            opts.invar_dimacs_filename = Some(f);
        }
        if let Some(a) = env_parse("bmc_invar_alg", InvarAlgName::parse) {
            opts.invar_alg = a;
        }
        if let Some(a) = env_parse("bmc_inc_invar_alg", IncInvarAlgName::parse) {
            opts.inc_invar_alg = a;
        }
        if let Some(b) = env_parse("bmc_optimized_tableau", parse_bool) {
            opts.optimized_tableau = b;
        }
        if let Some(b) = env_parse("bmc_force_pltl_tableau", parse_bool) {
            opts.force_pltl_tableau = b;
        }
        if let Some(b) = env_parse("bmc_sbmc_il_opt", parse_bool) {
            opts.sbmc_il_opt = b;
        }
        if let Some(b) = env_parse("bmc_sbmc_gf_fg_opt", parse_bool) {
            opts.sbmc_gf_fg_opt = b;
        }
        if let Some(b) = env_parse("bmc_sbmc_cache_opt", parse_bool) {
            opts.sbmc_cache_opt = b;
        }
        opts
    }

    pub fn with_length(mut self, k: i32) -> Options {
        self.length = k;
        self
    }

    pub fn with_loopback(mut self, l: Loopback) -> Options {
        self.loopback = l;
        self
    }

    pub fn with_force_pltl_tableau(mut self) -> Options {
        self.force_pltl_tableau = true;
        self
    }
}

fn env_parse<T>(name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let value = env::var(name).ok()?;
    let parsed = parse(&value);
    if parsed.is_none() {
        log::warn!("ignoring invalid value '{}' of {}", value, name);
    }
    parsed
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_names_parse() {
        assert_eq!(
            InvarAlgName::parse("een-sorensson"),
            Some(InvarAlgName::EenSorensson)
        );
        assert_eq!(
            IncInvarAlgName::parse("zigzag"),
            Some(IncInvarAlgName::Zigzag)
        );
        assert!(InvarAlgName::parse("quantum").is_none());
    }

    #[test]
    fn builders_override_defaults() {
        let o = Options::default()
            .with_length(25)
            .with_loopback(Loopback::NoLoop);
        assert_eq!(o.length, 25);
        assert_eq!(o.loopback, Loopback::NoLoop);
    }
}

//! Loopback bookkeeping and the filename macro expansion used by the
//! dump templates.

use std::path::Path;

use crate::core::error::BmcError;

/// Loopback selection of a problem. `At` carries an absolute time or,
/// when negative, a time relative to the current bound.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Loopback {
    NoLoop,
    AllLoops,
    At(i32),
}

impl Loopback {
    /// Parses the textual convention: `X` means no loop, `*` means all
    /// loopbacks, anything else is a (possibly relative) number.
    pub fn parse(s: &str) -> Result<Loopback, BmcError> {
        match s.trim() {
            "X" | "x" => Ok(Loopback::NoLoop),
            "*" => Ok(Loopback::AllLoops),
            num => num
                .parse::<i32>()
                .map(Loopback::At)
                .map_err(|_| BmcError::Parse(format!("invalid loopback value '{}'", num))),
        }
    }

    /// Resolves a relative loopback against the bound `k`.
    pub fn to_absolute(self, k: i32) -> Loopback {
        match self {
            Loopback::At(l) if l < 0 => Loopback::At(k + l),
            other => other,
        }
    }
}

impl std::fmt::Display for Loopback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Loopback::NoLoop => write!(f, "X"),
            Loopback::AllLoops => write!(f, "*"),
            Loopback::At(l) => write!(f, "{}", l),
        }
    }
}

/// Validates a (bound, loopback) pair: the bound must be non-negative
/// and a single loopback must fall inside `[-k, k)` before resolution,
/// i.e. `[0, k)` after.
pub fn check_bound_and_loopback(k: i32, l: Loopback) -> Result<(), BmcError> {
    if k < 0 {
        return Err(BmcError::InvalidBound(format!(
            "bound {} is negative",
            k
        )));
    }
    if let Loopback::At(l) = l {
        let abs = if l < 0 { k + l } else { l };
        if abs < 0 || abs >= k {
            return Err(BmcError::InvalidBound(format!(
                "loopback {} outside [{}, {})",
                l, -k, k
            )));
        }
    }
    Ok(())
}

/// Expands the `@`-macros of a dump filename template in one pass:
/// `@F` input path, `@f` its basename without extension, `@k` bound,
/// `@l` loopback, `@n` property index, `@@` a literal `@`. The double
/// `@` is protected through a sentinel so its expansion is not rescanned.
pub fn expand_filename_macros(
    template: &str,
    k: i32,
    l: Loopback,
    prop_idx: Option<usize>,
    input_file: &str,
) -> String {
    const SENTINEL: char = '\u{1}';

    let basename = Path::new(input_file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let prop = match prop_idx {
        Some(n) => n.to_string(),
        None => "undef".to_string(),
    };

    template
        .replace("@@", &SENTINEL.to_string())
        .replace("@F", input_file)
        .replace("@f", &basename)
        .replace("@k", &k.to_string())
        .replace("@l", &l.to_string())
        .replace("@n", &prop)
        .replace(SENTINEL, "@")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_parsing() {
        assert_eq!(Loopback::parse("X").unwrap(), Loopback::NoLoop);
        assert_eq!(Loopback::parse("*").unwrap(), Loopback::AllLoops);
        assert_eq!(Loopback::parse("3").unwrap(), Loopback::At(3));
        assert_eq!(Loopback::parse("-2").unwrap(), Loopback::At(-2));
        assert!(Loopback::parse("seven").is_err());
    }

    #[test]
    fn relative_loopbacks_resolve_against_the_bound() {
        assert_eq!(Loopback::At(-1).to_absolute(5), Loopback::At(4));
        assert_eq!(Loopback::At(2).to_absolute(5), Loopback::At(2));
        assert_eq!(Loopback::AllLoops.to_absolute(5), Loopback::AllLoops);
    }

    #[test]
    fn bound_checks() {
        assert!(check_bound_and_loopback(-1, Loopback::NoLoop).is_err());
        assert!(check_bound_and_loopback(4, Loopback::At(4)).is_err());
        assert!(check_bound_and_loopback(4, Loopback::At(-5)).is_err());
        assert!(check_bound_and_loopback(4, Loopback::At(-1)).is_ok());
        assert!(check_bound_and_loopback(4, Loopback::At(3)).is_ok());
        assert!(check_bound_and_loopback(0, Loopback::AllLoops).is_ok());
    }

    #[test]
    fn filename_macros_expand_in_one_pass() {
        let out = expand_filename_macros(
            "@f_k@k_l@l_n@n",
            7,
            Loopback::NoLoop,
            Some(2),
            "models/counter.smv",
        );
        assert_eq!(out, "counter_k7_lX_n2");
    }

    #[test]
    fn double_at_is_protected() {
        // @@k must yield a literal @k, not an expanded bound
        let out =
            expand_filename_macros("dump@@k_@k", 3, Loopback::AllLoops, None, "m.smv");
        assert_eq!(out, "dump@k_3");
    }
}

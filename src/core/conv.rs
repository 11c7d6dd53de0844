//! Translation of flattened Boolean expressions, as delivered by the
//! external flattener, into Boolean Expressions over untimed encoder
//! variables. Conversion results are cached by structural equality.

use crate::{
    core::be_manager::BeManager,
    core::be_node::BeId,
    core::enc::BeEncoder,
    core::error::BmcError,
    misc::hash_select::HashMap,
};

/// A flattened boolean expression over model variables. `Next` may only
/// wrap a variable; the flattener is expected to have pushed it inward.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Sexp {
    True,
    False,
    Var(String),
    Next(Box<Sexp>),
    Not(Box<Sexp>),
    And(Box<Sexp>, Box<Sexp>),
    Or(Box<Sexp>, Box<Sexp>),
    Xor(Box<Sexp>, Box<Sexp>),
    Iff(Box<Sexp>, Box<Sexp>),
    Implies(Box<Sexp>, Box<Sexp>),
    Ite(Box<Sexp>, Box<Sexp>, Box<Sexp>),
}

impl Sexp {
    pub fn var(name: &str) -> Sexp {
        Sexp::Var(name.to_string())
    }

    /// `next(name)` over a variable.
    pub fn next_var(name: &str) -> Sexp {
        Sexp::Next(Box::new(Sexp::var(name)))
    }

    pub fn not(e: Sexp) -> Sexp {
        Sexp::Not(Box::new(e))
    }

    pub fn and(a: Sexp, b: Sexp) -> Sexp {
        Sexp::And(Box::new(a), Box::new(b))
    }

    pub fn or(a: Sexp, b: Sexp) -> Sexp {
        Sexp::Or(Box::new(a), Box::new(b))
    }

    pub fn xor(a: Sexp, b: Sexp) -> Sexp {
        Sexp::Xor(Box::new(a), Box::new(b))
    }

    pub fn iff(a: Sexp, b: Sexp) -> Sexp {
        Sexp::Iff(Box::new(a), Box::new(b))
    }

    pub fn implies(a: Sexp, b: Sexp) -> Sexp {
        Sexp::Implies(Box::new(a), Box::new(b))
    }

    pub fn ite(c: Sexp, t: Sexp, e: Sexp) -> Sexp {
        Sexp::Ite(Box::new(c), Box::new(t), Box::new(e))
    }

    /// Conjunction of a list, `True` when empty.
    pub fn conjoin<I: IntoIterator<Item = Sexp>>(es: I) -> Sexp {
        let mut iter = es.into_iter();
        let first = match iter.next() {
            Some(e) => e,
            None => return Sexp::True,
        };
        iter.fold(first, Sexp::and)
    }
}

/// Cache of already-converted expressions, owned by the session context.
pub type SexpCache = HashMap<Sexp, BeId>;

/// Converts `e` into a BE over untimed variables. `next(v)` maps to the
/// untimed next-state instance of `v`.
pub fn sexp_to_be(
    man: &mut BeManager,
    enc: &mut BeEncoder,
    cache: &mut SexpCache,
    e: &Sexp,
) -> Result<BeId, BmcError> {
    if let Some(b) = cache.get(e) {
        return Ok(*b);
    }
    let b = convert(man, enc, e, false)?;
    cache.insert(e.clone(), b);
    Ok(b)
}

fn convert(
    man: &mut BeManager,
    enc: &mut BeEncoder,
    e: &Sexp,
    under_next: bool,
) -> Result<BeId, BmcError> {
    match e {
        Sexp::True => Ok(BeId::TRUE),
        Sexp::False => Ok(BeId::FALSE),
        Sexp::Var(name) => {
            let v = enc
                .name_to_untimed(name)
                .ok_or_else(|| BmcError::Type(format!("unknown variable '{}'", name)))?;
            let v = if under_next {
                enc.next_of(v).ok_or_else(|| {
                    BmcError::UnsupportedFormula(format!(
                        "next() applied to non-state variable '{}'",
                        name
                    ))
                })?
            } else {
                v
            };
            Ok(man.var(v))
        }
        Sexp::Next(inner) => {
            if under_next {
                return Err(BmcError::UnsupportedFormula(
                    "nested next()".to_string(),
                ));
            }
            match inner.as_ref() {
                Sexp::Var(_) => convert(man, enc, inner, true),
                _ => Err(BmcError::UnsupportedFormula(
                    "next() over a non-variable expression".to_string(),
                )),
            }
        }
        Sexp::Not(a) => {
            let ba = convert(man, enc, a, under_next)?;
            Ok(!ba)
        }
        Sexp::And(a, b) => {
            let ba = convert(man, enc, a, under_next)?;
            let bb = convert(man, enc, b, under_next)?;
            Ok(man.and(ba, bb))
        }
        Sexp::Or(a, b) => {
            let ba = convert(man, enc, a, under_next)?;
            let bb = convert(man, enc, b, under_next)?;
            Ok(man.or(ba, bb))
        }
        Sexp::Xor(a, b) => {
            let ba = convert(man, enc, a, under_next)?;
            let bb = convert(man, enc, b, under_next)?;
            Ok(man.xor(ba, bb))
        }
        Sexp::Iff(a, b) => {
            let ba = convert(man, enc, a, under_next)?;
            let bb = convert(man, enc, b, under_next)?;
            Ok(man.iff(ba, bb))
        }
        Sexp::Implies(a, b) => {
            let ba = convert(man, enc, a, under_next)?;
            let bb = convert(man, enc, b, under_next)?;
            Ok(man.implies(ba, bb))
        }
        Sexp::Ite(c, t, el) => {
            let bc = convert(man, enc, c, under_next)?;
            let bt = convert(man, enc, t, under_next)?;
            let be = convert(man, enc, el, under_next)?;
            Ok(man.ite(bc, bt, be))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::symbols::SymbolLayer;

    fn setup() -> (BeManager, BeEncoder, SexpCache) {
        let mut layer = SymbolLayer::new("model");
        layer.add_state_var("x").add_state_var("y").add_input_var("i");
        let mut enc = BeEncoder::new();
        enc.commit_layer(&layer);
        (BeManager::new(), enc, SexpCache::default())
    }

    #[test]
    fn conversion_is_cached() {
        let (mut man, mut enc, mut cache) = setup();
        let e = Sexp::and(Sexp::var("x"), Sexp::not(Sexp::var("y")));
        let a = sexp_to_be(&mut man, &mut enc, &mut cache, &e).unwrap();
        let b = sexp_to_be(&mut man, &mut enc, &mut cache, &e).unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn next_maps_to_the_next_state_instance() {
        let (mut man, mut enc, mut cache) = setup();
        let e = Sexp::next_var("x");
        let b = sexp_to_be(&mut man, &mut enc, &mut cache, &e).unwrap();
        let x = enc.name_to_untimed("x").unwrap();
        assert_eq!(man.var_of(b), Some(enc.next_of(x).unwrap()));
    }

    #[test]
    fn next_over_input_is_rejected() {
        let (mut man, mut enc, mut cache) = setup();
        let e = Sexp::next_var("i");
        assert!(matches!(
            sexp_to_be(&mut man, &mut enc, &mut cache, &e),
            Err(BmcError::UnsupportedFormula(_))
        ));
    }

    #[test]
    fn unknown_variable_is_a_type_error() {
        let (mut man, mut enc, mut cache) = setup();
        let e = Sexp::var("ghost");
        assert!(matches!(
            sexp_to_be(&mut man, &mut enc, &mut cache, &e),
            Err(BmcError::Type(_))
        ));
    }
}

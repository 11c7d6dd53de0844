//! The monolithic tableau: propositional encoding of a future-time
//! formula over a k-bounded path, with or without a loopback.
//!
//! With a loopback the lasso determines every truth value exactly. A
//! plain prefix does not: it can witness eventualities and discharge
//! releases, but can never certify an unbounded `G`, so evaluation
//! tracks the polarity of the occurrence and answers pessimistically —
//! whatever the prefix cannot certify is false. SAT answers therefore
//! always correspond to real counterexamples.

use crate::{
    core::be_manager::BeManager,
    core::be_node::BeId,
    core::enc::BeEncoder,
    core::error::BmcError,
    ltl::formula::{LtlFormula, LtlNodeId, NormOp},
    misc::hash_select::HashMap,
};

/// Builds the tableau of `f` at time 0 for bound `k`; `loopback` is the
/// absolute loop time, `None` for the no-loop case. Past operators are
/// not handled here, see [`crate::ltl::pltl`].
pub fn tableau(
    man: &mut BeManager,
    enc: &mut BeEncoder,
    f: &LtlFormula,
    k: i32,
    loopback: Option<i32>,
) -> Result<BeId, BmcError> {
    if f.has_past() {
        return Err(BmcError::UnsupportedFormula(
            "past operators require the PLTL tableau".to_string(),
        ));
    }
    if let Some(l) = loopback {
        if l < 0 || l >= k {
            return Err(BmcError::InvalidBound(format!(
                "loopback {} outside [0, {})",
                l, k
            )));
        }
    }
    enc.grow_to(k);

    let mut builder = Tableau {
        man,
        enc,
        f,
        k,
        loopback,
        memo: HashMap::default(),
    };
    builder.eval(f.root(), 0, false)
}

struct Tableau<'a> {
    man: &'a mut BeManager,
    enc: &'a mut BeEncoder,
    f: &'a LtlFormula,
    k: i32,
    loopback: Option<i32>,
    memo: HashMap<(LtlNodeId, i32, bool), BeId>,
}

impl<'a> Tableau<'a> {
    /// The value asserted for the subformula at time `t`; `neg` means
    /// the negation of the subformula is the one being asserted.
    fn eval(&mut self, id: LtlNodeId, t: i32, neg: bool) -> Result<BeId, BmcError> {
        if let Some(&e) = self.memo.get(&(id, t, neg)) {
            return Ok(e);
        }
        let result = match self.f.op(id) {
            NormOp::Atom(be) => {
                let shifted = self.enc.shift_to_time(self.man, be, t)?;
                if neg {
                    !shifted
                } else {
                    shifted
                }
            }
            NormOp::Not(a) => self.eval(a, t, !neg)?,
            NormOp::Or(a, b) => {
                let ea = self.eval(a, t, neg)?;
                let eb = self.eval(b, t, neg)?;
                if neg {
                    self.man.and(ea, eb)
                } else {
                    self.man.or(ea, eb)
                }
            }
            NormOp::X(a) => match self.loopback {
                // the prefix cannot certify anything about the state
                // after its end, in either polarity
                None => {
                    if t < self.k {
                        self.eval(a, t + 1, neg)?
                    } else {
                        BeId::FALSE
                    }
                }
                // time k only exists in the loop equality, so the path
                // wraps from k-1 back to l
                Some(l) => {
                    let succ = if t + 1 < self.k { t + 1 } else { l };
                    self.eval(a, succ, neg)?
                }
            },
            NormOp::U(a, b) => match self.loopback {
                Some(_) => {
                    // the lasso is exact, so the negative occurrence is
                    // just the complement of the positive expansion
                    let u = self.until_expansion(a, b, t)?;
                    if neg {
                        !u
                    } else {
                        u
                    }
                }
                None => {
                    if neg {
                        // !(a U b) = !a R !b: only its discharge within
                        // the prefix is certifiable
                        self.release_discharge(a, b, t)?
                    } else {
                        self.until_expansion(a, b, t)?
                    }
                }
            },
            NormOp::Y(_) | NormOp::S(_, _) => {
                return Err(BmcError::UnsupportedFormula(
                    "past operator in the monolithic tableau".to_string(),
                ))
            }
        };
        self.memo.insert((id, t, neg), result);
        Ok(result)
    }

    /// `⋁_j (b_j ∧ ⋀_{i<j} a_i)` over the witness positions from `t`,
    /// built from the back so the prefix conjunctions are shared.
    fn until_expansion(
        &mut self,
        a: LtlNodeId,
        b: LtlNodeId,
        t: i32,
    ) -> Result<BeId, BmcError> {
        let positions = self.until_positions(t);
        let mut acc = BeId::FALSE;
        for &j in positions.iter().rev() {
            let eb = self.eval(b, j, false)?;
            let ea = self.eval(a, j, false)?;
            let tail = self.man.and(ea, acc);
            acc = self.man.or(eb, tail);
        }
        Ok(acc)
    }

    /// `⋁_j (!a_j ∧ ⋀_{n<=j} !b_n)` over the prefix: the release
    /// `!a R !b` discharged at some position `j`, after which its truth
    /// no longer depends on the unknown suffix.
    fn release_discharge(
        &mut self,
        a: LtlNodeId,
        b: LtlNodeId,
        t: i32,
    ) -> Result<BeId, BmcError> {
        let mut acc = BeId::FALSE;
        for j in (t..=self.k).rev() {
            let na = self.eval(a, j, true)?;
            let nb = self.eval(b, j, true)?;
            let or = self.man.or(na, acc);
            acc = self.man.and(nb, or);
        }
        Ok(acc)
    }

    /// The candidate witness positions of an until starting at `t`: the
    /// remaining prefix, plus one pass through the loop when there is
    /// one. Witnesses then cover `[min(t, l), k)`.
    fn until_positions(&self, t: i32) -> Vec<i32> {
        match self.loopback {
            None => (t..=self.k).collect(),
            Some(l) => {
                let mut positions: Vec<i32> = (t..self.k).collect();
                positions.extend(l..self.k);
                positions
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::conv::SexpCache;
    use crate::core::symbols::SymbolLayer;
    use crate::ltl::formula::LtlExpr;

    fn setup() -> (BeManager, BeEncoder, SexpCache) {
        let mut layer = SymbolLayer::new("model");
        layer.add_state_var("p");
        let mut enc = BeEncoder::new();
        enc.commit_layer(&layer);
        (BeManager::new(), enc, SexpCache::default())
    }

    fn norm(
        man: &mut BeManager,
        enc: &mut BeEncoder,
        cache: &mut SexpCache,
        e: &LtlExpr,
    ) -> LtlFormula {
        LtlFormula::normalize(man, enc, cache, e).unwrap()
    }

    #[test]
    fn next_at_the_last_step_without_loop_is_false() {
        let (mut man, mut enc, mut cache) = setup();
        // X X X p with k = 2 runs off the end of the prefix
        let e = LtlExpr::next(LtlExpr::next(LtlExpr::next(LtlExpr::prop("p"))));
        let f = norm(&mut man, &mut enc, &mut cache, &e);
        let t = tableau(&mut man, &mut enc, &f, 2, None).unwrap();
        assert!(t.is_false());
    }

    #[test]
    fn next_wraps_through_the_loopback() {
        let (mut man, mut enc, mut cache) = setup();
        let e = LtlExpr::next(LtlExpr::next(LtlExpr::next(LtlExpr::prop("p"))));
        let f = norm(&mut man, &mut enc, &mut cache, &e);
        // with loopback 0 and k = 2 the positions are 0,1,0,1,..: three
        // X steps from 0 land on time 1
        let t = tableau(&mut man, &mut enc, &f, 2, Some(0)).unwrap();
        let p = enc.name_to_untimed("p").unwrap();
        let p1 = enc.timed_var(p, 1).unwrap();
        assert_eq!(man.var_of(t), Some(p1));
    }

    #[test]
    fn finally_expands_over_the_whole_prefix() {
        let (mut man, mut enc, mut cache) = setup();
        let e = LtlExpr::eventually(LtlExpr::prop("p"));
        let f = norm(&mut man, &mut enc, &mut cache, &e);
        let t = tableau(&mut man, &mut enc, &f, 3, None).unwrap();
        // p@0 | p@1 | p@2 | p@3: every timed instance occurs
        let support = man.support(t);
        assert_eq!(support.len(), 4);
    }

    #[test]
    fn globally_without_loop_cannot_be_certified() {
        let (mut man, mut enc, mut cache) = setup();
        // a prefix never proves G p, whatever its states
        let e = LtlExpr::globally(LtlExpr::prop("p"));
        let f = norm(&mut man, &mut enc, &mut cache, &e);
        let t = tableau(&mut man, &mut enc, &f, 2, None).unwrap();
        assert!(t.is_false());
    }

    #[test]
    fn globally_with_a_loop_is_the_loop_conjunction() {
        let (mut man, mut enc, mut cache) = setup();
        let e = LtlExpr::globally(LtlExpr::prop("p"));
        let f = norm(&mut man, &mut enc, &mut cache, &e);
        let t = tableau(&mut man, &mut enc, &f, 2, Some(0)).unwrap();
        // over the lasso 0,1,0,1,.. G p is p@0 & p@1
        assert!(!t.is_constant());
        assert_eq!(man.support(t).len(), 2);
    }

    #[test]
    fn release_discharges_within_the_prefix() {
        let (mut man, mut enc, mut cache) = setup();
        // !(F !p) is G p: false on a prefix. But !(q U !p) with q = p
        // discharges where !q and p hold up to there.
        let e = LtlExpr::not(LtlExpr::until(
            LtlExpr::prop("p"),
            LtlExpr::not(LtlExpr::prop("p")),
        ));
        let f = norm(&mut man, &mut enc, &mut cache, &e);
        let t = tableau(&mut man, &mut enc, &f, 2, None).unwrap();
        // !p R p discharged needs !p & p somewhere: contradiction, so
        // the prefix can never certify it
        assert!(t.is_false());
    }

    #[test]
    fn invalid_loopback_is_rejected() {
        let (mut man, mut enc, mut cache) = setup();
        let e = LtlExpr::prop("p");
        let f = norm(&mut man, &mut enc, &mut cache, &e);
        assert!(tableau(&mut man, &mut enc, &f, 2, Some(2)).is_err());
        assert!(tableau(&mut man, &mut enc, &f, 2, Some(-1)).is_err());
    }

    #[test]
    fn past_operators_are_routed_elsewhere() {
        let (mut man, mut enc, mut cache) = setup();
        let e = LtlExpr::historically(LtlExpr::prop("p"));
        let f = norm(&mut man, &mut enc, &mut cache, &e);
        assert!(matches!(
            tableau(&mut man, &mut enc, &f, 2, None),
            Err(BmcError::UnsupportedFormula(_))
        ));
    }

    #[test]
    fn tableau_is_memoized_per_time() {
        let (mut man, mut enc, mut cache) = setup();
        let e = LtlExpr::eventually(LtlExpr::prop("p"));
        let f = norm(&mut man, &mut enc, &mut cache, &e);
        let a = tableau(&mut man, &mut enc, &f, 4, None).unwrap();
        let b = tableau(&mut man, &mut enc, &f, 4, None).unwrap();
        assert_eq!(a, b);
    }
}

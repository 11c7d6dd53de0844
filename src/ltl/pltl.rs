//! The past-time tableau: bounded encoding of PLTL formulas through
//! virtual unrolling.
//!
//! On a lasso, the truth of a past subformula at a loop position may
//! differ between the first and later visits; the value stabilizes after
//! as many loop traversals as the past operator nesting depth. The
//! encoding therefore evaluates over an extended position timeline that
//! unrolls the loop virtually — positions map back to concrete times, so
//! no extra path copies are built. The lasso case is exact; the no-loop
//! case answers pessimistically for the future fragment, like the
//! monolithic tableau, while the past fragment stays exact (the history
//! of a prefix is fully known).

use crate::{
    core::be_manager::BeManager,
    core::be_node::BeId,
    core::enc::BeEncoder,
    core::error::BmcError,
    ltl::formula::{LtlFormula, LtlNodeId, NormOp},
    misc::hash_select::HashMap,
};

/// Builds the PLTL tableau of `f` at time 0 for bound `k`; `loopback` is
/// the absolute loop time, `None` for the no-loop case. Handles the full
/// normalized kernel, past operators included; it is also used for pure
/// future formulas when the forced-PLTL option is set.
pub fn pltl_tableau(
    man: &mut BeManager,
    enc: &mut BeEncoder,
    f: &LtlFormula,
    k: i32,
    loopback: Option<i32>,
) -> Result<BeId, BmcError> {
    pltl_tableau_with_depth(man, enc, f, k, loopback, f.past_depth() as i32)
}

/// Like [`pltl_tableau`], with the number of virtual loop rounds forced;
/// used by the no-virtual-unrolling option of SBMC.
pub fn pltl_tableau_with_depth(
    man: &mut BeManager,
    enc: &mut BeEncoder,
    f: &LtlFormula,
    k: i32,
    loopback: Option<i32>,
    past_rounds: i32,
) -> Result<BeId, BmcError> {
    if let Some(l) = loopback {
        if l < 0 || l >= k {
            return Err(BmcError::InvalidBound(format!(
                "loopback {} outside [0, {})",
                l, k
            )));
        }
    }
    enc.grow_to(k);

    let (last, loop_len) = match loopback {
        None => (k, 0),
        Some(l) => {
            let loop_len = k - l;
            // one loop round per level of past nesting, plus one for the
            // eventualities
            let rounds = past_rounds + 1;
            (k - 1 + rounds * loop_len, loop_len)
        }
    };

    let mut builder = PltlTableau {
        man,
        enc,
        f,
        k,
        loopback,
        last,
        loop_len,
        memo: HashMap::default(),
    };
    builder.eval(f.root(), 0, false)
}

struct PltlTableau<'a> {
    man: &'a mut BeManager,
    enc: &'a mut BeEncoder,
    f: &'a LtlFormula,
    k: i32,
    loopback: Option<i32>,
    /// Highest position of the extended timeline
    last: i32,
    loop_len: i32,
    memo: HashMap<(LtlNodeId, i32, bool), BeId>,
}

impl<'a> PltlTableau<'a> {
    /// Concrete time of an extended position.
    fn time_of(&self, p: i32) -> i32 {
        match self.loopback {
            None => p,
            Some(l) => {
                if p < self.k {
                    p
                } else {
                    l + (p - self.k) % self.loop_len
                }
            }
        }
    }

    /// Successor on the extended timeline; the final position wraps into
    /// the stabilized last round.
    fn succ(&self, p: i32) -> Option<i32> {
        if p < self.last {
            return Some(p + 1);
        }
        match self.loopback {
            None => None,
            Some(_) => Some(self.last - self.loop_len + 1),
        }
    }

    fn eval(&mut self, id: LtlNodeId, p: i32, neg: bool) -> Result<BeId, BmcError> {
        if let Some(&e) = self.memo.get(&(id, p, neg)) {
            return Ok(e);
        }
        let result = match self.f.op(id) {
            NormOp::Atom(be) => {
                let t = self.time_of(p);
                let shifted = self.enc.shift_to_time(self.man, be, t)?;
                if neg {
                    !shifted
                } else {
                    shifted
                }
            }
            NormOp::Not(a) => self.eval(a, p, !neg)?,
            NormOp::Or(a, b) => {
                let ea = self.eval(a, p, neg)?;
                let eb = self.eval(b, p, neg)?;
                if neg {
                    self.man.and(ea, eb)
                } else {
                    self.man.or(ea, eb)
                }
            }
            NormOp::X(a) => match self.succ(p) {
                Some(next) => self.eval(a, next, neg)?,
                // without a loop the prefix certifies nothing past its
                // end, in either polarity
                None => BeId::FALSE,
            },
            NormOp::U(a, b) => match self.loopback {
                Some(_) => {
                    // the virtually unrolled lasso is exact
                    let u = self.until_expansion(a, b, p)?;
                    if neg {
                        !u
                    } else {
                        u
                    }
                }
                None => {
                    if neg {
                        self.release_discharge(a, b, p)?
                    } else {
                        self.until_expansion(a, b, p)?
                    }
                }
            },
            NormOp::Y(a) => {
                // the history of a position is fully known, so both
                // polarities are exact
                if p > 0 {
                    self.eval(a, p - 1, neg)?
                } else if neg {
                    BeId::TRUE
                } else {
                    BeId::FALSE
                }
            }
            NormOp::S(a, b) => {
                if neg {
                    // !(a S b) = !b & (!a | !(a S b) one step back)
                    let nb = self.eval(b, p, true)?;
                    if p == 0 {
                        nb
                    } else {
                        let na = self.eval(a, p, true)?;
                        let prev = self.eval(id, p - 1, true)?;
                        let or = self.man.or(na, prev);
                        self.man.and(nb, or)
                    }
                } else {
                    // b(p) | (a(p) & S(p-1)), folded from position 0 up
                    let eb = self.eval(b, p, false)?;
                    if p == 0 {
                        eb
                    } else {
                        let ea = self.eval(a, p, false)?;
                        let prev = self.eval(id, p - 1, false)?;
                        let tail = self.man.and(ea, prev);
                        self.man.or(eb, tail)
                    }
                }
            }
        };
        self.memo.insert((id, p, neg), result);
        Ok(result)
    }

    fn until_expansion(
        &mut self,
        a: LtlNodeId,
        b: LtlNodeId,
        p: i32,
    ) -> Result<BeId, BmcError> {
        let positions = self.until_positions(p);
        let mut acc = BeId::FALSE;
        for &j in positions.iter().rev() {
            let eb = self.eval(b, j, false)?;
            let ea = self.eval(a, j, false)?;
            let tail = self.man.and(ea, acc);
            acc = self.man.or(eb, tail);
        }
        Ok(acc)
    }

    fn release_discharge(
        &mut self,
        a: LtlNodeId,
        b: LtlNodeId,
        p: i32,
    ) -> Result<BeId, BmcError> {
        let mut acc = BeId::FALSE;
        for j in (p..=self.last).rev() {
            let na = self.eval(a, j, true)?;
            let nb = self.eval(b, j, true)?;
            let or = self.man.or(na, acc);
            acc = self.man.and(nb, or);
        }
        Ok(acc)
    }

    /// Witness positions of an until at `p`: forward along the extended
    /// timeline, following the wrap until every reachable position was
    /// seen once.
    fn until_positions(&self, p: i32) -> Vec<i32> {
        let mut positions = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut cur = Some(p);
        while let Some(q) = cur {
            if !seen.insert(q) {
                break;
            }
            positions.push(q);
            cur = self.succ(q);
        }
        positions
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
    fn yesterday_at_time_zero_is_false() {
        let (mut man, mut enc, mut cache) = setup();
        let e = LtlExpr::Y(Box::new(LtlExpr::prop("p")));
        let f = norm(&mut man, &mut enc, &mut cache, &e);
        let t = pltl_tableau(&mut man, &mut enc, &f, 3, None).unwrap();
        assert!(t.is_false());
    }

    #[test]
    fn not_yesterday_at_time_zero_is_true() {
        let (mut man, mut enc, mut cache) = setup();
        // Z p = !Y !p holds at time 0
        let e = LtlExpr::Z(Box::new(LtlExpr::prop("p")));
        let f = norm(&mut man, &mut enc, &mut cache, &e);
        let t = pltl_tableau(&mut man, &mut enc, &f, 3, None).unwrap();
        assert!(t.is_true());
    }

    #[test]
    fn once_at_time_zero_reduces_to_the_argument() {
        let (mut man, mut enc, mut cache) = setup();
        // O p = true S p; at position 0 only time 0 is in the past
        let e = LtlExpr::once(LtlExpr::prop("p"));
        let f = norm(&mut man, &mut enc, &mut cache, &e);
        let t = pltl_tableau(&mut man, &mut enc, &f, 3, None).unwrap();
        let p = enc.name_to_untimed("p").unwrap();
        let p0 = enc.timed_var(p, 0).unwrap();
        assert_eq!(man.var_of(t), Some(p0));
    }

    #[test]
    fn historically_is_falsified_by_the_first_step() {
        let (mut man, mut enc, mut cache) = setup();
        // !(H p) at time 0 is !p@0
        let e = LtlExpr::not(LtlExpr::historically(LtlExpr::prop("p")));
        let f = norm(&mut man, &mut enc, &mut cache, &e);
        let t = pltl_tableau(&mut man, &mut enc, &f, 2, None).unwrap();
        let p = enc.name_to_untimed("p").unwrap();
        let p0 = enc.timed_var(p, 0).unwrap();
        assert_eq!(man.var_of(t), Some(p0));
        assert!(t.is_complemented());
    }

    #[test]
    fn future_operators_agree_with_the_monolithic_tableau_without_loop() {
        let (mut man, mut enc, mut cache) = setup();
        let e = LtlExpr::eventually(LtlExpr::prop("p"));
        let f = norm(&mut man, &mut enc, &mut cache, &e);
        let a = pltl_tableau(&mut man, &mut enc, &f, 3, None).unwrap();
        let b = crate::ltl::tableau::tableau(&mut man, &mut enc, &f, 3, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn loop_timeline_never_samples_the_final_time() {
        let (mut man, mut enc, mut cache) = setup();
        let e = LtlExpr::globally(LtlExpr::eventually(LtlExpr::prop("p")));
        let f = norm(&mut man, &mut enc, &mut cache, &e);
        let t = pltl_tableau(&mut man, &mut enc, &f, 4, Some(2)).unwrap();
        let p = enc.name_to_untimed("p").unwrap();
        let p4 = enc.timed_var(p, 4).unwrap();
        assert!(!man.support(t).contains(&p4));
    }

    #[test]
    fn mixed_past_future_formula_collapses_when_trivial() {
        let (mut man, mut enc, mut cache) = setup();
        // G (p -> O p): p always implies "p held at some point"
        let e = LtlExpr::globally(LtlExpr::implies(
            LtlExpr::prop("p"),
            LtlExpr::once(LtlExpr::prop("p")),
        ));
        let f = norm(&mut man, &mut enc, &mut cache, &e);
        let t = pltl_tableau(&mut man, &mut enc, &f, 3, Some(1)).unwrap();
        assert!(t.is_true());
    }
}

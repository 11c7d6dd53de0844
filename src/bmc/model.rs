//! The model unroller: timed instances of init, invar and trans, the
//! loop equality and the loop-free path constraints.

use itertools::Itertools;

use crate::{
    core::be_manager::BeManager,
    core::be_node::BeId,
    core::enc::BeEncoder,
    core::error::BmcError,
    core::fsm::BeFsm,
};

/// `I(0) ∧ Inv(0)`: the initial-state condition of every problem.
pub fn init0(
    man: &mut BeManager,
    enc: &mut BeEncoder,
    fsm: &BeFsm,
) -> Result<BeId, BmcError> {
    enc.grow_to(1);
    let init = enc.shift_to_time(man, fsm.init(), 0)?;
    let invar = enc.shift_to_time(man, fsm.invar(), 0)?;
    Ok(man.and(init, invar))
}

/// `⋀_{i=j..k-1} T(i,i+1) ∧ ⋀_{i=j..k} Inv(i)`: the path segment from
/// time `j` to time `k`.
pub fn unrolling(
    man: &mut BeManager,
    enc: &mut BeEncoder,
    fsm: &BeFsm,
    j: i32,
    k: i32,
) -> Result<BeId, BmcError> {
    if j > k {
        return Err(BmcError::InvalidBound(format!(
            "unrolling range {}..{} is empty",
            j, k
        )));
    }
    enc.grow_to(k);

    let mut acc = BeId::TRUE;
    for i in j..k {
        let trans = enc.shift_to_time(man, fsm.trans(), i)?;
        acc = man.and(acc, trans);
    }
    for i in j..=k {
        let invar = enc.shift_to_time(man, fsm.invar(), i)?;
        acc = man.and(acc, invar);
    }
    Ok(acc)
}

/// `I(0) ∧ ⋀ T(i,i+1) ∧ ⋀ Inv(i)` up to bound `k`.
pub fn path_with_init(
    man: &mut BeManager,
    enc: &mut BeEncoder,
    fsm: &BeFsm,
    k: i32,
) -> Result<BeId, BmcError> {
    let init = init0(man, enc, fsm)?;
    let path = unrolling(man, enc, fsm, 0, k)?;
    Ok(man.and(init, path))
}

/// Equality of all state variables between times `t1` and `t2`; the
/// loop condition `loop_l(k)` is `state_equality(l, k)`. Input variables
/// take no part in it.
pub fn state_equality(
    man: &mut BeManager,
    enc: &mut BeEncoder,
    t1: i32,
    t2: i32,
) -> Result<BeId, BmcError> {
    enc.grow_to(t1.max(t2));
    let vars = enc.state_vars().to_vec();
    let mut acc = BeId::TRUE;
    for v in vars {
        let a = enc.timed_var(v, t1)?;
        let b = enc.timed_var(v, t2)?;
        let ba = man.var(a);
        let bb = man.var(b);
        let eq = man.iff(ba, bb);
        acc = man.and(acc, eq);
    }
    Ok(acc)
}

/// Fairness over the loop window: every fairness condition must hold at
/// least once in `[l, k)`. Finite prefixes carry no fairness obligation.
pub fn fairness_constraint(
    man: &mut BeManager,
    enc: &mut BeEncoder,
    fsm: &BeFsm,
    l: i32,
    k: i32,
) -> Result<BeId, BmcError> {
    enc.grow_to(k);
    let mut acc = BeId::TRUE;
    for f in fsm.fairness().to_vec() {
        let mut witness = BeId::FALSE;
        for t in l..k {
            let ft = enc.shift_to_time(man, f, t)?;
            witness = man.or(witness, ft);
        }
        acc = man.and(acc, witness);
    }
    Ok(acc)
}

/// The loop-free (simple path) constraint: no two states among times
/// `0..=k` coincide.
pub fn simple_path(
    man: &mut BeManager,
    enc: &mut BeEncoder,
    k: i32,
) -> Result<BeId, BmcError> {
    let mut acc = BeId::TRUE;
    for (i, j) in (0..=k).tuple_combinations() {
        let eq = state_equality(man, enc, i, j)?;
        acc = man.and(acc, !eq);
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bmc::demo;
    use crate::bmc::BmcEnv;

    fn counter_env() -> BmcEnv {
        let (symbols, fsm, _) = demo::mod4_counter();
        let mut env = BmcEnv::new(symbols);
        env.setup(&fsm, false).unwrap();
        env
    }

    #[test]
    fn unrolling_of_length_zero_is_the_invariant_only() {
        let mut env = counter_env();
        let fsm = env.fsm_cloned().unwrap();
        let u = unrolling(&mut env.man, &mut env.enc, &fsm, 0, 0).unwrap();
        // the demo counter has invar TRUE, so the empty unrolling is true
        assert!(u.is_true());
    }

    #[test]
    fn unrolling_grows_with_the_bound() {
        let mut env = counter_env();
        let fsm = env.fsm_cloned().unwrap();
        let u1 = unrolling(&mut env.man, &mut env.enc, &fsm, 0, 1).unwrap();
        let u3 = unrolling(&mut env.man, &mut env.enc, &fsm, 0, 3).unwrap();
        assert!(env.man.size(u3) > env.man.size(u1));
    }

    #[test]
    fn state_equality_is_reflexive() {
        let mut env = counter_env();
        let eq = state_equality(&mut env.man, &mut env.enc, 2, 2).unwrap();
        assert!(eq.is_true());
    }

    #[test]
    fn simple_path_constrains_every_pair() {
        let mut env = counter_env();
        let sp = simple_path(&mut env.man, &mut env.enc, 2).unwrap();
        assert!(!sp.is_constant());
    }

    #[test]
    fn empty_unrolling_range_is_rejected() {
        let mut env = counter_env();
        let fsm = env.fsm_cloned().unwrap();
        assert!(unrolling(&mut env.man, &mut env.enc, &fsm, 3, 1).is_err());
    }
}

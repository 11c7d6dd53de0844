//! Small self-contained systems bundled with the binary. The SMV parser
//! and flattener are external collaborators, so these take their place:
//! each returns the committed symbol table, the boolean flattened FSM
//! and a list of properties.

use crate::{
    core::conv::Sexp,
    core::fsm::SexpFsm,
    core::symbols::{SymbolLayer, SymbolTable},
    ltl::formula::LtlExpr,
};

/// A property shipped with a demo model.
#[derive(Debug, Clone)]
pub enum DemoProp {
    Invar { name: String, phi: Sexp },
    Ltl { name: String, formula: LtlExpr },
}

impl DemoProp {
    pub fn name(&self) -> &str {
        match self {
            DemoProp::Invar { name, .. } => name,
            DemoProp::Ltl { name, .. } => name,
        }
    }
}

/// Looks a demo system up by its CLI name.
pub fn by_name(name: &str) -> Option<(SymbolTable, SexpFsm, Vec<DemoProp>)> {
    match name {
        "counter" => Some(mod4_counter()),
        "mutex" => Some(mutex()),
        "cycle" => Some(fairness_cycle()),
        "chain" => Some(saturating_chain()),
        _ => None,
    }
}

pub const DEMO_NAMES: &[&str] = &["counter", "mutex", "cycle", "chain"];

/// Two-bit mod-4 counter: `x : 0..3; init(x) = 0; next(x) = (x+1) mod 4`.
pub fn mod4_counter() -> (SymbolTable, SexpFsm, Vec<DemoProp>) {
    let mut layer = SymbolLayer::new("counter");
    layer
        .add_state_var("x.0")
        .add_state_var("x.1")
        .add_scalar("x", &["x.0", "x.1"]);
    let mut symbols = SymbolTable::new();
    symbols.add_layer(layer);

    let init = Sexp::and(
        Sexp::not(Sexp::var("x.0")),
        Sexp::not(Sexp::var("x.1")),
    );
    // x+1 mod 4: low bit toggles, high bit absorbs the carry
    let trans = Sexp::and(
        Sexp::iff(Sexp::next_var("x.0"), Sexp::not(Sexp::var("x.0"))),
        Sexp::iff(
            Sexp::next_var("x.1"),
            Sexp::xor(Sexp::var("x.1"), Sexp::var("x.0")),
        ),
    );
    let fsm = SexpFsm {
        init,
        invar: Sexp::True,
        trans,
        fairness: Vec::new(),
    };

    let props = vec![
        DemoProp::Invar {
            name: "x-below-4".to_string(),
            // two bits cannot exceed 3
            phi: Sexp::True,
        },
        DemoProp::Invar {
            name: "x-never-3".to_string(),
            phi: Sexp::not(Sexp::and(Sexp::var("x.0"), Sexp::var("x.1"))),
        },
        DemoProp::Ltl {
            name: "eventually-3".to_string(),
            formula: LtlExpr::eventually(LtlExpr::atom(Sexp::and(
                Sexp::var("x.0"),
                Sexp::var("x.1"),
            ))),
        },
    ];

    (symbols, fsm, props)
}

/// Two processes guarded by a turn variable; the critical sections are
/// mutually exclusive by construction, the turn is left nondeterministic.
pub fn mutex() -> (SymbolTable, SexpFsm, Vec<DemoProp>) {
    let mut layer = SymbolLayer::new("mutex");
    layer
        .add_state_var("crit1")
        .add_state_var("crit2")
        .add_state_var("turn");
    let mut symbols = SymbolTable::new();
    symbols.add_layer(layer);

    let init = Sexp::and(
        Sexp::not(Sexp::var("crit1")),
        Sexp::not(Sexp::var("crit2")),
    );
    let trans = Sexp::and(
        Sexp::iff(
            Sexp::next_var("crit1"),
            Sexp::and(Sexp::not(Sexp::var("turn")), Sexp::not(Sexp::var("crit2"))),
        ),
        Sexp::iff(
            Sexp::next_var("crit2"),
            Sexp::and(Sexp::var("turn"), Sexp::not(Sexp::var("crit1"))),
        ),
    );
    let fsm = SexpFsm {
        init,
        invar: Sexp::True,
        trans,
        fairness: Vec::new(),
    };

    let props = vec![
        DemoProp::Invar {
            name: "mutual-exclusion".to_string(),
            phi: Sexp::not(Sexp::and(Sexp::var("crit1"), Sexp::var("crit2"))),
        },
        DemoProp::Ltl {
            name: "mutual-exclusion-ltl".to_string(),
            formula: LtlExpr::globally(LtlExpr::atom(Sexp::not(Sexp::and(
                Sexp::var("crit1"),
                Sexp::var("crit2"),
            )))),
        },
    ];

    (symbols, fsm, props)
}

/// Three states looping `s0 -> s1 -> s2 -> s1 -> …`, with `p` holding on
/// s0 and s2: the produced word is `p, !p, p, !p, …`.
pub fn fairness_cycle() -> (SymbolTable, SexpFsm, Vec<DemoProp>) {
    let mut layer = SymbolLayer::new("cycle");
    layer.add_state_var("b0").add_state_var("b1");
    let mut symbols = SymbolTable::new();
    symbols.add_layer(layer);

    // s0 = 00, s1 = 01, s2 = 10; p = !b0
    let init = Sexp::and(Sexp::not(Sexp::var("b0")), Sexp::not(Sexp::var("b1")));
    let trans = Sexp::and(
        Sexp::iff(Sexp::next_var("b0"), Sexp::not(Sexp::var("b0"))),
        Sexp::iff(Sexp::next_var("b1"), Sexp::var("b0")),
    );
    let fsm = SexpFsm {
        init,
        invar: Sexp::True,
        trans,
        fairness: Vec::new(),
    };

    let p = || LtlExpr::atom(Sexp::not(Sexp::var("b0")));
    let props = vec![
        DemoProp::Ltl {
            name: "eventually-always-p".to_string(),
            formula: LtlExpr::eventually(LtlExpr::globally(p())),
        },
        DemoProp::Ltl {
            name: "infinitely-often-p".to_string(),
            formula: LtlExpr::globally(LtlExpr::eventually(p())),
        },
    ];

    (symbols, fsm, props)
}

/// Three-bit saturating counter `x: 0, 1, 2, …, 7, 7, …` with `p = x>0`;
/// the pure past property `H p` fails right at time 0.
pub fn saturating_chain() -> (SymbolTable, SexpFsm, Vec<DemoProp>) {
    let mut layer = SymbolLayer::new("chain");
    layer
        .add_state_var("x.0")
        .add_state_var("x.1")
        .add_state_var("x.2")
        .add_scalar("x", &["x.0", "x.1", "x.2"]);
    let mut symbols = SymbolTable::new();
    symbols.add_layer(layer);

    let b = |n: &str| Sexp::var(n);
    let init = Sexp::conjoin(vec![
        Sexp::not(b("x.0")),
        Sexp::not(b("x.1")),
        Sexp::not(b("x.2")),
    ]);
    // x' = min(x+1, 7): a ripple-carry increment frozen at all-ones
    let saturated = Sexp::conjoin(vec![b("x.0"), b("x.1"), b("x.2")]);
    let inc0 = Sexp::iff(Sexp::next_var("x.0"), Sexp::not(b("x.0")));
    let inc1 = Sexp::iff(Sexp::next_var("x.1"), Sexp::xor(b("x.1"), b("x.0")));
    let inc2 = Sexp::iff(
        Sexp::next_var("x.2"),
        Sexp::xor(b("x.2"), Sexp::and(b("x.0"), b("x.1"))),
    );
    let hold = Sexp::conjoin(vec![
        Sexp::iff(Sexp::next_var("x.0"), b("x.0")),
        Sexp::iff(Sexp::next_var("x.1"), b("x.1")),
        Sexp::iff(Sexp::next_var("x.2"), b("x.2")),
    ]);
    let trans = Sexp::ite(
        saturated,
        hold,
        Sexp::conjoin(vec![inc0, inc1, inc2]),
    );
    let fsm = SexpFsm {
        init,
        invar: Sexp::True,
        trans,
        fairness: Vec::new(),
    };

    let p = Sexp::or(Sexp::or(b("x.0"), b("x.1")), b("x.2"));
    let props = vec![DemoProp::Ltl {
        name: "historically-positive".to_string(),
        formula: LtlExpr::historically(LtlExpr::atom(p)),
    }];

    (symbols, fsm, props)
}

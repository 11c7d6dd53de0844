//! Symbol layers describing the boolean variables of the model, as
//! committed by the external flattener. A layer partitions its variables
//! into state, frozen and input, and optionally groups bit variables
//! back into the scalar they encode.

/// Kind of a model variable.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum VarKind {
    State,
    Frozen,
    Input,
}

/// A scalar variable together with the boolean bits that encode it,
/// least significant bit first.
#[derive(Debug, Clone)]
pub struct ScalarGroup {
    pub name: String,
    pub bits: Vec<String>,
}

/// One committed block of variable declarations.
#[derive(Debug, Clone, Default)]
pub struct SymbolLayer {
    name: String,
    vars: Vec<(String, VarKind)>,
    scalars: Vec<ScalarGroup>,
}

impl SymbolLayer {
    pub fn new(name: &str) -> Self {
        SymbolLayer {
            name: name.to_string(),
            vars: Vec::new(),
            scalars: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_var(&mut self, name: &str, kind: VarKind) -> &mut Self {
        self.vars.push((name.to_string(), kind));
        self
    }

    pub fn add_state_var(&mut self, name: &str) -> &mut Self {
        self.add_var(name, VarKind::State)
    }

    pub fn add_frozen_var(&mut self, name: &str) -> &mut Self {
        self.add_var(name, VarKind::Frozen)
    }

    pub fn add_input_var(&mut self, name: &str) -> &mut Self {
        self.add_var(name, VarKind::Input)
    }

    /// Declares that the listed bit variables encode `name`. The bits
    /// must already be declared in this layer.
    pub fn add_scalar(&mut self, name: &str, bits: &[&str]) -> &mut Self {
        self.scalars.push(ScalarGroup {
            name: name.to_string(),
            bits: bits.iter().map(|b| b.to_string()).collect(),
        });
        self
    }

    pub fn vars(&self) -> impl Iterator<Item = (&str, VarKind)> {
        self.vars.iter().map(|(n, k)| (n.as_str(), *k))
    }

    pub fn scalars(&self) -> &[ScalarGroup] {
        &self.scalars
    }
}

/// The stack of committed layers. Lookup is injective across the whole
/// table; layers are removed in LIFO order only.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    layers: Vec<SymbolLayer>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_layer(&mut self, layer: SymbolLayer) {
        debug_assert!(
            self.layers.iter().all(|l| l.name() != layer.name()),
            "duplicate layer name"
        );
        self.layers.push(layer);
    }

    pub fn layers(&self) -> &[SymbolLayer] {
        &self.layers
    }

    pub fn kind_of(&self, name: &str) -> Option<VarKind> {
        self.layers
            .iter()
            .flat_map(|l| l.vars.iter())
            .find(|(n, _)| n == name)
            .map(|(_, k)| *k)
    }

    /// The scalar group a bit variable belongs to, with the bit's
    /// position inside it.
    pub fn scalar_of_bit(&self, bit: &str) -> Option<(&ScalarGroup, usize)> {
        for layer in &self.layers {
            for group in &layer.scalars {
                if let Some(pos) = group.bits.iter().position(|b| b == bit) {
                    return Some((group, pos));
                }
            }
        }
        None
    }

    pub fn scalar_groups(&self) -> impl Iterator<Item = &ScalarGroup> {
        self.layers.iter().flat_map(|l| l.scalars.iter())
    }
}

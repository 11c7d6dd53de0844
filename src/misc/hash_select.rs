//! Selection of the hash map/set implementations used throughout the crate.
//!
//! The unique table, the memoization tables and the CNF maps are all hot;
//! FxHash is the default, FNV can be selected through the `hash-fnv` feature.

#[cfg(not(feature = "hash-fnv"))]
pub use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

#[cfg(feature = "hash-fnv")]
pub use fnv::{FnvHashMap as HashMap, FnvHashSet as HashSet};

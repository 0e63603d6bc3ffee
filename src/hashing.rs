//! Deterministic hashing. The hashing data structures in the standard library are randomly
//! seeded, so iterating over them is not reproducible across runs. Every map and set in this crate
//! that can influence a random draw uses the `FxHash` variants re-exported here.
//!
//! Use `HashMap::default()` to create a new map with the deterministic hasher.
//!
//! [`hash_str`] derives stream seeds in [`crate::random`]. It must be stable across platforms and
//! releases, so it uses `xxh3` rather than `FxHash`.

pub use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use xxhash_rust::xxh3::xxh3_64;

/// A convenience method to compute the hash of a `&str`.
#[must_use]
pub fn hash_str(data: &str) -> u64 {
    xxh3_64(data.as_bytes())
}

//! Seeded random number generation.
//!
//! Every stochastic call in the crate goes through an explicit generator derived from one base
//! seed, so a fixed seed and fixed inputs reproduce the world and the infections bit for bit.
//! There are two ways to get a generator:
//!
//!  - shared streams, declared with [`define_rng!`] and drawn from through
//!    [`ContextRandomExt::sample`] and friends. Each stream is consumed sequentially, so the order
//!    of the calls matters. The transmission step uses one of these.
//!  - owned per-unit generators from [`ContextRandomExt::area_rng`], seeded from the stream name
//!    and a key such as an area name. These do not depend on the order in which units are built.
mod context_ext;
mod macros;

use std::any::{Any, TypeId};
use std::cell::RefCell;

pub use context_ext::ContextRandomExt;
pub use macros::define_rng;

use crate::define_data_plugin;
use crate::hashing::HashMap;
use crate::rand::SeedableRng;

pub trait RngId: Copy + Clone {
    type RngType: SeedableRng;
    fn get_name() -> &'static str;
}

// Allows for future support for different types of random number generators (anything that
// implements SeedableRng is valid).
struct RngHolder {
    rng: Box<dyn Any>,
}

struct RngData {
    base_seed: u64,
    rng_holders: RefCell<HashMap<TypeId, RngHolder>>,
}

// Registers a data container which stores:
// * base_seed: A base seed for all rngs
// * rng_holders: A map of rngs, keyed by their RngId. Stored in a RefCell to allow for mutable
//   borrow without requiring a mutable borrow of the Context itself.
define_data_plugin!(
    RngPlugin,
    RngData,
    RngData {
        base_seed: 0,
        rng_holders: RefCell::new(HashMap::default()),
    }
);

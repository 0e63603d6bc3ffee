use std::any::TypeId;
use std::cell::RefMut;

use log::trace;

use crate::context::Context;
use crate::hashing::hash_str;
use crate::rand::distr::uniform::{SampleRange, SampleUniform};
use crate::rand::distr::weighted::WeightedIndex;
use crate::rand::distr::Distribution;
use crate::rand::{Rng, SeedableRng};
use crate::random::{RngData, RngHolder, RngId, RngPlugin};
use crate::world::World;

fn rng_data(context: &Context) -> &RngData {
    context
        .get_data_container(RngPlugin)
        .expect("You must initialize the random number generator with a base seed")
}

/// Gets a mutable reference to the shared generator associated with the given [`RngId`]. If the
/// Rng has not been used before, one will be created from the base seed.
fn get_rng<R: RngId + 'static>(data_container: &RngData) -> RefMut<'_, R::RngType> {
    let rng_holders = data_container
        .rng_holders
        .try_borrow_mut()
        .expect("random number generator already borrowed");
    RefMut::map(rng_holders, |holders| {
        holders
            .entry(TypeId::of::<R>())
            .or_insert_with(|| {
                trace!(
                    "creating new RNG (seed={}) for {}",
                    data_container.base_seed,
                    R::get_name()
                );
                let seed_offset = hash_str(R::get_name());
                RngHolder {
                    rng: Box::new(R::RngType::seed_from_u64(
                        data_container.base_seed.wrapping_add(seed_offset),
                    )),
                }
            })
            .rng
            .downcast_mut::<R::RngType>()
            .expect("RNG holder has the wrong type")
    })
}

// A trait extension on Context for random number generation functionality.
pub trait ContextRandomExt {
    /// Stores the base seed. Shared generators are created lazily on first use, and any
    /// existing ones are dropped so they get re-seeded.
    fn init_random(&mut self, base_seed: u64);

    /// # Panics
    ///
    /// If `init_random` was not called yet.
    fn get_base_seed(&self) -> u64;

    /// Gets a random sample from the shared generator associated with the given [`RngId`] by
    /// applying the specified sampler function.
    ///
    /// # Panics
    ///
    /// If `init_random` was not called yet.
    fn sample<R: RngId + 'static, T>(
        &self,
        rng_type: R,
        sampler: impl FnOnce(&mut R::RngType) -> T,
    ) -> T;

    /// Gets a random sample within the range provided by `range`.
    fn sample_range<R: RngId + 'static, S, T>(&self, rng_id: R, range: S) -> T
    where
        R::RngType: Rng,
        S: SampleRange<T>,
        T: SampleUniform;

    /// Gets a random boolean value which is true with probability `p`.
    fn sample_bool<R: RngId + 'static>(&self, rng_id: R, p: f64) -> bool
    where
        R::RngType: Rng;

    /// Draws an index into `weights` with probability proportional to its weight.
    ///
    /// # Panics
    ///
    /// If the weights are empty, negative or all zero.
    fn sample_weighted<R: RngId + 'static>(&self, rng_id: R, weights: &[f64]) -> usize
    where
        R::RngType: Rng;

    /// An owned generator for one build unit, seeded from the base seed, the stream name and
    /// `key`. Two calls with the same key return identical generators.
    fn area_rng<R: RngId + 'static>(&self, rng_id: R, key: &str) -> R::RngType;

    /// Splits the context into the mutable world and the shared generator for `R`, for code
    /// that draws random numbers while mutating people.
    fn world_and_rng<R: RngId + 'static>(&mut self, rng_id: R)
        -> (&mut World, RefMut<'_, R::RngType>);
}

impl ContextRandomExt for Context {
    fn init_random(&mut self, base_seed: u64) {
        trace!("initializing random module");
        let data_container = self.get_data_container_mut(RngPlugin);
        data_container.base_seed = base_seed;
        data_container.rng_holders.get_mut().clear();
    }

    fn get_base_seed(&self) -> u64 {
        rng_data(self).base_seed
    }

    fn sample<R: RngId + 'static, T>(
        &self,
        _rng_type: R,
        sampler: impl FnOnce(&mut R::RngType) -> T,
    ) -> T {
        let mut rng = get_rng::<R>(rng_data(self));
        sampler(&mut rng)
    }

    fn sample_range<R: RngId + 'static, S, T>(&self, rng_id: R, range: S) -> T
    where
        R::RngType: Rng,
        S: SampleRange<T>,
        T: SampleUniform,
    {
        self.sample(rng_id, |rng| rng.random_range(range))
    }

    fn sample_bool<R: RngId + 'static>(&self, rng_id: R, p: f64) -> bool
    where
        R::RngType: Rng,
    {
        self.sample(rng_id, |rng| rng.random_bool(p))
    }

    fn sample_weighted<R: RngId + 'static>(&self, rng_id: R, weights: &[f64]) -> usize
    where
        R::RngType: Rng,
    {
        let index = WeightedIndex::new(weights).expect("invalid sampling weights");
        self.sample(rng_id, |rng| index.sample(rng))
    }

    fn area_rng<R: RngId + 'static>(&self, _rng_id: R, key: &str) -> R::RngType {
        let seed = self
            .get_base_seed()
            .wrapping_add(hash_str(R::get_name()))
            .wrapping_add(hash_str(key));
        trace!("creating {} for {key} (seed={seed})", R::get_name());
        R::RngType::seed_from_u64(seed)
    }

    fn world_and_rng<R: RngId + 'static>(
        &mut self,
        _rng_id: R,
    ) -> (&mut World, RefMut<'_, R::RngType>) {
        // Disjoint borrows of the world and the plugin map.
        let data_container = self
            .data_plugins
            .get(&TypeId::of::<RngPlugin>())
            .and_then(|container| container.downcast_ref::<RngData>())
            .expect("You must initialize the random number generator with a base seed");
        (&mut self.world, get_rng::<R>(data_container))
    }
}

//! The central object of a simulation is the [`Context`]. It owns the [`World`] registry (people,
//! facilities and geography) and holds module-specific data in data plugins, so that the random
//! number generators, parameters and report writers can live alongside the world without the
//! world knowing about them.
use std::any::{Any, TypeId};

use crate::hashing::HashMap;
use crate::world::World;

/// A trait for objects that can provide data containers to be held by `Context`.
pub trait DataPlugin: Any {
    type DataContainer;

    fn create_data_container() -> Self::DataContainer;
}

/// Defines a new type for storing data in `Context`.
#[macro_export]
macro_rules! define_data_plugin {
    ($plugin:ident, $data_container:ty, $default: expr) => {
        struct $plugin;

        impl $crate::context::DataPlugin for $plugin {
            type DataContainer = $data_container;

            fn create_data_container() -> Self::DataContainer {
                $default
            }
        }
    };
}
pub use define_data_plugin;

pub struct Context {
    pub(crate) world: World,
    pub(crate) data_plugins: HashMap<TypeId, Box<dyn Any>>,
    current_time: f64,
}

impl Context {
    /// A context around an empty world.
    #[must_use]
    pub fn new() -> Context {
        Context::with_world(World::default())
    }

    #[must_use]
    pub fn with_world(world: World) -> Context {
        Context {
            world,
            data_plugins: HashMap::default(),
            current_time: 0.0,
        }
    }

    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Replaces the world, e.g. with one read back from a snapshot, and returns the old one.
    pub fn replace_world(&mut self, world: World) -> World {
        std::mem::replace(&mut self.world, world)
    }

    /// Retrieves a mutable reference to the data container associated with a `DataPlugin`,
    /// creating it on first use.
    ///
    /// # Panics
    ///
    /// Never in practice: the container stored under `T`'s type id always has type
    /// `T::DataContainer`.
    #[allow(clippy::missing_panics_doc)]
    pub fn get_data_container_mut<T: DataPlugin>(&mut self, _plugin: T) -> &mut T::DataContainer {
        self.data_plugins
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(T::create_data_container()))
            .downcast_mut::<T::DataContainer>()
            .expect("data plugin container has the wrong type")
    }

    /// Retrieves the data container associated with a `DataPlugin`, or `None` if the plugin has
    /// never been used.
    #[must_use]
    pub fn get_data_container<T: DataPlugin>(&self, _plugin: T) -> Option<&T::DataContainer> {
        self.data_plugins
            .get(&TypeId::of::<T>())
            .and_then(|container| container.downcast_ref::<T::DataContainer>())
    }

    #[must_use]
    pub fn get_current_time(&self) -> f64 {
        self.current_time
    }

    /// Advances the simulation clock.
    ///
    /// # Panics
    ///
    /// If `time` is not finite or is earlier than the current time.
    pub fn set_current_time(&mut self, time: f64) {
        assert!(
            time.is_finite() && time >= self.current_time,
            "Invalid time value"
        );
        self.current_time = time;
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

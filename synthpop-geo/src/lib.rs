//! # Geography for Synthetic Populations
//!
//! A synthetic population is laid out over a three level geographic hierarchy: fine grained
//! [`Area`]s are grouped into [`SuperArea`]s, which are grouped into [`Region`]s. Every area and
//! super area carries a coordinate pair so that facilities can be matched to the people living
//! near them.
//!
//! This library provides
//!  - [`Coordinates`] and the great-circle distance between two points ([`great_circle_km`]),
//!  - the [`Geography`] hierarchy, built from parsed hierarchy rows and coordinate tables,
//!  - a read-only [`SpatialIndex`] answering k-nearest and within-radius queries over a fixed
//!    coordinate set.
//!
//! Identifiers are dense `u32` indices into the vectors held by [`Geography`], so lookups are
//! plain indexing and the hierarchy serializes without pointers.

// Positive instances of the following lints have been audited.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

pub mod coordinates;
pub mod errors;
pub mod geography;
pub mod spatial_index;

pub use coordinates::{great_circle_km, Coordinates, EARTH_RADIUS_KM};
pub use errors::GeoError;
pub use geography::{
    Area, AreaId, Geography, HierarchyRow, Region, RegionId, SuperArea, SuperAreaId,
};
pub use spatial_index::SpatialIndex;

//!
//! Errors raised while assembling a [`crate::Geography`]. Queries never fail: an unknown name is
//! reported as `None` and an empty [`crate::SpatialIndex`] answers every query with an empty
//! result.
//!

use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum GeoError {
    /// No hierarchy rows were supplied.
    EmptyGeography,
    /// An area row has no coordinates in the area coordinate table.
    MissingCoordinates { area: String },
    /// The same area name appears in two hierarchy rows.
    DuplicateArea { area: String },
    /// An area name was looked up that is not part of the hierarchy.
    UnknownArea { area: String },
    /// A super area name was looked up that is not part of the hierarchy.
    UnknownSuperArea { super_area: String },
    /// A super area is listed under two different regions.
    InconsistentRegion {
        super_area: String,
        first: String,
        second: String,
    },
}

impl Display for GeoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GeoError::EmptyGeography => write!(f, "geography has no areas"),
            GeoError::MissingCoordinates { area } => {
                write!(f, "no coordinates for area {area}")
            }
            GeoError::DuplicateArea { area } => {
                write!(f, "area {area} appears more than once in the hierarchy")
            }
            GeoError::UnknownArea { area } => write!(f, "unknown area {area}"),
            GeoError::UnknownSuperArea { super_area } => {
                write!(f, "unknown super area {super_area}")
            }
            GeoError::InconsistentRegion {
                super_area,
                first,
                second,
            } => write!(
                f,
                "super area {super_area} is assigned to both region {first} and region {second}"
            ),
        }
    }
}

impl Error for GeoError {}

// Tested in `geography.rs`.

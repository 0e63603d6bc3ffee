/*!

Latitude/longitude pairs and great-circle distances. Coordinates are stored in degrees, the way
they appear in census coordinate tables, and converted to radians only when a distance is
needed.

*/

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Mean Earth radius used for every distance in the workspace.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Copy, Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Arithmetic mean of a set of coordinates. Good enough for the small extents of a super
    /// area; returns `None` for an empty set.
    #[must_use]
    pub fn centroid<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Coordinates>,
    {
        let mut count = 0usize;
        let mut latitude = 0.0;
        let mut longitude = 0.0;
        for point in points {
            count += 1;
            latitude += point.latitude;
            longitude += point.longitude;
        }
        if count == 0 {
            return None;
        }
        Some(Self::new(latitude / count as f64, longitude / count as f64))
    }
}

impl Display for Coordinates {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.5}, {:.5})", self.latitude, self.longitude)
    }
}

/// Haversine distance in kilometres.
#[must_use]
pub fn great_circle_km(a: &Coordinates, b: &Coordinates) -> f64 {
    let (lat1, lon1) = (a.latitude.to_radians(), a.longitude.to_radians());
    let (lat2, lon2) = (b.latitude.to_radians(), b.longitude.to_radians());
    let sin_dlat = ((lat2 - lat1) * 0.5).sin();
    let sin_dlon = ((lon2 - lon1) * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).max(0.0).sqrt())
}

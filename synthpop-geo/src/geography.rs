/*!

The area / super area / region hierarchy.

A [`Geography`] is assembled once from parsed hierarchy rows (`area -> super_area -> region`) and
the coordinate tables, and is immutable afterwards. Rows are processed in input order, so area,
super area and region identifiers are assigned deterministically: the first time a name is seen
it receives the next free index.

Back references are identifiers, never pointers: an [`Area`] knows its [`SuperAreaId`], a
[`SuperArea`] lists its [`AreaId`]s.

*/

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{Coordinates, GeoError, SpatialIndex};

macro_rules! define_geo_id {
    ($name:ident, $label:literal) => {
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            #[must_use]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($label, "{}"), self.0)
            }
        }
    };
}

define_geo_id!(AreaId, "area#");
define_geo_id!(SuperAreaId, "super_area#");
define_geo_id!(RegionId, "region#");

/// One parsed row of the geography hierarchy table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyRow {
    pub area: String,
    pub super_area: String,
    pub region: String,
}

impl HierarchyRow {
    pub fn new(area: &str, super_area: &str, region: &str) -> Self {
        Self {
            area: area.to_string(),
            super_area: super_area.to_string(),
            region: region.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Area {
    pub id: AreaId,
    pub name: String,
    pub coordinates: Coordinates,
    pub super_area: SuperAreaId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuperArea {
    pub id: SuperAreaId,
    pub name: String,
    pub coordinates: Coordinates,
    pub region: RegionId,
    pub areas: Vec<AreaId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub name: String,
    pub super_areas: Vec<SuperAreaId>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Geography {
    areas: Vec<Area>,
    super_areas: Vec<SuperArea>,
    regions: Vec<Region>,
    #[serde(skip)]
    area_index: SpatialIndex<AreaId>,
    #[serde(skip)]
    super_area_index: SpatialIndex<SuperAreaId>,
}

impl PartialEq for Geography {
    fn eq(&self, other: &Self) -> bool {
        self.areas == other.areas
            && self.super_areas == other.super_areas
            && self.regions == other.regions
    }
}

impl Geography {
    /// Builds the hierarchy. Super areas without an entry in `super_area_coordinates` are placed
    /// at the centroid of their areas.
    ///
    /// # Errors
    ///
    /// Fails on an empty row set, a repeated area, an area without coordinates, or a super area
    /// that is listed under two regions.
    pub fn from_rows(
        rows: &[HierarchyRow],
        area_coordinates: &BTreeMap<String, Coordinates>,
        super_area_coordinates: &BTreeMap<String, Coordinates>,
    ) -> Result<Self, GeoError> {
        if rows.is_empty() {
            return Err(GeoError::EmptyGeography);
        }
        let mut areas: Vec<Area> = Vec::with_capacity(rows.len());
        let mut super_areas: Vec<SuperArea> = Vec::new();
        let mut regions: Vec<Region> = Vec::new();
        let mut area_names: BTreeMap<&str, AreaId> = BTreeMap::new();
        let mut super_area_names: BTreeMap<&str, SuperAreaId> = BTreeMap::new();
        let mut region_names: BTreeMap<&str, RegionId> = BTreeMap::new();

        for row in rows {
            if area_names.contains_key(row.area.as_str()) {
                return Err(GeoError::DuplicateArea {
                    area: row.area.clone(),
                });
            }
            let coordinates =
                *area_coordinates
                    .get(&row.area)
                    .ok_or_else(|| GeoError::MissingCoordinates {
                        area: row.area.clone(),
                    })?;

            let region_id = *region_names.entry(row.region.as_str()).or_insert_with(|| {
                let id = RegionId(regions.len() as u32);
                regions.push(Region {
                    id,
                    name: row.region.clone(),
                    super_areas: Vec::new(),
                });
                id
            });

            let super_area_id = match super_area_names.get(row.super_area.as_str()) {
                Some(id) => {
                    let existing = &super_areas[id.index()];
                    if existing.region != region_id {
                        return Err(GeoError::InconsistentRegion {
                            super_area: row.super_area.clone(),
                            first: regions[existing.region.index()].name.clone(),
                            second: row.region.clone(),
                        });
                    }
                    *id
                }
                None => {
                    let id = SuperAreaId(super_areas.len() as u32);
                    super_areas.push(SuperArea {
                        id,
                        name: row.super_area.clone(),
                        coordinates: Coordinates::default(),
                        region: region_id,
                        areas: Vec::new(),
                    });
                    regions[region_id.index()].super_areas.push(id);
                    super_area_names.insert(row.super_area.as_str(), id);
                    id
                }
            };

            let area_id = AreaId(areas.len() as u32);
            areas.push(Area {
                id: area_id,
                name: row.area.clone(),
                coordinates,
                super_area: super_area_id,
            });
            super_areas[super_area_id.index()].areas.push(area_id);
            area_names.insert(row.area.as_str(), area_id);
        }

        for super_area in &mut super_areas {
            super_area.coordinates = match super_area_coordinates.get(&super_area.name) {
                Some(coordinates) => *coordinates,
                None => Coordinates::centroid(
                    super_area
                        .areas
                        .iter()
                        .map(|area| &areas[area.index()].coordinates),
                )
                .unwrap_or_default(),
            };
        }

        let mut geography = Geography {
            areas,
            super_areas,
            regions,
            area_index: SpatialIndex::Empty,
            super_area_index: SpatialIndex::Empty,
        };
        geography.rebuild_indexes();
        Ok(geography)
    }

    /// Rebuilds the derived area and super area indexes. Needed after deserialization, since the
    /// indexes are never serialized.
    pub fn rebuild_indexes(&mut self) {
        self.area_index = SpatialIndex::build(self.areas.iter().map(|a| (a.id, a.coordinates)));
        self.super_area_index =
            SpatialIndex::build(self.super_areas.iter().map(|s| (s.id, s.coordinates)));
    }

    #[must_use]
    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    #[must_use]
    pub fn super_areas(&self) -> &[SuperArea] {
        &self.super_areas
    }

    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    #[must_use]
    pub fn area(&self, id: AreaId) -> &Area {
        &self.areas[id.index()]
    }

    #[must_use]
    pub fn super_area(&self, id: SuperAreaId) -> &SuperArea {
        &self.super_areas[id.index()]
    }

    #[must_use]
    pub fn region(&self, id: RegionId) -> &Region {
        &self.regions[id.index()]
    }

    #[must_use]
    pub fn region_of_area(&self, id: AreaId) -> RegionId {
        self.super_area(self.area(id).super_area).region
    }

    /// Linear lookup by name. Only meant for loading and tests.
    #[must_use]
    pub fn area_by_name(&self, name: &str) -> Option<AreaId> {
        self.areas.iter().find(|a| a.name == name).map(|a| a.id)
    }

    #[must_use]
    pub fn super_area_by_name(&self, name: &str) -> Option<SuperAreaId> {
        self.super_areas
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.id)
    }

    /// Like [`Geography::area_by_name`], for input tables where an unknown name is an error.
    ///
    /// # Errors
    ///
    /// [`GeoError::UnknownArea`] if no area has this name.
    pub fn require_area(&self, name: &str) -> Result<AreaId, GeoError> {
        self.area_by_name(name).ok_or_else(|| GeoError::UnknownArea {
            area: name.to_string(),
        })
    }

    /// # Errors
    ///
    /// [`GeoError::UnknownSuperArea`] if no super area has this name.
    pub fn require_super_area(&self, name: &str) -> Result<SuperAreaId, GeoError> {
        self.super_area_by_name(name)
            .ok_or_else(|| GeoError::UnknownSuperArea {
                super_area: name.to_string(),
            })
    }

    /// The `k` areas closest to `coordinates`, nearest first.
    #[must_use]
    pub fn closest_areas(&self, coordinates: &Coordinates, k: usize) -> Vec<(AreaId, f64)> {
        self.area_index.k_nearest(coordinates, k)
    }

    #[must_use]
    pub fn closest_super_areas(
        &self,
        coordinates: &Coordinates,
        k: usize,
    ) -> Vec<(SuperAreaId, f64)> {
        self.super_area_index.k_nearest(coordinates, k)
    }
}

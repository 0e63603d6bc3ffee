//! Facilities: capacitated places where people meet.
//!
//! Every facility kind has a fixed table of subgroups (workers/residents/visitors for care homes,
//! teachers/students for schools, one slot per household for shelters). Behavior that differs by
//! kind is keyed on [`FacilityKind`] and the kind-specific data in [`FacilityDetail`].
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, EnumCount, EnumIter, EnumString};
use synthpop_geo::{AreaId, Coordinates, SuperAreaId};

use crate::people::PersonId;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct FacilityId(pub u32);

impl FacilityId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for FacilityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "facility#{}", self.0)
    }
}

#[derive(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Debug,
    Serialize,
    Deserialize,
    StrumDisplay,
    EnumIter,
    EnumCount,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FacilityKind {
    Household,
    Shelter,
    School,
    LearningCenter,
    PlayGroup,
    CareHome,
    Communal,
    FemaleCommunal,
    PumpLatrine,
    DistributionCenter,
    EVoucher,
    NonFoodDistributionCenter,
}

impl FacilityKind {
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Number of subgroups a facility of this kind starts with. Schools and play groups size
    /// their tables from their age structure instead.
    #[must_use]
    pub fn default_subgroup_count(self) -> usize {
        match self {
            FacilityKind::Household => 4,
            FacilityKind::Shelter | FacilityKind::School | FacilityKind::LearningCenter => 2,
            FacilityKind::CareHome => 3,
            _ => 1,
        }
    }

    /// Whether members of `subgroup` count toward `max_size`. Staff and visitors do not.
    #[must_use]
    pub fn counts_toward_capacity(self, subgroup: usize) -> bool {
        match self {
            FacilityKind::School | FacilityKind::LearningCenter => subgroup != TEACHERS,
            FacilityKind::CareHome => subgroup == CareHomeSubgroup::Residents as usize,
            _ => true,
        }
    }

    /// Kinds a leisure distributor can register people to.
    #[must_use]
    pub fn is_leisure(self) -> bool {
        matches!(
            self,
            FacilityKind::Communal
                | FacilityKind::FemaleCommunal
                | FacilityKind::PumpLatrine
                | FacilityKind::DistributionCenter
                | FacilityKind::EVoucher
                | FacilityKind::NonFoodDistributionCenter
        )
    }
}

/// Subgroup of teachers in schools and learning centers. Students follow.
pub const TEACHERS: usize = 0;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum HouseholdSubgroup {
    Kids = 0,
    YoungAdults = 1,
    Adults = 2,
    OldAdults = 3,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum CareHomeSubgroup {
    Workers = 0,
    Residents = 1,
    Visitors = 2,
}

/// A person's membership: which facility, which subgroup.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct SubgroupRef {
    pub facility: FacilityId,
    pub subgroup: usize,
}

impl SubgroupRef {
    #[must_use]
    pub fn new(facility: FacilityId, subgroup: usize) -> Self {
        SubgroupRef { facility, subgroup }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum FacilityDetail {
    #[default]
    None,
    School {
        age_min: u8,
        age_max: u8,
        n_teachers_max: usize,
    },
    Shelter {
        /// Households in slot order.
        households: Vec<FacilityId>,
        /// Other shelters of the same super area whose residents this shelter visits.
        visit_targets: Vec<FacilityId>,
    },
    LearningCenter {
        n_shifts: u8,
        /// Shift of each student, parallel to the student subgroup.
        shifts: Vec<u8>,
    },
    PlayGroup {
        /// Inclusive age band of each subgroup.
        age_bands: Vec<(u8, u8)>,
    },
}

/// A facility read from a coordinate list, before it is placed in an area.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FacilitySite {
    pub coordinates: Coordinates,
    /// Overrides the configured capacity of the kind.
    #[serde(default)]
    pub max_size: Option<usize>,
}

/// Everything needed to register a new facility with the world.
#[derive(Clone, Debug)]
pub struct FacilitySpec {
    pub kind: FacilityKind,
    pub area: AreaId,
    pub coordinates: Coordinates,
    pub max_size: usize,
    pub subgroups: usize,
    pub detail: FacilityDetail,
}

impl FacilitySpec {
    #[must_use]
    pub fn new(kind: FacilityKind, area: AreaId, coordinates: Coordinates, max_size: usize) -> Self {
        let detail = match kind {
            FacilityKind::Shelter => FacilityDetail::Shelter {
                households: Vec::new(),
                visit_targets: Vec::new(),
            },
            FacilityKind::LearningCenter => FacilityDetail::LearningCenter {
                n_shifts: 1,
                shifts: Vec::new(),
            },
            _ => FacilityDetail::None,
        };
        FacilitySpec {
            kind,
            area,
            coordinates,
            max_size,
            subgroups: kind.default_subgroup_count(),
            detail,
        }
    }

    /// A school with one student subgroup per year of age after the teachers.
    #[must_use]
    pub fn school(
        area: AreaId,
        coordinates: Coordinates,
        n_pupils_max: usize,
        age_min: u8,
        age_max: u8,
    ) -> Self {
        FacilitySpec {
            subgroups: 2 + usize::from(age_max.saturating_sub(age_min)),
            detail: FacilityDetail::School {
                age_min,
                age_max,
                n_teachers_max: 0,
            },
            ..FacilitySpec::new(FacilityKind::School, area, coordinates, n_pupils_max)
        }
    }

    #[must_use]
    pub fn learning_center(
        area: AreaId,
        coordinates: Coordinates,
        max_size: usize,
        n_shifts: u8,
    ) -> Self {
        FacilitySpec {
            detail: FacilityDetail::LearningCenter {
                n_shifts: n_shifts.max(1),
                shifts: Vec::new(),
            },
            ..FacilitySpec::new(FacilityKind::LearningCenter, area, coordinates, max_size)
        }
    }

    #[must_use]
    pub fn play_group(
        area: AreaId,
        coordinates: Coordinates,
        max_size: usize,
        age_bands: Vec<(u8, u8)>,
    ) -> Self {
        FacilitySpec {
            subgroups: age_bands.len().max(1),
            detail: FacilityDetail::PlayGroup { age_bands },
            ..FacilitySpec::new(FacilityKind::PlayGroup, area, coordinates, max_size)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub id: FacilityId,
    pub kind: FacilityKind,
    pub area: AreaId,
    pub super_area: SuperAreaId,
    pub coordinates: Coordinates,
    /// Capacity in people, or in households for shelters. `usize::MAX` is unbounded.
    pub max_size: usize,
    pub subgroups: Vec<Vec<PersonId>>,
    pub detail: FacilityDetail,
}

impl Facility {
    #[must_use]
    pub fn subgroup(&self, subgroup: usize) -> &[PersonId] {
        self.subgroups.get(subgroup).map_or(&[], Vec::as_slice)
    }

    pub fn members(&self) -> impl Iterator<Item = PersonId> + '_ {
        self.subgroups.iter().flatten().copied()
    }

    /// Everyone, staff included.
    #[must_use]
    pub fn size(&self) -> usize {
        self.subgroups.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// What `max_size` is compared against: households for shelters, otherwise members of the
    /// subgroups that count toward capacity.
    #[must_use]
    pub fn occupancy(&self) -> usize {
        if let FacilityDetail::Shelter { households, .. } = &self.detail {
            return households.len();
        }
        self.subgroups
            .iter()
            .enumerate()
            .filter(|(i, _)| self.kind.counts_toward_capacity(*i))
            .map(|(_, members)| members.len())
            .sum()
    }

    #[must_use]
    pub fn has_space(&self) -> bool {
        self.occupancy() < self.max_size
    }

    /// Households held by a shelter, zero for every other kind.
    #[must_use]
    pub fn n_households(&self) -> usize {
        match &self.detail {
            FacilityDetail::Shelter { households, .. } => households.len(),
            _ => 0,
        }
    }

    /// Age range admitted by a school.
    #[must_use]
    pub fn school_ages(&self) -> Option<(u8, u8)> {
        match self.detail {
            FacilityDetail::School {
                age_min, age_max, ..
            } => Some((age_min, age_max)),
            _ => None,
        }
    }

    /// Subgroup of a student of `age`, if this is a school admitting that age.
    #[must_use]
    pub fn student_subgroup(&self, age: u8) -> Option<usize> {
        let (age_min, age_max) = self.school_ages()?;
        (age_min..=age_max)
            .contains(&age)
            .then(|| 1 + usize::from(age - age_min))
    }

    /// Subgroup whose age band contains `age`, for play groups.
    #[must_use]
    pub fn age_band_subgroup(&self, age: u8) -> Option<usize> {
        match &self.detail {
            FacilityDetail::PlayGroup { age_bands } => age_bands
                .iter()
                .position(|(low, high)| (*low..=*high).contains(&age)),
            _ => Some(0),
        }
    }
}

//! Schools: students by year of age, then teachers per super area.
//!
//! Each age gets its own candidate index over the schools admitting it. Children of mandatory
//! school age go to the nearest of the `k` candidates with room, overfilling a random one when
//! all are full. Children of other school ages are placed only where the school has room and
//! its year is not over its share (`n_pupils_max / (age_max - age_min)`); otherwise they stay
//! at home. Teachers are dealt round-robin over the super area's schools from the adults with
//! no primary activity.
use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use synthpop_geo::{AreaId, Coordinates, SpatialIndex, SuperAreaId};

use super::venue::{choose_facility, OverflowPolicy, Placement};
use crate::audit::{AuditEvent, BuildAudit};
use crate::error::SimError;
use crate::facility::{FacilityDetail, FacilityId, FacilityKind, SubgroupRef, TEACHERS};
use crate::log::{debug, info, warn};
use crate::parameters::SchoolParameters;
use crate::people::{Activity, PersonId};
use crate::world::World;

/// A school read from a coordinate list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchoolSite {
    pub coordinates: Coordinates,
    pub n_pupils_max: usize,
    pub age_min: u8,
    pub age_max: u8,
}

/// Per-age spatial indexes over schools.
#[derive(Clone, Debug, Default)]
pub struct SchoolIndex {
    by_age: BTreeMap<u8, SpatialIndex<FacilityId>>,
}

impl SchoolIndex {
    #[must_use]
    pub fn build(world: &World) -> Self {
        let mut sites: BTreeMap<u8, Vec<(FacilityId, Coordinates)>> = BTreeMap::new();
        for school in world.facilities_of_kind(FacilityKind::School) {
            if let Some((age_min, age_max)) = school.school_ages() {
                for age in age_min..=age_max {
                    sites
                        .entry(age)
                        .or_default()
                        .push((school.id, school.coordinates));
                }
            }
        }
        SchoolIndex {
            by_age: sites
                .into_iter()
                .map(|(age, sites)| (age, SpatialIndex::build(sites)))
                .collect(),
        }
    }

    /// The `k` schools nearest to `area` that admit `age`.
    #[must_use]
    pub fn candidates(&self, world: &World, area: AreaId, age: u8, k: usize) -> Vec<FacilityId> {
        let Some(index) = self.by_age.get(&age) else {
            return Vec::new();
        };
        let coordinates = world.geography().area(area).coordinates;
        index
            .k_nearest(&coordinates, k)
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    #[must_use]
    pub fn admits(&self, age: u8) -> bool {
        self.by_age.contains_key(&age)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_age.is_empty()
    }
}

/// Whether a school has room for one more student of `age` outside the mandatory ages.
fn has_year_slot(world: &World, school: FacilityId, age: u8) -> bool {
    let school = world.facility(school);
    let Some((age_min, age_max)) = school.school_ages() else {
        return false;
    };
    let Some(subgroup) = school.student_subgroup(age) else {
        return false;
    };
    let years = usize::from(age_max - age_min).max(1);
    school.has_space() && school.subgroup(subgroup).len() < school.max_size / years
}

pub struct SchoolDistributor<'a> {
    parameters: &'a SchoolParameters,
    index: &'a SchoolIndex,
}

impl<'a> SchoolDistributor<'a> {
    #[must_use]
    pub fn new(parameters: &'a SchoolParameters, index: &'a SchoolIndex) -> Self {
        SchoolDistributor { parameters, index }
    }

    /// Places the school-age residents of `area`. Returns the number of students placed.
    ///
    /// # Errors
    ///
    /// [`SimError::Configuration`] if there are children of mandatory school age but no schools
    /// at all. A child whose age no school admits is counted as unplaced.
    pub fn distribute_students<R: Rng>(
        &self,
        world: &mut World,
        area: AreaId,
        rng: &mut R,
        audit: &mut BuildAudit,
    ) -> Result<usize, SimError> {
        let mandatory = self.parameters.mandatory_age_range;
        let mut candidates_by_age: BTreeMap<u8, Vec<FacilityId>> = BTreeMap::new();
        let mut placed = 0;
        for person_id in world.residents(area).to_vec() {
            let person = world.person(person_id);
            let age = person.age;
            if person.primary_activity.is_some() {
                continue;
            }
            if !self.index.admits(age) {
                if mandatory.contains(age) {
                    if self.index.is_empty() {
                        return Err(SimError::configuration(
                            &world.geography().area(area).name,
                            "no schools for children of mandatory school age",
                        ));
                    }
                    audit.record(AuditEvent::Unplaced, FacilityKind::School);
                }
                continue;
            }
            let candidates = candidates_by_age.entry(age).or_insert_with(|| {
                self.index
                    .candidates(world, area, age, self.parameters.k_candidates)
            });
            let placement = if mandatory.contains(age) {
                choose_facility(
                    candidates,
                    |id| world.facility(id).has_space(),
                    OverflowPolicy::RandomAmongCandidates,
                    rng,
                )
            } else {
                choose_facility(
                    candidates,
                    |id| has_year_slot(world, id, age),
                    OverflowPolicy::Skip,
                    rng,
                )
            };
            let school = match placement {
                Placement::Placed(id) => id,
                Placement::Overflow(id) => {
                    debug!("{person_id} aged {age} overflows into {id}");
                    audit.record(AuditEvent::Overflow, FacilityKind::School);
                    id
                }
                Placement::NoRoom | Placement::NoCandidates => {
                    audit.record(AuditEvent::Skipped, FacilityKind::School);
                    continue;
                }
            };
            let Some(subgroup) = world.facility(school).student_subgroup(age) else {
                continue;
            };
            world.add_to_facility(
                person_id,
                SubgroupRef::new(school, subgroup),
                Activity::PrimaryActivity,
            );
            placed += 1;
        }
        Ok(placed)
    }

    /// Staffs the schools of `super_area`. Each school with pupils needs
    /// `max(1, round(n_pupils / students_per_teacher))` teachers. Returns the number of teachers
    /// placed.
    pub fn distribute_teachers<R: Rng>(
        &self,
        world: &mut World,
        super_area: SuperAreaId,
        rng: &mut R,
    ) -> usize {
        let mut schools = world.facilities_in_super_area(super_area, FacilityKind::School);
        for school in &schools {
            let facility = world.facility_mut(*school);
            let n_pupils = facility.occupancy();
            let needed = if n_pupils == 0 {
                0
            } else {
                ((n_pupils as f64 / self.parameters.students_per_teacher).round() as usize).max(1)
            };
            if let FacilityDetail::School { n_teachers_max, .. } = &mut facility.detail {
                *n_teachers_max = needed;
            }
        }
        let mut teachers: Vec<PersonId> = world
            .geography()
            .super_area(super_area)
            .areas
            .iter()
            .flat_map(|area| world.residents(*area).iter().copied())
            .filter(|id| {
                let person = world.person(*id);
                person.age >= self.parameters.teacher_min_age && person.primary_activity.is_none()
            })
            .collect();
        teachers.shuffle(rng);
        schools.shuffle(rng);

        let teachers_needed = |world: &World, school: FacilityId| match world.facility(school).detail
        {
            FacilityDetail::School { n_teachers_max, .. } => n_teachers_max,
            _ => 0,
        };
        let mut placed = 0;
        loop {
            let mut progress = false;
            for school in &schools {
                if world.facility(*school).subgroup(TEACHERS).len() >= teachers_needed(world, *school)
                {
                    continue;
                }
                let Some(teacher) = teachers.pop() else {
                    let missing: usize = schools
                        .iter()
                        .map(|s| {
                            teachers_needed(world, *s)
                                .saturating_sub(world.facility(*s).subgroup(TEACHERS).len())
                        })
                        .sum();
                    warn!("{super_area}: ran out of teachers, {missing} positions open");
                    return placed;
                };
                world.add_to_facility(
                    teacher,
                    SubgroupRef::new(*school, TEACHERS),
                    Activity::PrimaryActivity,
                );
                placed += 1;
                progress = true;
            }
            if !progress {
                break;
            }
        }
        info!("{super_area}: {placed} teachers");
        placed
    }
}

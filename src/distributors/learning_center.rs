//! Learning centers: enrollment by sex and age, a shift per student, one teacher per center.
use rand::seq::IndexedRandom;
use rand::Rng;
use synthpop_geo::AreaId;

use super::venue::{choose_facility, OverflowPolicy, Placement};
use crate::audit::{AuditEvent, BuildAudit};
use crate::error::SimError;
use crate::facility::{FacilityDetail, FacilityId, FacilityKind, SubgroupRef, TEACHERS};
use crate::log::{debug, info, warn};
use crate::parameters::LearningCenterParameters;
use crate::people::{Activity, PersonId};
use crate::world::World;

pub struct LearningCenterDistributor<'a> {
    parameters: &'a LearningCenterParameters,
}

impl<'a> LearningCenterDistributor<'a> {
    #[must_use]
    pub fn new(parameters: &'a LearningCenterParameters) -> Self {
        LearningCenterDistributor { parameters }
    }

    fn n_shifts(world: &World, center: FacilityId) -> u8 {
        match world.facility(center).detail {
            FacilityDetail::LearningCenter { n_shifts, .. } => n_shifts.max(1),
            _ => 1,
        }
    }

    /// Enrolls the children of `area`. Returns the number of students placed.
    ///
    /// # Errors
    ///
    /// [`SimError::Configuration`] if a child is enrolled but there is no learning center.
    pub fn distribute_students<R: Rng>(
        &self,
        world: &mut World,
        area: AreaId,
        rng: &mut R,
        audit: &mut BuildAudit,
    ) -> Result<usize, SimError> {
        let coordinates = world.geography().area(area).coordinates;
        let candidates: Vec<FacilityId> = world
            .spatial_index(FacilityKind::LearningCenter)
            .k_nearest(&coordinates, self.parameters.k_candidates)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        let mut placed = 0;
        for person_id in world.residents(area).to_vec() {
            let person = world.person(person_id);
            if person.primary_activity.is_some() {
                continue;
            }
            let rate = self
                .parameters
                .enrollment_rate(person.sex, person.age)
                .clamp(0.0, 1.0);
            if rate == 0.0 {
                continue;
            }
            if !rng.random_bool(rate) {
                audit.record(AuditEvent::Skipped, FacilityKind::LearningCenter);
                continue;
            }
            let center = match choose_facility(
                &candidates,
                |id| world.facility(id).has_space(),
                OverflowPolicy::RandomAmongCandidates,
                rng,
            ) {
                Placement::Placed(id) => id,
                Placement::Overflow(id) => {
                    debug!("{person_id} overflows into learning center {id}");
                    audit.record(AuditEvent::Overflow, FacilityKind::LearningCenter);
                    id
                }
                Placement::NoRoom | Placement::NoCandidates => {
                    return Err(SimError::configuration(
                        &world.geography().area(area).name,
                        "no learning center for enrolled children",
                    ));
                }
            };
            let shift = rng.random_range(0..Self::n_shifts(world, center));
            world.add_learning_center_student(person_id, center, shift);
            placed += 1;
        }
        Ok(placed)
    }

    /// Gives every learning center one teacher, drawn from the adults with no primary activity
    /// in the area closest to the center, moving outwards while an area has none. Returns the
    /// number of teachers placed.
    pub fn distribute_teachers<R: Rng>(
        &self,
        world: &mut World,
        rng: &mut R,
        audit: &mut BuildAudit,
    ) -> usize {
        let centers: Vec<FacilityId> = world
            .facilities_of_kind(FacilityKind::LearningCenter)
            .map(|center| center.id)
            .collect();
        let n_areas = world.geography().areas().len();
        let mut placed = 0;
        for center in centers {
            if !world.facility(center).subgroup(TEACHERS).is_empty() {
                continue;
            }
            let coordinates = world.facility(center).coordinates;
            let teacher = world
                .geography()
                .closest_areas(&coordinates, n_areas)
                .into_iter()
                .find_map(|(area, _)| {
                    let adults: Vec<PersonId> = world
                        .residents(area)
                        .iter()
                        .copied()
                        .filter(|id| {
                            let person = world.person(*id);
                            person.age >= self.parameters.teacher_min_age
                                && person.primary_activity.is_none()
                        })
                        .collect();
                    adults.choose(rng).copied()
                });
            match teacher {
                Some(teacher) => {
                    world.add_to_facility(
                        teacher,
                        SubgroupRef::new(center, TEACHERS),
                        Activity::PrimaryActivity,
                    );
                    placed += 1;
                }
                None => {
                    warn!("no teacher for learning center {center}");
                    audit.record(AuditEvent::Unplaced, FacilityKind::LearningCenter);
                }
            }
        }
        info!("{placed} learning center teachers");
        placed
    }
}

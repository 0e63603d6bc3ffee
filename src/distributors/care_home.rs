//! Care homes: communal residents by age band and sex, then workers.
//!
//! Residents are counted per super area. Each band's count is split over the super area's care
//! homes in proportion to their capacity, rounding down; what rounding leaves over goes to
//! uniformly random care homes. Residents are seated before households are formed, so they are
//! taken from people with no residence yet: oldest band first, from the care home's own area
//! and then from the rest of the super area.
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use synthpop_geo::{AreaId, SuperAreaId};

use super::venue::{apportion, place_residual};
use crate::audit::{AuditEvent, BuildAudit};
use crate::error::SimError;
use crate::facility::{CareHomeSubgroup, FacilityKind, SubgroupRef};
use crate::log::{info, warn};
use crate::parameters::{AgeRange, CareHomeParameters};
use crate::people::{Activity, PersonId, Sex};
use crate::world::World;

/// Number of communal residents of one sex and age band in a super area.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommunalBand {
    pub ages: AgeRange,
    pub sex: Sex,
    pub count: usize,
}

pub struct CareHomeDistributor<'a> {
    parameters: &'a CareHomeParameters,
}

impl<'a> CareHomeDistributor<'a> {
    #[must_use]
    pub fn new(parameters: &'a CareHomeParameters) -> Self {
        CareHomeDistributor { parameters }
    }

    /// Takes up to `n` people of the band from `areas`, oldest first.
    fn take_residents(
        world: &World,
        areas: &[AreaId],
        band: &CommunalBand,
        n: usize,
    ) -> Vec<PersonId> {
        let mut chosen = Vec::with_capacity(n);
        for area in areas {
            if chosen.len() == n {
                break;
            }
            let mut candidates: Vec<PersonId> = world
                .residents(*area)
                .iter()
                .copied()
                .filter(|id| {
                    let person = world.person(*id);
                    person.residence.is_none()
                        && person.sex == band.sex
                        && band.ages.contains(person.age)
                })
                .collect();
            candidates.sort_by_key(|id| std::cmp::Reverse(world.person(*id).age));
            chosen.extend(candidates.into_iter().take(n - chosen.len()));
        }
        chosen
    }

    /// Seats the communal residents of `super_area`. Returns the number of residents placed.
    ///
    /// # Errors
    ///
    /// [`SimError::Configuration`] naming the super area if it has communal residents but no
    /// care homes.
    pub fn distribute_residents<R: Rng>(
        &self,
        world: &mut World,
        super_area: SuperAreaId,
        bands: &[CommunalBand],
        rng: &mut R,
        audit: &mut BuildAudit,
    ) -> Result<usize, SimError> {
        let total: usize = bands.iter().map(|band| band.count).sum();
        if total == 0 {
            return Ok(0);
        }
        let homes = world.facilities_in_super_area(super_area, FacilityKind::CareHome);
        if homes.is_empty() {
            return Err(SimError::configuration(
                &world.geography().super_area(super_area).name,
                format!("{total} communal residents but no care homes"),
            ));
        }
        let capacities: Vec<f64> = homes
            .iter()
            .map(|home| world.facility(*home).max_size as f64)
            .collect();
        let mut bands: Vec<&CommunalBand> = bands.iter().collect();
        bands.sort_by_key(|band| std::cmp::Reverse(band.ages.max));

        let mut placed = 0;
        for band in bands {
            let mut shares = apportion(band.count, &capacities);
            let residual = band.count - shares.iter().sum::<usize>();
            for _ in 0..residual {
                if let Some(home) = place_residual(&homes, rng) {
                    if let Some(i) = homes.iter().position(|h| *h == home) {
                        shares[i] += 1;
                    }
                }
            }
            audit.record_n(AuditEvent::ResidualPlacement, FacilityKind::CareHome, residual);

            for (home, share) in homes.iter().zip(shares) {
                let home_area = world.facility(*home).area;
                let mut areas = vec![home_area];
                areas.extend(
                    world
                        .geography()
                        .super_area(super_area)
                        .areas
                        .iter()
                        .copied()
                        .filter(|area| *area != home_area),
                );
                let residents = Self::take_residents(world, &areas, band, share);
                if residents.len() < share {
                    warn!(
                        "{home}: {} of {share} residents aged {}..={} found",
                        residents.len(),
                        band.ages.min,
                        band.ages.max
                    );
                    audit.record_n(
                        AuditEvent::Unplaced,
                        FacilityKind::CareHome,
                        share - residents.len(),
                    );
                }
                for resident in residents {
                    world.add_to_facility(
                        resident,
                        SubgroupRef::new(*home, CareHomeSubgroup::Residents as usize),
                        Activity::Residence,
                    );
                    placed += 1;
                }
            }
        }
        info!(
            "{}: {placed} care home residents",
            world.geography().super_area(super_area).name
        );
        Ok(placed)
    }

    /// Staffs the care homes of `super_area` with `ceil(residents / residents_per_worker)`
    /// workers each. Returns the number of workers placed.
    pub fn distribute_workers<R: Rng>(
        &self,
        world: &mut World,
        super_area: SuperAreaId,
        rng: &mut R,
    ) -> usize {
        let homes = world.facilities_in_super_area(super_area, FacilityKind::CareHome);
        if homes.is_empty() {
            return 0;
        }
        let mut workers: Vec<PersonId> = world
            .geography()
            .super_area(super_area)
            .areas
            .iter()
            .flat_map(|area| world.residents(*area).iter().copied())
            .filter(|id| {
                let person = world.person(*id);
                self.parameters.worker_ages.contains(person.age)
                    && person.primary_activity.is_none()
                    && person.residence.is_some_and(|residence| {
                        world.facility(residence.facility).kind != FacilityKind::CareHome
                    })
            })
            .collect();
        workers.shuffle(rng);
        let mut placed = 0;
        for home in homes {
            let residents = world
                .facility(home)
                .subgroup(CareHomeSubgroup::Residents as usize)
                .len();
            let needed = (residents as f64 / self.parameters.residents_per_worker).ceil() as usize;
            for _ in 0..needed {
                let Some(worker) = workers.pop() else {
                    warn!("{home}: ran out of care workers");
                    return placed;
                };
                world.add_to_facility(
                    worker,
                    SubgroupRef::new(home, CareHomeSubgroup::Workers as usize),
                    Activity::PrimaryActivity,
                );
                placed += 1;
            }
        }
        placed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facility::{FacilityId, FacilitySpec};
    use crate::world::tests::test_geography;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn world_with_homes(capacities: &[usize]) -> World {
        let mut world = World::new(test_geography());
        for (i, capacity) in capacities.iter().enumerate() {
            let area = AreaId(i as u32 % 2);
            let coordinates = world.geography().area(area).coordinates;
            world.add_facility(FacilitySpec::new(
                FacilityKind::CareHome,
                area,
                coordinates,
                *capacity,
            ));
        }
        world
    }

    #[test]
    fn oldest_first_from_own_area() {
        let mut world = world_with_homes(&[10]);
        let older = world.add_person(91, Sex::Female, AreaId(0));
        world.add_person(70, Sex::Female, AreaId(0));
        let other_area = world.add_person(95, Sex::Female, AreaId(1));
        let bands = [CommunalBand {
            ages: AgeRange::new(65, 99),
            sex: Sex::Female,
            count: 2,
        }];
        let parameters = CareHomeParameters::default();
        let mut audit = BuildAudit::default();
        let mut rng = SmallRng::seed_from_u64(0);
        let placed = CareHomeDistributor::new(&parameters)
            .distribute_residents(&mut world, SuperAreaId(0), &bands, &mut rng, &mut audit)
            .unwrap();
        assert_eq!(placed, 2);
        let residents = world
            .facility(FacilityId(0))
            .subgroup(CareHomeSubgroup::Residents as usize);
        assert_eq!(residents[0], older);
        assert!(!residents.contains(&other_area));
    }

    #[test]
    fn apportioned_by_capacity_with_residual() {
        let mut world = world_with_homes(&[10, 10, 10]);
        for _ in 0..30 {
            world.add_person(80, Sex::Male, AreaId(0));
            world.add_person(80, Sex::Male, AreaId(1));
        }
        let bands = [CommunalBand {
            ages: AgeRange::new(65, 99),
            sex: Sex::Male,
            count: 10,
        }];
        let parameters = CareHomeParameters::default();
        let mut audit = BuildAudit::default();
        let mut rng = SmallRng::seed_from_u64(0);
        let placed = CareHomeDistributor::new(&parameters)
            .distribute_residents(&mut world, SuperAreaId(0), &bands, &mut rng, &mut audit)
            .unwrap();
        assert_eq!(placed, 10);
        assert_eq!(
            audit.count(AuditEvent::ResidualPlacement, FacilityKind::CareHome),
            1
        );
    }

    #[test]
    fn missing_care_homes() {
        let mut world = World::new(test_geography());
        world.add_person(80, Sex::Male, AreaId(2));
        let bands = [CommunalBand {
            ages: AgeRange::new(65, 99),
            sex: Sex::Male,
            count: 1,
        }];
        let parameters = CareHomeParameters::default();
        let mut audit = BuildAudit::default();
        let mut rng = SmallRng::seed_from_u64(0);
        let result = CareHomeDistributor::new(&parameters).distribute_residents(
            &mut world,
            SuperAreaId(1),
            &bands,
            &mut rng,
            &mut audit,
        );
        assert!(matches!(result, Err(SimError::Configuration { .. })));
    }

    #[test]
    fn workers_per_resident() {
        let mut world = world_with_homes(&[10]);
        let coordinates = world.geography().area(AreaId(0)).coordinates;
        let household =
            world.add_facility(FacilitySpec::new(FacilityKind::Household, AreaId(0), coordinates, 10));
        for _ in 0..5 {
            let resident = world.add_person(85, Sex::Female, AreaId(0));
            world.add_to_facility(
                resident,
                SubgroupRef::new(FacilityId(0), CareHomeSubgroup::Residents as usize),
                Activity::Residence,
            );
        }
        for _ in 0..4 {
            let adult = world.add_person(30, Sex::Male, AreaId(0));
            world.add_to_facility(adult, SubgroupRef::new(household, 2), Activity::Residence);
        }
        let parameters = CareHomeParameters::default();
        let mut rng = SmallRng::seed_from_u64(0);
        let placed =
            CareHomeDistributor::new(&parameters).distribute_workers(&mut world, SuperAreaId(0), &mut rng);
        // ceil(5 / 4)
        assert_eq!(placed, 2);
    }
}

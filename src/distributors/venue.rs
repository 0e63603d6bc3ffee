//! The capacity / age / proximity assignment shared by every facility kind.
//!
//! For each unit (a person, or a household for shelters):
//!
//! 1. units outside the age range are dropped before any placement,
//! 2. candidates are the `k` facilities nearest to the unit's area, never the full set,
//! 3. the first candidate, nearest first, with spare capacity is chosen,
//! 4. if every candidate is full, the [`OverflowPolicy`] decides: either a uniformly random
//!    candidate is overfilled, or the unit is skipped. The search radius is never widened.
//!
//! Role splitting (teachers before students, age bands) happens in the callers before this
//! runs. Per-capita facility generation and residual placement after proportional allocation
//! are the free functions at the bottom.
use std::collections::BTreeMap;

use rand::seq::IndexedRandom;
use rand::Rng;
use synthpop_geo::AreaId;

use crate::audit::{AuditEvent, BuildAudit};
use crate::error::SimError;
use crate::facility::{Facility, FacilityId, FacilityKind, SubgroupRef};
use crate::log::{debug, trace};
use crate::parameters::AgeRange;
use crate::people::{Activity, Person, PersonId, Sex};
use crate::world::World;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum OverflowPolicy {
    /// Overfill a uniformly chosen candidate.
    RandomAmongCandidates,
    /// Leave the unit unplaced.
    Skip,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Placement {
    Placed(FacilityId),
    /// Placed in a candidate that was already full.
    Overflow(FacilityId),
    /// Every candidate was full and the policy is [`OverflowPolicy::Skip`].
    NoRoom,
    NoCandidates,
}

impl Placement {
    #[must_use]
    pub fn facility(self) -> Option<FacilityId> {
        match self {
            Placement::Placed(id) | Placement::Overflow(id) => Some(id),
            Placement::NoRoom | Placement::NoCandidates => None,
        }
    }
}

/// Capacity check in nearest-first order with the overflow fallback. `has_space` decides what
/// "full" means for the caller.
pub fn choose_facility<R: Rng>(
    candidates: &[FacilityId],
    has_space: impl Fn(FacilityId) -> bool,
    policy: OverflowPolicy,
    rng: &mut R,
) -> Placement {
    if candidates.is_empty() {
        return Placement::NoCandidates;
    }
    if let Some(id) = candidates.iter().copied().find(|id| has_space(*id)) {
        return Placement::Placed(id);
    }
    match policy {
        OverflowPolicy::RandomAmongCandidates => match candidates.choose(rng) {
            Some(id) => Placement::Overflow(*id),
            None => Placement::NoCandidates,
        },
        OverflowPolicy::Skip => Placement::NoRoom,
    }
}

/// Places people into facilities of one kind.
#[derive(Clone, Debug)]
pub struct VenueDistributor {
    pub kind: FacilityKind,
    pub k_candidates: usize,
    pub ages: AgeRange,
    pub sex: Option<Sex>,
    pub overflow: OverflowPolicy,
    pub activity: Activity,
}

impl VenueDistributor {
    #[must_use]
    pub fn new(kind: FacilityKind, k_candidates: usize, ages: AgeRange, activity: Activity) -> Self {
        VenueDistributor {
            kind,
            k_candidates,
            ages,
            sex: None,
            overflow: OverflowPolicy::RandomAmongCandidates,
            activity,
        }
    }

    #[must_use]
    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    #[must_use]
    pub fn with_sex(mut self, sex: Option<Sex>) -> Self {
        self.sex = sex;
        self
    }

    #[must_use]
    pub fn is_eligible(&self, person: &Person) -> bool {
        self.ages.contains(person.age) && self.sex.is_none_or(|sex| sex == person.sex)
    }

    /// Nearest `k_candidates` facilities of this kind to the centre of `area`, from the world's
    /// spatial index.
    #[must_use]
    pub fn candidates(&self, world: &World, area: AreaId) -> Vec<FacilityId> {
        let coordinates = world.geography().area(area).coordinates;
        world
            .spatial_index(self.kind)
            .k_nearest(&coordinates, self.k_candidates)
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    /// Places every eligible person among the `k_candidates` facilities nearest to their area.
    /// `subgroup` picks the subgroup of the chosen facility for a person, or `None` to leave them
    /// out. Returns the number of people placed.
    ///
    /// # Errors
    ///
    /// [`SimError::Configuration`] naming the area if there is no facility of this kind to
    /// choose from.
    pub fn distribute<R: Rng>(
        &self,
        world: &mut World,
        people: &[PersonId],
        subgroup: impl Fn(&Facility, &Person) -> Option<usize>,
        rng: &mut R,
        audit: &mut BuildAudit,
    ) -> Result<usize, SimError> {
        let mut candidates_by_area: BTreeMap<AreaId, Vec<FacilityId>> = BTreeMap::new();
        self.distribute_among(
            world,
            people,
            |world, area, _| {
                candidates_by_area
                    .entry(area)
                    .or_insert_with(|| self.candidates(world, area))
                    .clone()
            },
            subgroup,
            rng,
            audit,
        )
    }

    /// As [`VenueDistributor::distribute`], with the candidate list of each person's area, in
    /// preference order, supplied by `candidates_for`.
    ///
    /// # Errors
    ///
    /// [`SimError::Configuration`] naming the area if `candidates_for` returns nothing.
    pub fn distribute_among<R: Rng>(
        &self,
        world: &mut World,
        people: &[PersonId],
        mut candidates_for: impl FnMut(&World, AreaId, &mut R) -> Vec<FacilityId>,
        subgroup: impl Fn(&Facility, &Person) -> Option<usize>,
        rng: &mut R,
        audit: &mut BuildAudit,
    ) -> Result<usize, SimError> {
        let mut placed = 0;
        for &person_id in people {
            let person = world.person(person_id);
            if !self.is_eligible(person) {
                continue;
            }
            let area = person.area;
            let candidates = candidates_for(world, area, rng);
            let placement =
                choose_facility(&candidates, |id| world.facility(id).has_space(), self.overflow, rng);
            let facility_id = match placement {
                Placement::Placed(id) => id,
                Placement::Overflow(id) => {
                    debug!("{}: {person_id} overflows into {id}", self.kind);
                    audit.record(AuditEvent::Overflow, self.kind);
                    id
                }
                Placement::NoRoom => {
                    audit.record(AuditEvent::Skipped, self.kind);
                    continue;
                }
                Placement::NoCandidates => {
                    return Err(SimError::configuration(
                        &world.geography().area(area).name,
                        format!("no {} to distribute people to", self.kind),
                    ));
                }
            };
            let Some(index) = subgroup(world.facility(facility_id), world.person(person_id)) else {
                audit.record(AuditEvent::Skipped, self.kind);
                continue;
            };
            trace!("{}: {person_id} -> {facility_id}/{index}", self.kind);
            world.add_to_facility(
                person_id,
                SubgroupRef::new(facility_id, index),
                self.activity,
            );
            placed += 1;
        }
        Ok(placed)
    }
}

/// Facilities to create for an eligible population: always rounded up, so a non-empty
/// population gets at least one.
#[must_use]
pub fn venues_for_population(venues_per_capita: f64, eligible: usize) -> usize {
    (venues_per_capita * eligible as f64).ceil() as usize
}

/// Splits `total` in proportion to `weights`, rounding each share down. The shares sum to at
/// most `total`; the difference is the residual left for [`place_residual`].
#[must_use]
pub fn apportion(total: usize, weights: &[f64]) -> Vec<usize> {
    let sum: f64 = weights.iter().sum();
    if sum <= 0.0 {
        return vec![0; weights.len()];
    }
    weights
        .iter()
        .map(|weight| (total as f64 * weight / sum).floor() as usize)
        .collect()
}

/// Uniform choice among an area's existing facilities, for units left over after rounding.
pub fn place_residual<R: Rng>(facilities: &[FacilityId], rng: &mut R) -> Option<FacilityId> {
    facilities.choose(rng).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facility::FacilitySpec;
    use crate::people::Sex;
    use crate::world::tests::test_geography;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn world_with_venues(max_size: usize) -> World {
        let mut world = World::new(test_geography());
        for area in [AreaId(0), AreaId(2)] {
            let coordinates = world.geography().area(area).coordinates;
            world.add_facility(FacilitySpec::new(
                FacilityKind::Communal,
                area,
                coordinates,
                max_size,
            ));
        }
        world.rebuild_spatial_index(FacilityKind::Communal);
        world
    }

    fn distributor(k: usize) -> VenueDistributor {
        VenueDistributor::new(
            FacilityKind::Communal,
            k,
            AgeRange::new(10, 60),
            Activity::Leisure,
        )
    }

    #[test]
    fn nearest_with_space_first() {
        let mut world = world_with_venues(2);
        let people: Vec<_> = (0..3)
            .map(|_| world.add_person(20, Sex::Male, AreaId(0)))
            .collect();
        let mut audit = BuildAudit::default();
        let mut rng = SmallRng::seed_from_u64(1);
        let placed = distributor(2)
            .distribute(&mut world, &people, |_, _| Some(0), &mut rng, &mut audit)
            .unwrap();
        assert_eq!(placed, 3);
        assert_eq!(world.facility(FacilityId(0)).size(), 2);
        assert_eq!(world.facility(FacilityId(1)).size(), 1);
        assert!(audit.is_clean());
    }

    #[test]
    fn ineligible_people_are_dropped_first() {
        let mut world = world_with_venues(10);
        let people = vec![
            world.add_person(5, Sex::Male, AreaId(0)),
            world.add_person(70, Sex::Female, AreaId(0)),
            world.add_person(30, Sex::Male, AreaId(0)),
        ];
        let mut audit = BuildAudit::default();
        let mut rng = SmallRng::seed_from_u64(1);
        let placed = distributor(1)
            .with_sex(Some(Sex::Male))
            .distribute(&mut world, &people, |_, _| Some(0), &mut rng, &mut audit)
            .unwrap();
        assert_eq!(placed, 1);
        assert!(world.person(people[0]).leisure.is_empty());
        assert_eq!(world.person(people[2]).leisure.len(), 1);
    }

    #[test]
    fn overflow_stays_within_candidates() {
        let mut world = world_with_venues(1);
        let people: Vec<_> = (0..5)
            .map(|_| world.add_person(20, Sex::Male, AreaId(0)))
            .collect();
        let mut audit = BuildAudit::default();
        let mut rng = SmallRng::seed_from_u64(1);
        distributor(1)
            .distribute(&mut world, &people, |_, _| Some(0), &mut rng, &mut audit)
            .unwrap();
        // k = 1: the far venue is never considered, however full the near one gets.
        assert_eq!(world.facility(FacilityId(0)).size(), 5);
        assert_eq!(world.facility(FacilityId(1)).size(), 0);
        assert_eq!(audit.count(AuditEvent::Overflow, FacilityKind::Communal), 4);
    }

    #[test]
    fn skip_policy_leaves_people_out() {
        let mut world = world_with_venues(1);
        let people: Vec<_> = (0..3)
            .map(|_| world.add_person(20, Sex::Male, AreaId(0)))
            .collect();
        let mut audit = BuildAudit::default();
        let mut rng = SmallRng::seed_from_u64(1);
        let placed = distributor(2)
            .with_overflow(OverflowPolicy::Skip)
            .distribute(&mut world, &people, |_, _| Some(0), &mut rng, &mut audit)
            .unwrap();
        assert_eq!(placed, 2);
        assert_eq!(audit.total(AuditEvent::Skipped), 1);
        for facility in world.facilities() {
            assert!(facility.occupancy() <= facility.max_size);
        }
    }

    #[test]
    fn no_facilities_is_a_configuration_error() {
        let mut world = World::new(test_geography());
        let people = vec![world.add_person(20, Sex::Male, AreaId(1))];
        let mut audit = BuildAudit::default();
        let mut rng = SmallRng::seed_from_u64(1);
        let result =
            distributor(3).distribute(&mut world, &people, |_, _| Some(0), &mut rng, &mut audit);
        assert!(matches!(
            result,
            Err(SimError::Configuration { unit, .. }) if unit == "a2"
        ));
    }

    #[test]
    fn per_capita_rounds_up() {
        assert_eq!(venues_for_population(1.0 / 117.5, 1), 1);
        assert_eq!(venues_for_population(1.0 / 117.5, 118), 2);
        assert_eq!(venues_for_population(0.5, 0), 0);
    }

    #[test]
    fn apportion_rounds_down() {
        let shares = apportion(10, &[1.0, 1.0, 1.0]);
        assert_eq!(shares, vec![3, 3, 3]);
        assert_eq!(apportion(5, &[0.0, 0.0]), vec![0, 0]);
        let mut rng = SmallRng::seed_from_u64(3);
        assert_eq!(place_residual(&[], &mut rng), None);
        let facility = place_residual(&[FacilityId(4), FacilityId(9)], &mut rng).unwrap();
        assert!([FacilityId(4), FacilityId(9)].contains(&facility));
    }
}

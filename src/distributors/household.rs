//! Households of an area.
//!
//! Household sizes are drawn from a discrete size distribution. Each household is seeded with one
//! adult, then children are dealt round-robin over the households with space, then the remaining
//! adults, each matched in age and sex to the first adult of the household it joins. Once every
//! household is full, people go to a uniformly random household instead (an overflow). Households
//! nobody was dealt to are not created.
use std::collections::BTreeMap;

use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use synthpop_geo::AreaId;

use crate::audit::{AuditEvent, BuildAudit};
use crate::error::SimError;
use crate::facility::{FacilityId, FacilityKind, FacilitySpec, HouseholdSubgroup, SubgroupRef};
use crate::log::{debug, info};
use crate::parameters::HouseholdParameters;
use crate::people::{Activity, PersonId, Sex};
use crate::world::World;

type PeopleByAge = BTreeMap<u8, Vec<PersonId>>;

struct Draft {
    max_size: usize,
    members: Vec<(PersonId, HouseholdSubgroup)>,
}

impl Draft {
    fn is_full(&self) -> bool {
        self.members.len() >= self.max_size
    }
}

fn pop_closest(people: &mut PeopleByAge, age: u8) -> Option<PersonId> {
    let closest = *people
        .keys()
        .min_by_key(|candidate| candidate.abs_diff(age))?;
    let bucket = people.get_mut(&closest)?;
    let person = bucket.pop();
    if bucket.is_empty() {
        people.remove(&closest);
    }
    person
}

pub struct HouseholdDistributor<'a> {
    parameters: &'a HouseholdParameters,
    sizes: Vec<usize>,
    size_distribution: WeightedIndex<f64>,
}

impl<'a> HouseholdDistributor<'a> {
    /// # Errors
    ///
    /// [`SimError::Configuration`] if the size distribution has no positive weight.
    pub fn new(parameters: &'a HouseholdParameters) -> Result<Self, SimError> {
        let size_distribution = WeightedIndex::new(parameters.size_distribution.values())
            .map_err(|e| SimError::configuration("households", e))?;
        Ok(HouseholdDistributor {
            parameters,
            sizes: parameters
                .size_distribution
                .keys()
                .map(|size| usize::from(*size))
                .collect(),
            size_distribution,
        })
    }

    /// Closest adult to `age`, of `sex` if any are left, otherwise of the other sex.
    fn closest_adult(
        men: &mut PeopleByAge,
        women: &mut PeopleByAge,
        age: u8,
        sex: Sex,
    ) -> Option<PersonId> {
        let (preferred, other) = match sex {
            Sex::Male => (men, women),
            Sex::Female => (women, men),
        };
        pop_closest(preferred, age).or_else(|| pop_closest(other, age))
    }

    fn random_sex<R: Rng>(rng: &mut R) -> Sex {
        if rng.random_range(0..2) == 0 {
            Sex::Male
        } else {
            Sex::Female
        }
    }

    /// Picks the household for the `counter`-th unit of a round: round-robin over households
    /// with space, uniformly random over all households once none has space.
    fn next_household<R: Rng>(
        drafts: &[Draft],
        with_space: &[usize],
        counter: usize,
        rng: &mut R,
        audit: &mut BuildAudit,
    ) -> usize {
        if with_space.is_empty() {
            audit.record(AuditEvent::Overflow, FacilityKind::Household);
            rng.random_range(0..drafts.len())
        } else {
            with_space[counter % with_space.len()]
        }
    }

    /// Creates the households of `area` and moves its residents into them. People who already
    /// have a residence (care home residents) are left alone.
    ///
    /// # Errors
    ///
    /// [`SimError::Configuration`] if the area has residents but no households.
    pub fn distribute<R: Rng>(
        &self,
        world: &mut World,
        area: AreaId,
        n_households: usize,
        rng: &mut R,
        audit: &mut BuildAudit,
    ) -> Result<Vec<FacilityId>, SimError> {
        let residents: Vec<PersonId> = world
            .residents(area)
            .iter()
            .copied()
            .filter(|id| world.person(*id).residence.is_none())
            .collect();
        if residents.is_empty() {
            return Ok(Vec::new());
        }
        let area_name = world.geography().area(area).name.clone();
        if n_households == 0 {
            return Err(SimError::configuration(
                &area_name,
                format!("{} residents but no households", residents.len()),
            ));
        }

        let mut drafts: Vec<Draft> = (0..n_households)
            .map(|_| Draft {
                max_size: self.sizes[self.size_distribution.sample(rng)],
                members: Vec::new(),
            })
            .collect();
        let mut with_space: Vec<usize> = (0..n_households).collect();

        let mut kids = Vec::new();
        let mut men = PeopleByAge::new();
        let mut women = PeopleByAge::new();
        for id in residents {
            let person = world.person(id);
            if person.age <= self.parameters.kid_max_age {
                kids.push(id);
            } else if person.sex == Sex::Male {
                men.entry(person.age).or_default().push(id);
            } else {
                women.entry(person.age).or_default().push(id);
            }
        }

        let add = |drafts: &mut Vec<Draft>,
                       with_space: &mut Vec<usize>,
                       household: usize,
                       member: (PersonId, HouseholdSubgroup)| {
            drafts[household].members.push(member);
            if drafts[household].is_full() {
                with_space.retain(|h| *h != household);
            }
        };

        // One adult per household.
        for household in with_space.clone() {
            let sex = Self::random_sex(rng);
            let age =
                rng.random_range(self.parameters.adult_min_age..=self.parameters.adult_max_age);
            let Some(adult) = Self::closest_adult(&mut men, &mut women, age, sex) else {
                break;
            };
            add(
                &mut drafts,
                &mut with_space,
                household,
                (adult, HouseholdSubgroup::Adults),
            );
        }

        let mut counter = 0;
        while let Some(kid) = kids.pop() {
            let household = Self::next_household(&drafts, &with_space, counter, rng, audit);
            add(
                &mut drafts,
                &mut with_space,
                household,
                (kid, HouseholdSubgroup::Kids),
            );
            counter += 1;
        }

        // Remaining adults, matched to the household's first adult.
        let mut counter = 0;
        while !men.is_empty() || !women.is_empty() {
            let household = Self::next_household(&drafts, &with_space, counter, rng, audit);
            let first_adult = drafts[household]
                .members
                .iter()
                .map(|(id, _)| world.person(*id))
                .find(|person| person.age >= self.parameters.adult_min_age);
            let (age, sex) = match first_adult {
                Some(person) => (person.age, person.sex),
                None => (
                    rng.random_range(
                        self.parameters.adult_min_age..=self.parameters.adult_max_age,
                    ),
                    Self::random_sex(rng),
                ),
            };
            let Some(adult) = Self::closest_adult(&mut men, &mut women, age, sex) else {
                break;
            };
            add(
                &mut drafts,
                &mut with_space,
                household,
                (adult, HouseholdSubgroup::Adults),
            );
            counter += 1;
        }

        let coordinates = world.geography().area(area).coordinates;
        let mut households = Vec::new();
        let mut empty = 0;
        for draft in drafts {
            if draft.members.is_empty() {
                empty += 1;
                continue;
            }
            let household = world.add_facility(FacilitySpec::new(
                FacilityKind::Household,
                area,
                coordinates,
                draft.max_size,
            ));
            for (person, subgroup) in draft.members {
                world.add_to_facility(
                    person,
                    SubgroupRef::new(household, subgroup as usize),
                    Activity::Residence,
                );
            }
            households.push(household);
        }
        if empty > 0 {
            debug!("{area_name}: dropped {empty} empty households");
        }
        info!("{area_name}: {} households", households.len());
        Ok(households)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::tests::test_geography;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn populated_world(ages: &[(u8, Sex)]) -> World {
        let mut world = World::new(test_geography());
        for (age, sex) in ages {
            world.add_person(*age, *sex, AreaId(0));
        }
        world
    }

    fn mixed_population() -> Vec<(u8, Sex)> {
        let mut ages = Vec::new();
        for i in 0..40u8 {
            let sex = if i % 2 == 0 { Sex::Female } else { Sex::Male };
            ages.push((i % 15, sex));
            ages.push((18 + i, sex));
        }
        ages
    }

    #[test]
    fn everyone_gets_a_residence() {
        let mut world = populated_world(&mixed_population());
        let parameters = HouseholdParameters::default();
        let distributor = HouseholdDistributor::new(&parameters).unwrap();
        let mut audit = BuildAudit::default();
        let mut rng = SmallRng::seed_from_u64(11);
        let households = distributor
            .distribute(&mut world, AreaId(0), 20, &mut rng, &mut audit)
            .unwrap();
        assert!(!households.is_empty());
        for person in world.people() {
            assert!(person.residence.is_some());
        }
        let members: usize = households.iter().map(|h| world.facility(*h).size()).sum();
        assert_eq!(members, world.people().len());
        for household in &households {
            assert!(!world.facility(*household).is_empty());
        }
    }

    #[test]
    fn each_household_starts_with_an_adult() {
        let mut world = populated_world(&mixed_population());
        let parameters = HouseholdParameters::default();
        let distributor = HouseholdDistributor::new(&parameters).unwrap();
        let mut audit = BuildAudit::default();
        let mut rng = SmallRng::seed_from_u64(5);
        let households = distributor
            .distribute(&mut world, AreaId(0), 10, &mut rng, &mut audit)
            .unwrap();
        for household in households {
            let adults = world
                .facility(household)
                .subgroup(HouseholdSubgroup::Adults as usize)
                .len();
            assert!(adults >= 1);
        }
    }

    #[test]
    fn overflow_when_households_are_full() {
        let mut world = populated_world(&mixed_population());
        let parameters = HouseholdParameters {
            size_distribution: BTreeMap::from([(1, 1.0)]),
            ..HouseholdParameters::default()
        };
        let distributor = HouseholdDistributor::new(&parameters).unwrap();
        let mut audit = BuildAudit::default();
        let mut rng = SmallRng::seed_from_u64(5);
        distributor
            .distribute(&mut world, AreaId(0), 10, &mut rng, &mut audit)
            .unwrap();
        assert_eq!(audit.total(AuditEvent::Overflow), 70);
    }

    #[test]
    fn closest_age_and_preferred_sex() {
        let mut men = PeopleByAge::new();
        let mut women = PeopleByAge::new();
        men.insert(30, vec![PersonId(1)]);
        women.insert(50, vec![PersonId(2)]);
        women.insert(33, vec![PersonId(3)]);
        assert_eq!(
            HouseholdDistributor::closest_adult(&mut men, &mut women, 49, Sex::Female),
            Some(PersonId(2))
        );
        assert_eq!(
            HouseholdDistributor::closest_adult(&mut men, &mut women, 49, Sex::Male),
            Some(PersonId(1))
        );
        assert_eq!(
            HouseholdDistributor::closest_adult(&mut men, &mut women, 20, Sex::Male),
            Some(PersonId(3))
        );
        assert_eq!(
            HouseholdDistributor::closest_adult(&mut men, &mut women, 20, Sex::Male),
            None
        );
    }

    #[test]
    fn residents_without_households() {
        let mut world = populated_world(&[(30, Sex::Male)]);
        let parameters = HouseholdParameters::default();
        let distributor = HouseholdDistributor::new(&parameters).unwrap();
        let mut audit = BuildAudit::default();
        let mut rng = SmallRng::seed_from_u64(5);
        let result = distributor.distribute(&mut world, AreaId(0), 0, &mut rng, &mut audit);
        assert!(matches!(result, Err(SimError::Configuration { .. })));
    }
}

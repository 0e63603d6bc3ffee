mod common;

use std::collections::BTreeMap;

use synthpop::audit::{AuditEvent, BuildAudit};
use synthpop::distributors::{SchoolDistributor, SchoolIndex, ShelterDistributor};
use synthpop::facility::{FacilityKind, FacilitySpec, HouseholdSubgroup, SubgroupRef};
use synthpop::parameters::{SchoolParameters, ShelterParameters};
use synthpop::people::{Activity, Sex};
use synthpop::rand::rngs::SmallRng;
use synthpop::rand::SeedableRng;
use synthpop::synthpop_geo::{AreaId, Coordinates, Geography, HierarchyRow};
use synthpop::world::World;

use common::camp_geography;

#[test]
fn hundred_households_share_seventy_four_slots() {
    let mut world = World::new(camp_geography());
    let area = AreaId(0);
    let coordinates = world.geography().area(area).coordinates;
    for i in 0..100 {
        let household = world.add_facility(FacilitySpec::new(
            FacilityKind::Household,
            area,
            coordinates,
            6,
        ));
        for _ in 0..=(i % 3) {
            let person = world.add_person(30, Sex::Male, area);
            world.add_to_facility(
                person,
                SubgroupRef::new(household, HouseholdSubgroup::Adults as usize),
                Activity::Residence,
            );
        }
    }
    let parameters = ShelterParameters {
        sharing_ratio: 0.75,
        ..ShelterParameters::default()
    };
    let mut audit = BuildAudit::default();
    let shelters = ShelterDistributor::new(&parameters).distribute(
        &mut world,
        area,
        &mut SmallRng::seed_from_u64(2024),
        &mut audit,
    );

    assert_eq!(shelters.len(), 63);
    let shared = shelters
        .iter()
        .filter(|id| world.facility(**id).n_households() == 2)
        .count();
    let private = shelters
        .iter()
        .filter(|id| world.facility(**id).n_households() == 1)
        .count();
    assert_eq!((shared, private), (37, 26));
    assert!(audit.is_clean(), "{}", audit.summary());
    for person in world.people() {
        let residence = person.residence.unwrap();
        assert_eq!(world.facility(residence.facility).kind, FacilityKind::Shelter);
    }
}

/// An area with two schools at the same distance, both with no room.
fn two_full_schools() -> World {
    let rows = vec![HierarchyRow::new("centre", "s", "r")];
    let coordinates = BTreeMap::from([("centre".to_string(), Coordinates::new(0.0, 0.0))]);
    let geography = Geography::from_rows(&rows, &coordinates, &BTreeMap::new()).unwrap();
    let mut world = World::new(geography);
    for longitude in [0.01, -0.01] {
        world.add_facility(FacilitySpec::school(
            AreaId(0),
            Coordinates::new(0.0, longitude),
            0,
            5,
            18,
        ));
    }
    world.add_person(10, Sex::Female, AreaId(0));
    world.rebuild_spatial_indexes();
    world
}

#[test]
fn overflow_picks_uniformly_among_candidates() {
    let parameters = SchoolParameters::default();
    let template = two_full_schools();
    let index = SchoolIndex::build(&template);
    // One stream across all trials, the way a build consumes it.
    let mut rng = SmallRng::seed_from_u64(2024);
    let trials = 4000;
    let mut counts = [0usize; 2];
    for _ in 0..trials {
        let mut world = template.clone();
        let mut audit = BuildAudit::default();
        SchoolDistributor::new(&parameters, &index)
            .distribute_students(&mut world, AreaId(0), &mut rng, &mut audit)
            .unwrap();
        assert_eq!(audit.count(AuditEvent::Overflow, FacilityKind::School), 1);
        let school = world.people()[0].primary_activity.unwrap().facility;
        counts[school.index()] += 1;
    }
    let expected = f64::from(trials) / 2.0;
    let chi_square: f64 = counts
        .iter()
        .map(|observed| (*observed as f64 - expected).powi(2) / expected)
        .sum();
    assert!(chi_square < 3.841, "counts {counts:?}, chi-square {chi_square}");
}

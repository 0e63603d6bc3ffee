use std::collections::BTreeMap;

use criterion::{criterion_group, criterion_main, Criterion};
use synthpop::audit::BuildAudit;
use synthpop::distributors::VenueDistributor;
use synthpop::facility::{FacilityKind, FacilitySpec};
use synthpop::parameters::AgeRange;
use synthpop::people::{Activity, PersonId, Sex};
use synthpop::rand::rngs::SmallRng;
use synthpop::rand::{Rng, SeedableRng};
use synthpop::synthpop_geo::{AreaId, Coordinates, Geography, HierarchyRow};
use synthpop::world::World;

static AREAS: usize = 50;
static RESIDENTS_PER_AREA: usize = 400;
static VENUES: usize = 300;
static SEED: u64 = 123;

/// A grid of areas, residents of every age and venues scattered over the grid.
fn world() -> World {
    let mut rows = Vec::new();
    let mut coordinates = BTreeMap::new();
    for i in 0..AREAS {
        let name = format!("area{i}");
        rows.push(HierarchyRow::new(&name, &format!("super{}", i / 10), "region"));
        coordinates.insert(
            name,
            Coordinates::new(21.0 + 0.01 * (i / 10) as f64, 92.0 + 0.01 * (i % 10) as f64),
        );
    }
    let geography = Geography::from_rows(&rows, &coordinates, &BTreeMap::new()).unwrap();
    let mut world = World::new(geography);
    let mut rng = SmallRng::seed_from_u64(SEED);
    for area in 0..AREAS {
        for age in 0..RESIDENTS_PER_AREA {
            world.add_person((age % 90) as u8, Sex::Female, AreaId(area as u32));
        }
    }
    for _ in 0..VENUES {
        let area = AreaId(rng.random_range(0..AREAS) as u32);
        let centre = world.geography().area(area).coordinates;
        let site = Coordinates::new(
            centre.latitude + rng.random_range(-0.005..0.005),
            centre.longitude + rng.random_range(-0.005..0.005),
        );
        world.add_facility(FacilitySpec::new(FacilityKind::Communal, area, site, 60));
    }
    world.rebuild_spatial_indexes();
    world
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let template = world();
    let people: Vec<PersonId> = template.people().iter().map(|person| person.id).collect();
    let distributor = VenueDistributor::new(
        FacilityKind::Communal,
        5,
        AgeRange::new(0, 99),
        Activity::Leisure,
    );
    c.bench_function("venue distribution", |bencher| {
        bencher.iter_batched(
            || template.clone(),
            |mut world| {
                let mut audit = BuildAudit::default();
                distributor
                    .distribute(
                        &mut world,
                        &people,
                        |_, _| Some(0),
                        &mut SmallRng::seed_from_u64(SEED),
                        &mut audit,
                    )
                    .unwrap();
                world
            },
            criterion::BatchSize::LargeInput,
        );
    });
}

criterion_group!(distribution_benches, criterion_benchmark);
criterion_main!(distribution_benches);

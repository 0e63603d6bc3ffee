mod common;

use std::fs;

use synthpop::activity::{ScheduledActivities, Shift};
use synthpop::builder::WorldBuilder;
use synthpop::context::Context;
use synthpop::parameters::InteractionParameters;
use synthpop::partition::Partition;
use synthpop::people::PersonId;
use synthpop::rand::RngCore;
use synthpop::random::ContextRandomExt;
use synthpop::report::ContextReportExt;
use synthpop::simulation::{InfectionReport, Simulator, TransmissionRng};
use synthpop::transmission::{ConstantInfectiousness, InteractionModel};

use common::{camp_inputs, camp_parameters};

const SHIFT_LENGTH: f64 = 1.0 / 3.0;

fn built_camp(seed: u64) -> Context {
    let (parameters, inputs) = (camp_parameters(seed), camp_inputs());
    let mut context = Context::new();
    WorldBuilder::new(&parameters, &inputs)
        .build(&mut context)
        .unwrap();
    context
}

fn seed_infections(context: &mut Context, people: &[u32]) {
    for id in people {
        context
            .world_mut()
            .person_mut(PersonId(*id))
            .health
            .infect(None, 0.0, 1.0);
    }
}

fn simulator(beta: f64) -> Simulator {
    let mut parameters = InteractionParameters::default();
    for value in parameters.betas.values_mut() {
        *value = beta;
    }
    Simulator::new(
        InteractionModel::from_parameters(&parameters).unwrap(),
        Box::new(ConstantInfectiousness::default()),
    )
}

fn shifts(n: u32) -> impl Iterator<Item = Shift> {
    (0..n).map(|index| Shift::nth(index, SHIFT_LENGTH))
}

#[test]
fn no_infectious_people_no_draws() {
    let mut context = built_camp(21);
    let infections = simulator(1.0)
        .run_shifts(
            &mut context,
            shifts(6),
            &mut ScheduledActivities::default(),
            &mut |_| {},
        )
        .unwrap();
    assert_eq!(infections, 0);

    let mut fresh = Context::new();
    fresh.init_random(21);
    assert_eq!(
        context.sample(TransmissionRng, |rng| rng.next_u64()),
        fresh.sample(TransmissionRng, |rng| rng.next_u64()),
        "the transmission stream was consumed"
    );
}

#[test]
fn outbreak_is_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    let run = |name: &str| {
        let mut context = built_camp(4);
        seed_infections(&mut context, &[0, 61, 122, 183]);
        let path = dir.path().join(name);
        context
            .add_report::<InfectionReport>(path.to_str().unwrap())
            .unwrap();
        let total = simulator(2.0)
            .run_shifts(
                &mut context,
                shifts(9),
                &mut ScheduledActivities::default(),
                &mut |_| {},
            )
            .unwrap();
        (total, context.world().people().to_vec(), fs::read_to_string(path).unwrap())
    };
    let (first_total, first_people, first_report) = run("first.csv");
    let (second_total, second_people, second_report) = run("second.csv");
    assert!(first_total > 0);
    assert_eq!(first_total, second_total);
    assert_eq!(first_people, second_people);
    assert_eq!(first_report, second_report);
    assert_eq!(first_report.lines().count(), first_total + 1);
}

#[test]
fn partitions_agree_on_crossing_people() {
    let mut template = built_camp(9);
    seed_infections(&mut template, &[0, 61, 122, 183]);
    let world = template.world().clone();

    let mut partitions: Vec<(Partition, Context)> = Partition::split(world.geography(), 2)
        .into_iter()
        .map(|partition| {
            let mut context = Context::with_world(world.clone());
            context.init_random(9 + partition.id as u64);
            (partition, context)
        })
        .collect();
    let total = simulator(2.0)
        .run_partitioned(&mut partitions, shifts(9), &mut ScheduledActivities::default())
        .unwrap();
    assert!(total > 0);

    let (first, rest) = partitions.split_first().unwrap();
    let second = &rest[0];
    assert!(!first.0.crossing().is_empty());
    for person in first.0.crossing() {
        assert!(second.0.crossing().contains(person));
        assert_eq!(
            first.1.world().person(*person).health.is_infected(),
            second.1.world().person(*person).health.is_infected(),
            "{person} differs between partitions"
        );
    }
}

//! Domain decomposition over super areas.
//!
//! A [`Partition`] owns a disjoint set of super areas: its people live there and it runs the
//! transmission step for the facilities located there. People who cross partitions (live in one,
//! attend a facility in another) are ghosts on the visiting side. Between shifts, and never
//! during one, each partition publishes the infection state of the crossing people it changed
//! and applies what the others published: [`Partition::collect_updates`] and
//! [`Partition::apply_updates`] are the two halves of that barrier.
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use synthpop_geo::{AreaId, Geography, SuperAreaId};

use crate::activity::ActiveGroup;
use crate::facility::FacilityId;
use crate::hashing::HashSet;
use crate::log::debug;
use crate::people::PersonId;
use crate::world::World;

/// Infection fields of a crossing person, as published at a shift boundary.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GhostUpdate {
    pub person: PersonId,
    pub is_infected: bool,
    pub infector: Option<PersonId>,
    pub infection_time: Option<f64>,
    pub transmission_probability: f64,
}

#[derive(Clone, Debug)]
pub struct Partition {
    pub id: usize,
    super_areas: BTreeSet<SuperAreaId>,
    /// People whose state is exchanged at the barrier.
    crossing: BTreeSet<PersonId>,
    /// Crossing people already known to be infected here.
    published: HashSet<PersonId>,
}

impl Partition {
    #[must_use]
    pub fn new(id: usize, super_areas: impl IntoIterator<Item = SuperAreaId>) -> Self {
        Partition {
            id,
            super_areas: super_areas.into_iter().collect(),
            crossing: BTreeSet::new(),
            published: HashSet::default(),
        }
    }

    /// Splits the super areas of `geography` into `n` contiguous runs of near-equal length.
    #[must_use]
    pub fn split(geography: &Geography, n: usize) -> Vec<Partition> {
        let n = n.max(1);
        let super_areas: Vec<SuperAreaId> = geography.super_areas().iter().map(|s| s.id).collect();
        let chunk = super_areas.len().div_ceil(n).max(1);
        let mut partitions: Vec<Partition> = super_areas
            .chunks(chunk)
            .enumerate()
            .map(|(id, chunk)| Partition::new(id, chunk.iter().copied()))
            .collect();
        while partitions.len() < n {
            partitions.push(Partition::new(partitions.len(), []));
        }
        partitions
    }

    #[must_use]
    pub fn owns_super_area(&self, super_area: SuperAreaId) -> bool {
        self.super_areas.contains(&super_area)
    }

    #[must_use]
    pub fn owns_area(&self, world: &World, area: AreaId) -> bool {
        self.owns_super_area(world.geography().area(area).super_area)
    }

    /// Whether the person lives in this partition.
    #[must_use]
    pub fn owns_person(&self, world: &World, person: PersonId) -> bool {
        self.owns_area(world, world.person(person).area)
    }

    #[must_use]
    pub fn owns_facility(&self, world: &World, facility: FacilityId) -> bool {
        self.owns_super_area(world.facility(facility).super_area)
    }

    /// The active groups this partition runs the transmission step for.
    #[must_use]
    pub fn local_groups(&self, world: &World, groups: Vec<ActiveGroup>) -> Vec<ActiveGroup> {
        groups
            .into_iter()
            .filter(|group| self.owns_facility(world, group.facility))
            .collect()
    }

    /// Finds the crossing people: residents with a membership in a facility elsewhere, and
    /// non-residents with a membership here. Call once the world is built.
    pub fn find_crossing(&mut self, world: &World) {
        self.crossing = world
            .people()
            .iter()
            .filter(|person| {
                let lives_here = self.owns_area(world, person.area);
                person
                    .residence
                    .iter()
                    .chain(person.primary_activity.iter())
                    .chain(person.leisure.iter())
                    .any(|membership| self.owns_facility(world, membership.facility) != lives_here)
            })
            .map(|person| person.id)
            .collect();
        self.published = self
            .crossing
            .iter()
            .copied()
            .filter(|id| world.person(*id).health.is_infected())
            .collect();
        debug!("partition {}: {} crossing people", self.id, self.crossing.len());
    }

    #[must_use]
    pub fn crossing(&self) -> &BTreeSet<PersonId> {
        &self.crossing
    }

    /// Crossing people infected here since the last barrier.
    pub fn collect_updates(&mut self, world: &World) -> Vec<GhostUpdate> {
        let mut updates = Vec::new();
        for id in &self.crossing {
            let health = &world.person(*id).health;
            if health.is_infected() && self.published.insert(*id) {
                updates.push(GhostUpdate {
                    person: *id,
                    is_infected: true,
                    infector: health.infector,
                    infection_time: health.infection_time,
                    transmission_probability: health.transmission_probability,
                });
            }
        }
        updates
    }

    /// Applies updates published by other partitions. Returns the number of people whose state
    /// changed here.
    pub fn apply_updates(&mut self, world: &mut World, updates: &[GhostUpdate]) -> usize {
        let mut applied = 0;
        for update in updates {
            if !update.is_infected || !self.crossing.contains(&update.person) {
                continue;
            }
            self.published.insert(update.person);
            let health = &mut world.person_mut(update.person).health;
            if health.is_susceptible() {
                health.infect(
                    update.infector,
                    update.infection_time.unwrap_or_default(),
                    update.transmission_probability,
                );
                applied += 1;
            }
        }
        applied
    }
}

/// Runs the barrier over every partition's replica of the world.
pub fn exchange(partitions: &mut [(&mut Partition, &mut World)]) -> usize {
    let updates: Vec<GhostUpdate> = partitions
        .iter_mut()
        .flat_map(|(partition, world)| partition.collect_updates(&**world))
        .collect();
    partitions
        .iter_mut()
        .map(|(partition, world)| partition.apply_updates(&mut **world, &updates))
        .sum()
}

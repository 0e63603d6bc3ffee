//! Who is where during a shift.
//!
//! Scheduling, closures and isolation are decided outside this crate. All the transmission
//! step needs from them is, per shift, the facilities in session and who is present in each of
//! their subgroups: an [`ActiveGroup`]. [`ActivitySource`] is that boundary.
//! [`ScheduledActivities`] is a minimal source for runs without a policy engine.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::facility::{FacilityDetail, FacilityId, FacilityKind, SubgroupRef, TEACHERS};
use crate::people::{Activity, HealthStatus, Person, PersonId};
use crate::world::World;

/// One simulated shift.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    pub index: u32,
    pub start_time: f64,
    pub duration: f64,
}

impl Shift {
    /// The `index`-th shift of a fixed-length schedule starting at time zero.
    #[must_use]
    pub fn nth(index: u32, duration: f64) -> Self {
        Shift {
            index,
            start_time: f64::from(index) * duration,
            duration,
        }
    }
}

/// A facility in session with the people present in each of its subgroups.
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveGroup {
    pub facility: FacilityId,
    pub kind: FacilityKind,
    pub subgroups: Vec<Vec<PersonId>>,
}

impl ActiveGroup {
    #[must_use]
    pub fn new(facility: FacilityId, kind: FacilityKind, n_subgroups: usize) -> Self {
        ActiveGroup {
            facility,
            kind,
            subgroups: vec![Vec::new(); n_subgroups],
        }
    }

    /// Everyone present, in every subgroup.
    #[must_use]
    pub fn size(&self) -> usize {
        self.subgroups.iter().map(Vec::len).sum()
    }

    pub fn people(&self) -> impl Iterator<Item = PersonId> + '_ {
        self.subgroups.iter().flatten().copied()
    }
}

pub trait ActivitySource {
    /// The groups in session during `shift`, in a fixed order.
    fn active_groups(&mut self, world: &World, shift: &Shift) -> Vec<ActiveGroup>;
}

/// Each shift lists activities in priority order; everybody alive attends the first one they
/// have a membership for. Learning center students attend only on their own shift, teachers on
/// every shift.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduledActivities {
    /// Cycled through by shift index.
    pub shifts: Vec<Vec<Activity>>,
}

impl Default for ScheduledActivities {
    fn default() -> Self {
        ScheduledActivities {
            shifts: vec![
                vec![Activity::PrimaryActivity, Activity::Residence],
                vec![Activity::Leisure, Activity::Residence],
                vec![Activity::Residence],
            ],
        }
    }
}

impl ScheduledActivities {
    fn attends(world: &World, person: &Person, membership: SubgroupRef, shift: &Shift) -> bool {
        let facility = world.facility(membership.facility);
        let FacilityDetail::LearningCenter { n_shifts, shifts } = &facility.detail else {
            return true;
        };
        if membership.subgroup == TEACHERS {
            return true;
        }
        let position = facility
            .subgroup(membership.subgroup)
            .iter()
            .position(|id| *id == person.id);
        match position.and_then(|i| shifts.get(i)) {
            Some(own) => u32::from(*own) == shift.index % u32::from((*n_shifts).max(1)),
            None => false,
        }
    }

    fn membership(person: &Person, activity: Activity) -> Option<SubgroupRef> {
        match activity {
            Activity::Residence => person.residence,
            Activity::PrimaryActivity => person.primary_activity,
            Activity::Leisure => person.leisure.first().copied(),
        }
    }
}

impl ActivitySource for ScheduledActivities {
    fn active_groups(&mut self, world: &World, shift: &Shift) -> Vec<ActiveGroup> {
        if self.shifts.is_empty() {
            return Vec::new();
        }
        let activities = &self.shifts[shift.index as usize % self.shifts.len()];
        let mut groups: BTreeMap<FacilityId, ActiveGroup> = BTreeMap::new();
        for person in world.people() {
            if person.health.status == HealthStatus::Dead {
                continue;
            }
            let attended = activities.iter().find_map(|activity| {
                Self::membership(person, *activity)
                    .filter(|membership| Self::attends(world, person, *membership, shift))
            });
            if let Some(membership) = attended {
                let facility = world.facility(membership.facility);
                groups
                    .entry(facility.id)
                    .or_insert_with(|| {
                        ActiveGroup::new(facility.id, facility.kind, facility.subgroups.len())
                    })
                    .subgroups[membership.subgroup]
                    .push(person.id);
            }
        }
        groups.into_values().collect()
    }
}

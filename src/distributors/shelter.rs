//! Shelters: compound residences holding at most two households, one per slot subgroup.
//!
//! For `N` households and a sharing ratio `r`, `floor(r * N / 2)` shelters take two households
//! and the rest take one, so an area gets `N - floor(r * N / 2)` shelters. Households are
//! shuffled, paired into the shared shelters first, then dealt one per shelter over the
//! remaining ones, wrapping around and skipping shelters whose slots are taken.
//!
//! People of a sheltered household have the shelter slot as their residence. The household
//! keeps its member list.
use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use synthpop_geo::{AreaId, SuperAreaId};

use crate::audit::{AuditEvent, BuildAudit};
use crate::error::SimError;
use crate::facility::{FacilityDetail, FacilityId, FacilityKind, FacilitySpec, SubgroupRef};
use crate::log::{info, warn};
use crate::parameters::ShelterParameters;
use crate::people::{Activity, PersonId};
use crate::world::World;

/// Households a shelter can hold.
pub const SHELTER_SLOTS: usize = 2;

/// `(total shelters, shelters shared by two households)` for `n_households` households.
#[must_use]
pub fn shelters_for_area(n_households: usize, sharing_ratio: f64) -> (usize, usize) {
    let multi = (sharing_ratio * n_households as f64 / 2.0).floor() as usize;
    let multi = multi.min(n_households / 2);
    (n_households - multi, multi)
}

/// Moves the members of `household` into the next free slot of `shelter`.
///
/// # Errors
///
/// [`SimError::EmptyHousehold`] if the household has nobody in it, [`SimError::ShelterFull`] if
/// both slots are taken. The shelter is unchanged in either case.
pub fn add_household_to_shelter(
    world: &mut World,
    shelter: FacilityId,
    household: FacilityId,
) -> Result<(), SimError> {
    let members: Vec<PersonId> = world.facility_members(household).collect();
    if members.is_empty() {
        return Err(SimError::EmptyHousehold {
            household: household.to_string(),
        });
    }
    let slot = world.facility(shelter).n_households();
    if slot >= SHELTER_SLOTS {
        return Err(SimError::ShelterFull {
            shelter: shelter.to_string(),
        });
    }
    for person in members {
        world.add_to_facility(person, SubgroupRef::new(shelter, slot), Activity::Residence);
    }
    if let FacilityDetail::Shelter { households, .. } = &mut world.facility_mut(shelter).detail {
        households.push(household);
    }
    Ok(())
}

pub struct ShelterDistributor<'a> {
    parameters: &'a ShelterParameters,
}

impl<'a> ShelterDistributor<'a> {
    #[must_use]
    pub fn new(parameters: &'a ShelterParameters) -> Self {
        ShelterDistributor { parameters }
    }

    fn try_add(
        world: &mut World,
        shelter: FacilityId,
        household: FacilityId,
        audit: &mut BuildAudit,
    ) -> bool {
        match add_household_to_shelter(world, shelter, household) {
            Ok(()) => true,
            Err(SimError::EmptyHousehold { household }) => {
                warn!("skipping empty household {household}");
                audit.record(AuditEvent::EmptyHousehold, FacilityKind::Shelter);
                false
            }
            Err(error) => {
                warn!("{error}");
                audit.record(AuditEvent::ShelterFull, FacilityKind::Shelter);
                false
            }
        }
    }

    /// Creates the shelters of `area` and moves its households into them. Returns the new
    /// shelters.
    pub fn distribute<R: Rng>(
        &self,
        world: &mut World,
        area: AreaId,
        rng: &mut R,
        audit: &mut BuildAudit,
    ) -> Vec<FacilityId> {
        let mut households = world
            .facilities_in_area(area, FacilityKind::Household)
            .to_vec();
        if households.is_empty() {
            return Vec::new();
        }
        households.shuffle(rng);
        let (total, multi) = shelters_for_area(households.len(), self.parameters.sharing_ratio);
        let coordinates = world.geography().area(area).coordinates;
        let shelters: Vec<FacilityId> = (0..total)
            .map(|_| {
                world.add_facility(FacilitySpec::new(
                    FacilityKind::Shelter,
                    area,
                    coordinates,
                    SHELTER_SLOTS,
                ))
            })
            .collect();

        let (paired, single) = households.split_at(2 * multi);
        for (shelter, pair) in shelters.iter().zip(paired.chunks(2)) {
            for household in pair {
                Self::try_add(world, *shelter, *household, audit);
            }
        }

        let private = &shelters[multi..];
        let mut cursor = 0;
        for household in single {
            // The next shelter with a free slot, wrapping around.
            let free = (0..private.len())
                .map(|offset| (cursor + offset) % private.len())
                .find(|i| world.facility(private[*i]).n_households() < SHELTER_SLOTS);
            match free {
                Some(i) => {
                    Self::try_add(world, private[i], *household, audit);
                    cursor = i + 1;
                }
                None => {
                    warn!("no shelter slot left for {household}");
                    audit.record(AuditEvent::ShelterFull, FacilityKind::Shelter);
                    audit.record(AuditEvent::Unplaced, FacilityKind::Shelter);
                }
            }
        }
        info!(
            "{}: {total} shelters, {multi} shared",
            world.geography().area(area).name
        );
        shelters
    }

    /// Links every non-empty shelter of `super_area` to up to `max_visits` other non-empty
    /// shelters of the same super area, drawn without replacement.
    pub fn link_visits<R: Rng>(&self, world: &mut World, super_area: SuperAreaId, rng: &mut R) {
        let shelters: Vec<FacilityId> = world
            .facilities_in_super_area(super_area, FacilityKind::Shelter)
            .into_iter()
            .filter(|id| !world.facility(*id).is_empty())
            .collect();
        for shelter in &shelters {
            let n_visits = rng.random_range(0..=self.parameters.max_visits);
            let others: Vec<FacilityId> = shelters
                .iter()
                .copied()
                .filter(|other| other != shelter)
                .collect();
            let targets: Vec<FacilityId> = others.choose_multiple(rng, n_visits).copied().collect();
            if let FacilityDetail::Shelter { visit_targets, .. } =
                &mut world.facility_mut(*shelter).detail
            {
                *visit_targets = targets;
            }
        }
    }
}

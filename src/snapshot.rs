//! Binary snapshot of a built world.
//!
//! People and facilities are stored column by column. Variable-length lists (leisure
//! memberships, subgroups) are flattened with an offsets column: entry `i` spans
//! `offsets[i]..offsets[i + 1]`. The container is encoded with `bincode`'s standard
//! configuration behind a magic number and a format version. Per-area lists and spatial
//! indexes are derived data and are rebuilt on load.
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use synthpop_geo::{AreaId, Coordinates, Geography};

use crate::error::SimError;
use crate::facility::{Facility, FacilityDetail, FacilityId, FacilityKind, SubgroupRef};
use crate::log::info;
use crate::people::{Health, HealthStatus, Person, PersonId, Sex};
use crate::world::World;

const MAGIC: [u8; 4] = *b"SPOP";
const FORMAT_VERSION: u16 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct PeopleColumns {
    age: Vec<u8>,
    sex: Vec<Sex>,
    area: Vec<AreaId>,
    residence: Vec<Option<SubgroupRef>>,
    primary_activity: Vec<Option<SubgroupRef>>,
    leisure_offsets: Vec<u32>,
    leisure: Vec<SubgroupRef>,
    status: Vec<HealthStatus>,
    transmission_probability: Vec<f64>,
    susceptibility: Vec<f64>,
    infector: Vec<Option<PersonId>>,
    infection_time: Vec<Option<f64>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FacilityColumns {
    kind: Vec<FacilityKind>,
    area: Vec<AreaId>,
    coordinates: Vec<Coordinates>,
    max_size: Vec<u64>,
    subgroup_offsets: Vec<u32>,
    subgroup_sizes: Vec<u32>,
    members: Vec<PersonId>,
    detail: Vec<FacilityDetail>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WorldSnapshot {
    magic: [u8; 4],
    version: u16,
    geography: Geography,
    people: PeopleColumns,
    facilities: FacilityColumns,
}

fn snapshot_error(message: impl Into<String>) -> SimError {
    SimError::Snapshot(message.into())
}

impl PeopleColumns {
    fn from_people(people: &[Person]) -> Self {
        let mut columns = PeopleColumns::default();
        columns.leisure_offsets.push(0);
        for person in people {
            columns.age.push(person.age);
            columns.sex.push(person.sex);
            columns.area.push(person.area);
            columns.residence.push(person.residence);
            columns.primary_activity.push(person.primary_activity);
            columns.leisure.extend_from_slice(&person.leisure);
            columns.leisure_offsets.push(columns.leisure.len() as u32);
            columns.status.push(person.health.status);
            columns
                .transmission_probability
                .push(person.health.transmission_probability);
            columns.susceptibility.push(person.health.susceptibility);
            columns.infector.push(person.health.infector);
            columns.infection_time.push(person.health.infection_time);
        }
        columns
    }

    fn into_people(self) -> Result<Vec<Person>, SimError> {
        let n = self.age.len();
        let lengths = [
            self.sex.len(),
            self.area.len(),
            self.residence.len(),
            self.primary_activity.len(),
            self.status.len(),
            self.transmission_probability.len(),
            self.susceptibility.len(),
            self.infector.len(),
            self.infection_time.len(),
            self.leisure_offsets.len().saturating_sub(1),
        ];
        if self.leisure_offsets.is_empty() || lengths.iter().any(|len| *len != n) {
            return Err(snapshot_error("people columns differ in length"));
        }
        let mut people = Vec::with_capacity(n);
        for i in 0..n {
            let (start, end) = (
                self.leisure_offsets[i] as usize,
                self.leisure_offsets[i + 1] as usize,
            );
            let leisure = self
                .leisure
                .get(start..end)
                .ok_or_else(|| snapshot_error("leisure offsets out of range"))?
                .to_vec();
            people.push(Person {
                id: PersonId(i as u32),
                age: self.age[i],
                sex: self.sex[i],
                area: self.area[i],
                residence: self.residence[i],
                primary_activity: self.primary_activity[i],
                leisure,
                health: Health {
                    status: self.status[i],
                    transmission_probability: self.transmission_probability[i],
                    susceptibility: self.susceptibility[i],
                    infector: self.infector[i],
                    infection_time: self.infection_time[i],
                },
            });
        }
        Ok(people)
    }
}

impl FacilityColumns {
    fn from_facilities(facilities: &[Facility]) -> Self {
        let mut columns = FacilityColumns::default();
        columns.subgroup_offsets.push(0);
        for facility in facilities {
            columns.kind.push(facility.kind);
            columns.area.push(facility.area);
            columns.coordinates.push(facility.coordinates);
            columns.max_size.push(facility.max_size as u64);
            for subgroup in &facility.subgroups {
                columns.subgroup_sizes.push(subgroup.len() as u32);
                columns.members.extend_from_slice(subgroup);
            }
            columns
                .subgroup_offsets
                .push(columns.subgroup_sizes.len() as u32);
            columns.detail.push(facility.detail.clone());
        }
        columns
    }

    fn into_facilities(self, geography: &Geography) -> Result<Vec<Facility>, SimError> {
        let n = self.kind.len();
        let lengths = [
            self.area.len(),
            self.coordinates.len(),
            self.max_size.len(),
            self.detail.len(),
            self.subgroup_offsets.len().saturating_sub(1),
        ];
        if self.subgroup_offsets.is_empty() || lengths.iter().any(|len| *len != n) {
            return Err(snapshot_error("facility columns differ in length"));
        }
        let mut members = self.members.into_iter();
        let mut facilities = Vec::with_capacity(n);
        for (i, detail) in self.detail.into_iter().enumerate() {
            let area = self.area[i];
            if area.index() >= geography.areas().len() {
                return Err(snapshot_error(format!("facility {i} lies in unknown {area}")));
            }
            let sizes = self
                .subgroup_sizes
                .get(self.subgroup_offsets[i] as usize..self.subgroup_offsets[i + 1] as usize)
                .ok_or_else(|| snapshot_error("subgroup offsets out of range"))?;
            let mut subgroups = Vec::with_capacity(sizes.len());
            for size in sizes {
                let subgroup: Vec<PersonId> = members.by_ref().take(*size as usize).collect();
                if subgroup.len() != *size as usize {
                    return Err(snapshot_error("member column too short"));
                }
                subgroups.push(subgroup);
            }
            facilities.push(Facility {
                id: FacilityId(i as u32),
                kind: self.kind[i],
                area,
                super_area: geography.area(area).super_area,
                coordinates: self.coordinates[i],
                max_size: usize::try_from(self.max_size[i]).unwrap_or(usize::MAX),
                subgroups,
                detail,
            });
        }
        Ok(facilities)
    }
}

/// Checks that every identifier in the restored records points at an existing record.
fn check_references(
    geography: &Geography,
    people: &[Person],
    facilities: &[Facility],
) -> Result<(), SimError> {
    let subgroup_exists = |membership: &SubgroupRef| {
        facilities
            .get(membership.facility.index())
            .is_some_and(|facility| membership.subgroup < facility.subgroups.len())
    };
    for person in people {
        if person.area.index() >= geography.areas().len() {
            return Err(snapshot_error(format!("{} lives in unknown {}", person.id, person.area)));
        }
        let memberships = person
            .residence
            .iter()
            .chain(person.primary_activity.iter())
            .chain(person.leisure.iter());
        for membership in memberships {
            if !subgroup_exists(membership) {
                return Err(snapshot_error(format!(
                    "{} refers to missing {}/{}",
                    person.id, membership.facility, membership.subgroup
                )));
            }
        }
    }
    for facility in facilities {
        if let Some(member) = facility.members().find(|id| id.index() >= people.len()) {
            return Err(snapshot_error(format!(
                "{} lists unknown {member}",
                facility.id
            )));
        }
    }
    Ok(())
}

/// Encodes `world` into a snapshot.
///
/// # Errors
///
/// If encoding fails.
pub fn serialize(world: &World) -> Result<Vec<u8>, SimError> {
    let snapshot = WorldSnapshot {
        magic: MAGIC,
        version: FORMAT_VERSION,
        geography: world.geography().clone(),
        people: PeopleColumns::from_people(world.people()),
        facilities: FacilityColumns::from_facilities(world.facilities()),
    };
    Ok(bincode::serde::encode_to_vec(
        &snapshot,
        bincode::config::standard(),
    )?)
}

/// Rebuilds a world from a snapshot made by [`serialize`].
///
/// # Errors
///
/// [`SimError::Snapshot`] if the bytes are not a snapshot of this format version or the
/// records are inconsistent, [`SimError::DecodeError`] if they cannot be decoded.
pub fn deserialize(bytes: &[u8]) -> Result<World, SimError> {
    if bytes.len() < MAGIC.len() || bytes[..MAGIC.len()] != MAGIC {
        return Err(snapshot_error("not a world snapshot"));
    }
    let (snapshot, _): (WorldSnapshot, usize) =
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    if snapshot.version != FORMAT_VERSION {
        return Err(snapshot_error(format!(
            "unsupported snapshot version {} (expected {FORMAT_VERSION})",
            snapshot.version
        )));
    }
    let geography = snapshot.geography;
    let people = snapshot.people.into_people()?;
    let facilities = snapshot.facilities.into_facilities(&geography)?;
    check_references(&geography, &people, &facilities)?;
    Ok(World::from_parts(geography, people, facilities))
}

/// Writes a snapshot of `world` to `path`.
///
/// # Errors
///
/// If encoding or writing fails.
pub fn write_snapshot(world: &World, path: &Path) -> Result<(), SimError> {
    let bytes = serialize(world)?;
    fs::write(path, &bytes)?;
    info!("wrote {} byte snapshot to {}", bytes.len(), path.display());
    Ok(())
}

/// Reads a snapshot written by [`write_snapshot`].
///
/// # Errors
///
/// If reading or decoding fails.
pub fn read_snapshot(path: &Path) -> Result<World, SimError> {
    deserialize(&fs::read(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facility::FacilitySpec;
    use crate::people::Activity;
    use crate::world::tests::test_geography;

    fn small_world() -> World {
        let mut world = World::new(test_geography());
        let coordinates = world.geography().area(AreaId(1)).coordinates;
        let household =
            world.add_facility(FacilitySpec::new(FacilityKind::Household, AreaId(1), coordinates, 4));
        let venue =
            world.add_facility(FacilitySpec::new(FacilityKind::Communal, AreaId(1), coordinates, 50));
        for age in [3, 35, 70] {
            let person = world.add_person(age, Sex::Female, AreaId(1));
            world.add_to_facility(person, SubgroupRef::new(household, 2), Activity::Residence);
            world.add_to_facility(person, SubgroupRef::new(venue, 0), Activity::Leisure);
        }
        world.person_mut(PersonId(1)).health.infect(Some(PersonId(2)), 1.5, 0.7);
        world.rebuild_spatial_indexes();
        world
    }

    #[test]
    fn round_trip() {
        let world = small_world();
        let restored = deserialize(&serialize(&world).unwrap()).unwrap();
        assert_eq!(restored.geography().areas(), world.geography().areas());
        assert_eq!(restored.people(), world.people());
        assert_eq!(restored.facilities(), world.facilities());
        assert_eq!(restored.residents(AreaId(1)), world.residents(AreaId(1)));
        assert_eq!(
            restored.facilities_in_area(AreaId(1), FacilityKind::Communal),
            world.facilities_in_area(AreaId(1), FacilityKind::Communal)
        );
        assert_eq!(restored.spatial_index(FacilityKind::Household).len(), 1);
    }

    #[test]
    fn rejects_foreign_bytes() {
        assert!(matches!(deserialize(b"nope"), Err(SimError::Snapshot(_))));
        assert!(matches!(deserialize(&[]), Err(SimError::Snapshot(_))));
        let mut bytes = serialize(&small_world()).unwrap();
        bytes.truncate(bytes.len() / 2);
        assert!(deserialize(&bytes).is_err());
    }

    #[test]
    fn rejects_dangling_members() {
        let mut world = small_world();
        world.facility_mut(FacilityId(0)).subgroups[0].push(PersonId(99));
        let bytes = serialize(&world).unwrap();
        assert!(matches!(deserialize(&bytes), Err(SimError::Snapshot(_))));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.bin");
        let world = small_world();
        write_snapshot(&world, &path).unwrap();
        assert_eq!(read_snapshot(&path).unwrap().people(), world.people());
    }
}

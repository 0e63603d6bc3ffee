//! The world registry: geography, people and facilities, all addressed by dense identifiers.
//!
//! People and facilities refer to each other only through [`PersonId`], [`FacilityId`] and
//! [`SubgroupRef`], so the registry is the single owner of every record. Per-area resident lists
//! and per-area, per-kind facility lists are maintained as records are added. Spatial indexes
//! over facility coordinates are derived data: they are never mutated in place, only rebuilt
//! wholesale with [`World::rebuild_spatial_index`].
use strum::{EnumCount, IntoEnumIterator};
use synthpop_geo::{AreaId, Geography, SpatialIndex, SuperAreaId};

use crate::facility::{Facility, FacilityDetail, FacilityId, FacilityKind, FacilitySpec, SubgroupRef};
use crate::log::trace;
use crate::people::{Activity, Person, PersonId, Sex};

#[derive(Clone, Debug)]
pub struct World {
    geography: Geography,
    people: Vec<Person>,
    facilities: Vec<Facility>,
    /// Residents per area, in creation order.
    residents: Vec<Vec<PersonId>>,
    /// Facilities per area, then per kind.
    area_facilities: Vec<Vec<Vec<FacilityId>>>,
    spatial_indexes: Vec<SpatialIndex<FacilityId>>,
}

impl Default for World {
    fn default() -> Self {
        World::new(Geography::default())
    }
}

impl World {
    #[must_use]
    pub fn new(geography: Geography) -> Self {
        let n_areas = geography.areas().len();
        World {
            geography,
            people: Vec::new(),
            facilities: Vec::new(),
            residents: vec![Vec::new(); n_areas],
            area_facilities: vec![vec![Vec::new(); FacilityKind::COUNT]; n_areas],
            spatial_indexes: vec![SpatialIndex::Empty; FacilityKind::COUNT],
        }
    }

    #[must_use]
    pub fn geography(&self) -> &Geography {
        &self.geography
    }

    #[must_use]
    pub fn people(&self) -> &[Person] {
        &self.people
    }

    #[must_use]
    pub fn facilities(&self) -> &[Facility] {
        &self.facilities
    }

    #[must_use]
    pub fn person(&self, id: PersonId) -> &Person {
        &self.people[id.index()]
    }

    pub fn person_mut(&mut self, id: PersonId) -> &mut Person {
        &mut self.people[id.index()]
    }

    #[must_use]
    pub fn facility(&self, id: FacilityId) -> &Facility {
        &self.facilities[id.index()]
    }

    pub fn facility_mut(&mut self, id: FacilityId) -> &mut Facility {
        &mut self.facilities[id.index()]
    }

    pub fn facilities_of_kind(&self, kind: FacilityKind) -> impl Iterator<Item = &Facility> + '_ {
        self.facilities.iter().filter(move |f| f.kind == kind)
    }

    /// Creates a person living in `area`. Residence is assigned later by a distributor.
    pub fn add_person(&mut self, age: u8, sex: Sex, area: AreaId) -> PersonId {
        let id = PersonId(self.people.len() as u32);
        self.people.push(Person::new(id, age, sex, area));
        self.residents[area.index()].push(id);
        id
    }

    pub fn add_facility(&mut self, spec: FacilitySpec) -> FacilityId {
        let id = FacilityId(self.facilities.len() as u32);
        let super_area = self.geography.area(spec.area).super_area;
        trace!("adding {} {id} in {}", spec.kind, spec.area);
        self.area_facilities[spec.area.index()][spec.kind.index()].push(id);
        self.facilities.push(Facility {
            id,
            kind: spec.kind,
            area: spec.area,
            super_area,
            coordinates: spec.coordinates,
            max_size: spec.max_size,
            subgroups: vec![Vec::new(); spec.subgroups],
            detail: spec.detail,
        });
        id
    }

    /// Adds `person` to a facility subgroup and records the membership on the person in the
    /// slot named by `activity`. A residence or primary activity replaces the previous one.
    ///
    /// # Panics
    ///
    /// If the subgroup does not exist.
    pub fn add_to_facility(&mut self, person: PersonId, subgroup: SubgroupRef, activity: Activity) {
        let facility = &mut self.facilities[subgroup.facility.index()];
        assert!(
            subgroup.subgroup < facility.subgroups.len(),
            "{} has no subgroup {}",
            facility.id,
            subgroup.subgroup
        );
        facility.subgroups[subgroup.subgroup].push(person);
        let person = &mut self.people[person.index()];
        match activity {
            Activity::Residence => person.residence = Some(subgroup),
            Activity::PrimaryActivity => person.primary_activity = Some(subgroup),
            Activity::Leisure => person.leisure.push(subgroup),
        }
    }

    /// Enrolls a student in a learning center on the given shift.
    ///
    /// # Panics
    ///
    /// If the facility is not a learning center.
    pub fn add_learning_center_student(
        &mut self,
        person: PersonId,
        facility: FacilityId,
        shift: u8,
    ) {
        self.add_to_facility(
            person,
            SubgroupRef::new(facility, crate::facility::TEACHERS + 1),
            Activity::PrimaryActivity,
        );
        match &mut self.facilities[facility.index()].detail {
            FacilityDetail::LearningCenter { shifts, .. } => shifts.push(shift),
            _ => panic!("{facility} is not a learning center"),
        }
    }

    #[must_use]
    pub fn residents(&self, area: AreaId) -> &[PersonId] {
        &self.residents[area.index()]
    }

    #[must_use]
    pub fn facilities_in_area(&self, area: AreaId, kind: FacilityKind) -> &[FacilityId] {
        &self.area_facilities[area.index()][kind.index()]
    }

    /// Facilities of a kind in every area of a super area, in area order.
    #[must_use]
    pub fn facilities_in_super_area(
        &self,
        super_area: SuperAreaId,
        kind: FacilityKind,
    ) -> Vec<FacilityId> {
        self.geography
            .super_area(super_area)
            .areas
            .iter()
            .flat_map(|area| self.facilities_in_area(*area, kind).iter().copied())
            .collect()
    }

    /// People living in a super area, summed over its areas.
    #[must_use]
    pub fn super_area_population(&self, super_area: SuperAreaId) -> usize {
        self.geography
            .super_area(super_area)
            .areas
            .iter()
            .map(|area| self.residents(*area).len())
            .sum()
    }

    pub fn facility_members(&self, facility: FacilityId) -> impl Iterator<Item = PersonId> + '_ {
        self.facility(facility).members()
    }

    /// Replaces the spatial index for `kind` with one built from the current facilities.
    pub fn rebuild_spatial_index(&mut self, kind: FacilityKind) {
        let index = SpatialIndex::build(
            self.facilities_of_kind(kind)
                .map(|facility| (facility.id, facility.coordinates)),
        );
        trace!("rebuilt {kind} index over {} facilities", index.len());
        self.spatial_indexes[kind.index()] = index;
    }

    pub fn rebuild_spatial_indexes(&mut self) {
        for kind in FacilityKind::iter() {
            self.rebuild_spatial_index(kind);
        }
    }

    /// The index for `kind`. [`SpatialIndex::Empty`] until the first rebuild.
    #[must_use]
    pub fn spatial_index(&self, kind: FacilityKind) -> &SpatialIndex<FacilityId> {
        &self.spatial_indexes[kind.index()]
    }

    /// Restores a world from its parts, recomputing the per-area lists and the indexes.
    pub(crate) fn from_parts(
        mut geography: Geography,
        people: Vec<Person>,
        facilities: Vec<Facility>,
    ) -> Self {
        geography.rebuild_indexes();
        let mut world = World::new(geography);
        for person in &people {
            world.residents[person.area.index()].push(person.id);
        }
        for facility in &facilities {
            world.area_facilities[facility.area.index()][facility.kind.index()].push(facility.id);
        }
        world.people = people;
        world.facilities = facilities;
        world.rebuild_spatial_indexes();
        world
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use synthpop_geo::{Coordinates, HierarchyRow};

    /// Two super areas: `s1` with areas `a1`, `a2`, and `s2` with area `a3`.
    pub(crate) fn test_geography() -> Geography {
        let rows = vec![
            HierarchyRow::new("a1", "s1", "r1"),
            HierarchyRow::new("a2", "s1", "r1"),
            HierarchyRow::new("a3", "s2", "r1"),
        ];
        let mut coordinates = BTreeMap::new();
        coordinates.insert("a1".to_string(), Coordinates::new(21.20, 92.15));
        coordinates.insert("a2".to_string(), Coordinates::new(21.21, 92.15));
        coordinates.insert("a3".to_string(), Coordinates::new(21.30, 92.20));
        Geography::from_rows(&rows, &coordinates, &BTreeMap::new()).unwrap()
    }

    #[test]
    fn residents_and_super_area_population() {
        let mut world = World::new(test_geography());
        world.add_person(10, Sex::Female, AreaId(0));
        world.add_person(20, Sex::Male, AreaId(1));
        world.add_person(30, Sex::Male, AreaId(1));
        world.add_person(40, Sex::Female, AreaId(2));
        assert_eq!(world.residents(AreaId(1)), &[PersonId(1), PersonId(2)]);
        assert_eq!(world.super_area_population(SuperAreaId(0)), 3);
        assert_eq!(world.super_area_population(SuperAreaId(1)), 1);
        let total: usize = world
            .geography()
            .super_areas()
            .iter()
            .map(|s| world.super_area_population(s.id))
            .sum();
        assert_eq!(total, world.people().len());
    }

    #[test]
    fn membership_is_recorded_on_both_sides() {
        let mut world = World::new(test_geography());
        let person = world.add_person(8, Sex::Female, AreaId(0));
        let coordinates = world.geography().area(AreaId(0)).coordinates;
        let household = world.add_facility(FacilitySpec::new(
            FacilityKind::Household,
            AreaId(0),
            coordinates,
            4,
        ));
        let communal = world.add_facility(FacilitySpec::new(
            FacilityKind::Communal,
            AreaId(0),
            coordinates,
            usize::MAX,
        ));
        world.add_to_facility(person, SubgroupRef::new(household, 0), Activity::Residence);
        world.add_to_facility(person, SubgroupRef::new(communal, 0), Activity::Leisure);
        assert_eq!(
            world.person(person).residence,
            Some(SubgroupRef::new(household, 0))
        );
        assert_eq!(world.person(person).leisure.len(), 1);
        assert_eq!(world.facility_members(household).collect::<Vec<_>>(), vec![person]);
        assert_eq!(world.facility(household).super_area, SuperAreaId(0));
    }

    #[test]
    #[should_panic(expected = "has no subgroup 5")]
    fn invalid_subgroup() {
        let mut world = World::new(test_geography());
        let person = world.add_person(8, Sex::Female, AreaId(0));
        let household = world.add_facility(FacilitySpec::new(
            FacilityKind::Household,
            AreaId(0),
            Coordinates::default(),
            4,
        ));
        world.add_to_facility(person, SubgroupRef::new(household, 5), Activity::Residence);
    }

    #[test]
    fn facility_lists_and_index() {
        let mut world = World::new(test_geography());
        let mut schools = Vec::new();
        for area in [AreaId(0), AreaId(1), AreaId(2)] {
            let coordinates = world.geography().area(area).coordinates;
            schools.push(world.add_facility(FacilitySpec::school(area, coordinates, 50, 5, 11)));
        }
        assert_eq!(
            world.facilities_in_super_area(SuperAreaId(0), FacilityKind::School),
            vec![schools[0], schools[1]]
        );
        assert!(world.facilities_in_area(AreaId(2), FacilityKind::Shelter).is_empty());
        assert!(world.spatial_index(FacilityKind::School).is_empty());
        world.rebuild_spatial_index(FacilityKind::School);
        let nearest = world
            .spatial_index(FacilityKind::School)
            .nearest(&Coordinates::new(21.30, 92.20))
            .unwrap();
        assert_eq!(nearest.0, schools[2]);
    }

    #[test]
    fn from_parts_restores_lists() {
        let mut world = World::new(test_geography());
        world.add_person(8, Sex::Female, AreaId(2));
        world.add_facility(FacilitySpec::new(
            FacilityKind::Communal,
            AreaId(2),
            Coordinates::new(21.3, 92.2),
            10,
        ));
        let restored = World::from_parts(
            world.geography().clone(),
            world.people().to_vec(),
            world.facilities().to_vec(),
        );
        assert_eq!(restored.residents(AreaId(2)), &[PersonId(0)]);
        assert_eq!(
            restored.facilities_in_area(AreaId(2), FacilityKind::Communal),
            &[FacilityId(0)]
        );
        assert_eq!(restored.spatial_index(FacilityKind::Communal).len(), 1);
    }
}

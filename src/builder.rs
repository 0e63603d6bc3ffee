//! Builds a [`World`] from census inputs and [`Parameters`].
//!
//! Stages run in a fixed order: geography, population, institutional sites, care home
//! residents, households, shelters, schools and learning centers, care home workers, play
//! groups, leisure venues and finally shelter visits. Care home residents are seated before
//! households so that households are formed from the remaining population. Workers are drawn
//! after schools and learning centers have taken their teachers.
//!
//! Every stage works one area or super area at a time with a generator from
//! [`ContextRandomExt::area_rng`] keyed by stage and unit name, so a unit's outcome does not
//! depend on which other units were built. An error in one unit is recorded in the
//! [`BuildAudit`] and the build moves on to the next unit.
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use synthpop_geo::{AreaId, Coordinates, Geography, HierarchyRow, SuperAreaId};

use crate::audit::BuildAudit;
use crate::context::Context;
use crate::define_rng;
use crate::demography::{populate_area, AgeSexGenerator, AreaDemography};
use crate::distributors::leisure::{
    create_venues_from_sites, create_venues_per_capita, distribute_leisure,
};
use crate::distributors::play_group::{create_play_groups, distribute_play_groups};
use crate::distributors::{
    CareHomeDistributor, CommunalBand, HouseholdDistributor, LearningCenterDistributor,
    SchoolDistributor, SchoolIndex, SchoolSite, ShelterDistributor,
};
use crate::error::SimError;
use crate::facility::{FacilityKind, FacilitySite, FacilitySpec};
use crate::log::{debug, info, warn};
use crate::parameters::Parameters;
use crate::random::ContextRandomExt;
use crate::world::World;

define_rng!(BuildRng);

/// Everything a build reads besides [`Parameters`]. Areas and super areas are referred to by
/// name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldInputs {
    pub hierarchy: Vec<HierarchyRow>,
    pub area_coordinates: BTreeMap<String, Coordinates>,
    pub super_area_coordinates: BTreeMap<String, Coordinates>,
    pub demography: Vec<AreaDemography>,
    /// Number of households per area.
    pub households: BTreeMap<String, usize>,
    pub schools: Vec<SchoolSite>,
    pub learning_centers: Vec<FacilitySite>,
    /// Care homes; `max_size` is the number of beds.
    pub care_homes: Vec<FacilitySite>,
    /// Communal residents per super area.
    pub communal_residents: BTreeMap<String, Vec<CommunalBand>>,
    pub leisure_sites: BTreeMap<FacilityKind, Vec<FacilitySite>>,
}

impl WorldInputs {
    /// Reads inputs from a JSON file.
    ///
    /// # Errors
    ///
    /// I/O and JSON errors.
    pub fn from_file(path: &Path) -> Result<Self, SimError> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

pub struct WorldBuilder<'a> {
    parameters: &'a Parameters,
    inputs: &'a WorldInputs,
}

/// Records a failed unit and turns the result into an option.
fn catch<T>(
    audit: &mut BuildAudit,
    unit: &str,
    stage: &str,
    result: Result<T, SimError>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            warn!("{stage} failed for {unit}: {error}");
            audit.record_failure(unit, stage, &error);
            None
        }
    }
}

fn area_name(world: &World, area: AreaId) -> String {
    world.geography().area(area).name.clone()
}

fn super_area_name(world: &World, super_area: SuperAreaId) -> String {
    world.geography().super_area(super_area).name.clone()
}

impl<'a> WorldBuilder<'a> {
    #[must_use]
    pub fn new(parameters: &'a Parameters, inputs: &'a WorldInputs) -> Self {
        WorldBuilder { parameters, inputs }
    }

    /// Builds the world into `context`, replacing whatever world it held, and returns the
    /// audit. Seeds the context's generators from the parameters.
    ///
    /// # Errors
    ///
    /// Invalid parameters, an invalid geography and household size distribution. Failures
    /// confined to one area or super area are recorded in the audit instead.
    pub fn build(&self, context: &mut Context) -> Result<BuildAudit, SimError> {
        self.parameters.validate()?;
        let geography = Geography::from_rows(
            &self.inputs.hierarchy,
            &self.inputs.area_coordinates,
            &self.inputs.super_area_coordinates,
        )?;
        info!(
            "building world over {} areas in {} super areas",
            geography.areas().len(),
            geography.super_areas().len()
        );
        context.init_random(self.parameters.seed);
        context.replace_world(World::new(geography));

        let mut audit = BuildAudit::default();
        self.populate(context, &mut audit);
        self.create_sites(context.world_mut());
        self.seat_care_home_residents(context, &mut audit);
        self.form_households(context, &mut audit)?;
        if self.parameters.shelters.enabled {
            self.build_shelters(context, &mut audit);
        }
        self.fill_schools(context, &mut audit);
        self.fill_learning_centers(context, &mut audit);
        self.staff_care_homes(context);
        self.fill_play_groups(context, &mut audit);
        self.register_leisure(context, &mut audit);
        if self.parameters.shelters.enabled {
            self.link_shelter_visits(context);
        }

        let world = context.world_mut();
        world.rebuild_spatial_indexes();
        info!(
            "built {} people in {} facilities",
            world.people().len(),
            world.facilities().len()
        );
        info!("{}", audit.summary());
        Ok(audit)
    }

    fn populate(&self, context: &mut Context, audit: &mut BuildAudit) {
        for demography in &self.inputs.demography {
            let rng = context.area_rng(BuildRng, &format!("population/{}", demography.area));
            let world = context.world_mut();
            let result = world
                .geography()
                .require_area(&demography.area)
                .map_err(SimError::from)
                .and_then(|area| {
                    let mut generator =
                        AgeSexGenerator::new(demography, self.parameters.max_age, rng)?;
                    populate_area(world, area, &mut generator)
                });
            catch(audit, &demography.area, "population", result);
        }
    }

    /// Places schools, learning centers and care homes in their closest area.
    fn create_sites(&self, world: &mut World) {
        let closest = |world: &World, coordinates: &Coordinates| {
            world
                .geography()
                .closest_areas(coordinates, 1)
                .first()
                .map(|(area, _)| *area)
        };
        for site in &self.inputs.schools {
            if let Some(area) = closest(world, &site.coordinates) {
                world.add_facility(FacilitySpec::school(
                    area,
                    site.coordinates,
                    site.n_pupils_max,
                    site.age_min,
                    site.age_max,
                ));
            }
        }
        let learning_centers = &self.parameters.learning_centers;
        for site in &self.inputs.learning_centers {
            if let Some(area) = closest(world, &site.coordinates) {
                world.add_facility(FacilitySpec::learning_center(
                    area,
                    site.coordinates,
                    site.max_size.unwrap_or(learning_centers.max_size),
                    learning_centers.n_shifts,
                ));
            }
        }
        for site in &self.inputs.care_homes {
            if let Some(area) = closest(world, &site.coordinates) {
                world.add_facility(FacilitySpec::new(
                    FacilityKind::CareHome,
                    area,
                    site.coordinates,
                    site.max_size.unwrap_or(0),
                ));
            }
        }
        world.rebuild_spatial_indexes();
        info!(
            "created {} schools, {} learning centers, {} care homes",
            world.facilities_of_kind(FacilityKind::School).count(),
            world.facilities_of_kind(FacilityKind::LearningCenter).count(),
            world.facilities_of_kind(FacilityKind::CareHome).count()
        );
    }

    fn seat_care_home_residents(&self, context: &mut Context, audit: &mut BuildAudit) {
        let distributor = CareHomeDistributor::new(&self.parameters.care_homes);
        for (name, bands) in &self.inputs.communal_residents {
            let mut rng = context.area_rng(BuildRng, &format!("care_home_residents/{name}"));
            let world = context.world_mut();
            let result = world
                .geography()
                .require_super_area(name)
                .map_err(SimError::from)
                .and_then(|super_area| {
                    distributor.distribute_residents(world, super_area, bands, &mut rng, audit)
                });
            catch(audit, name, "care_home_residents", result);
        }
    }

    fn form_households(
        &self,
        context: &mut Context,
        audit: &mut BuildAudit,
    ) -> Result<(), SimError> {
        let distributor = HouseholdDistributor::new(&self.parameters.households)?;
        for index in 0..context.world().geography().areas().len() {
            let area = AreaId(index as u32);
            let name = area_name(context.world(), area);
            let n_households = self.inputs.households.get(&name).copied().unwrap_or(0);
            let mut rng = context.area_rng(BuildRng, &format!("households/{name}"));
            let result =
                distributor.distribute(context.world_mut(), area, n_households, &mut rng, audit);
            catch(audit, &name, "households", result);
        }
        Ok(())
    }

    fn build_shelters(&self, context: &mut Context, audit: &mut BuildAudit) {
        let distributor = ShelterDistributor::new(&self.parameters.shelters);
        for index in 0..context.world().geography().areas().len() {
            let area = AreaId(index as u32);
            let name = area_name(context.world(), area);
            let mut rng = context.area_rng(BuildRng, &format!("shelters/{name}"));
            distributor.distribute(context.world_mut(), area, &mut rng, audit);
        }
    }

    fn fill_schools(&self, context: &mut Context, audit: &mut BuildAudit) {
        let index = SchoolIndex::build(context.world());
        if index.is_empty() {
            debug!("no schools, skipping school distribution");
            return;
        }
        let distributor = SchoolDistributor::new(&self.parameters.schools, &index);
        for area in 0..context.world().geography().areas().len() {
            let area = AreaId(area as u32);
            let name = area_name(context.world(), area);
            let mut rng = context.area_rng(BuildRng, &format!("schools/{name}"));
            let result = distributor.distribute_students(context.world_mut(), area, &mut rng, audit);
            catch(audit, &name, "schools", result);
        }
        for super_area in 0..context.world().geography().super_areas().len() {
            let super_area = SuperAreaId(super_area as u32);
            let name = super_area_name(context.world(), super_area);
            let mut rng = context.area_rng(BuildRng, &format!("teachers/{name}"));
            distributor.distribute_teachers(context.world_mut(), super_area, &mut rng);
        }
    }

    fn fill_learning_centers(&self, context: &mut Context, audit: &mut BuildAudit) {
        if context
            .world()
            .spatial_index(FacilityKind::LearningCenter)
            .is_empty()
        {
            debug!("no learning centers, skipping learning center distribution");
            return;
        }
        let distributor = LearningCenterDistributor::new(&self.parameters.learning_centers);
        for area in 0..context.world().geography().areas().len() {
            let area = AreaId(area as u32);
            let name = area_name(context.world(), area);
            let mut rng = context.area_rng(BuildRng, &format!("learning_centers/{name}"));
            let result = distributor.distribute_students(context.world_mut(), area, &mut rng, audit);
            catch(audit, &name, "learning_centers", result);
        }
        let mut rng = context.area_rng(BuildRng, "learning_center_teachers");
        distributor.distribute_teachers(context.world_mut(), &mut rng, audit);
    }

    fn staff_care_homes(&self, context: &mut Context) {
        let distributor = CareHomeDistributor::new(&self.parameters.care_homes);
        for super_area in 0..context.world().geography().super_areas().len() {
            let super_area = SuperAreaId(super_area as u32);
            if context
                .world()
                .facilities_in_super_area(super_area, FacilityKind::CareHome)
                .is_empty()
            {
                continue;
            }
            let name = super_area_name(context.world(), super_area);
            let mut rng = context.area_rng(BuildRng, &format!("care_home_workers/{name}"));
            distributor.distribute_workers(context.world_mut(), super_area, &mut rng);
        }
    }

    fn fill_play_groups(&self, context: &mut Context, audit: &mut BuildAudit) {
        let parameters = &self.parameters.play_groups;
        let n_areas = context.world().geography().areas().len();
        let world = context.world_mut();
        let created: usize = (0..n_areas)
            .map(|area| create_play_groups(world, AreaId(area as u32), parameters).len())
            .sum();
        if created == 0 {
            debug!("no play groups created");
            return;
        }
        world.rebuild_spatial_index(FacilityKind::PlayGroup);
        for area in 0..n_areas {
            let area = AreaId(area as u32);
            let name = area_name(context.world(), area);
            let mut rng = context.area_rng(BuildRng, &format!("play_groups/{name}"));
            let result =
                distribute_play_groups(context.world_mut(), area, parameters, &mut rng, audit);
            catch(audit, &name, "play_groups", result);
        }
    }

    fn register_leisure(&self, context: &mut Context, audit: &mut BuildAudit) {
        let n_areas = context.world().geography().areas().len();
        for (kind, parameters) in &self.parameters.leisure {
            let world = context.world_mut();
            if let Some(sites) = self.inputs.leisure_sites.get(kind) {
                create_venues_from_sites(world, *kind, sites, parameters);
            }
            for area in 0..n_areas {
                create_venues_per_capita(world, AreaId(area as u32), *kind, parameters);
            }
            world.rebuild_spatial_index(*kind);
            if world.spatial_index(*kind).is_empty() {
                debug!("no {kind} venues");
                continue;
            }
            for area in 0..n_areas {
                let area = AreaId(area as u32);
                let name = area_name(context.world(), area);
                let mut rng = context.area_rng(BuildRng, &format!("{kind}/{name}"));
                let result = distribute_leisure(
                    context.world_mut(),
                    &[area],
                    *kind,
                    parameters,
                    &mut rng,
                    audit,
                );
                catch(audit, &name, &kind.to_string(), result);
            }
        }
    }

    fn link_shelter_visits(&self, context: &mut Context) {
        let distributor = ShelterDistributor::new(&self.parameters.shelters);
        for super_area in 0..context.world().geography().super_areas().len() {
            let super_area = SuperAreaId(super_area as u32);
            let name = super_area_name(context.world(), super_area);
            let mut rng = context.area_rng(BuildRng, &format!("shelter_visits/{name}"));
            distributor.link_visits(context.world_mut(), super_area, &mut rng);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audit::AuditEvent;
    use crate::demography::SexBins;
    use crate::parameters::{AgeRange, LeisureParameters};
    use crate::facility::CareHomeSubgroup;
    use crate::people::Sex;

    /// Two super areas of two areas each, 40 residents per area (every even age below 80), two schools, a
    /// learning center, a care home and communal venues.
    pub(crate) fn camp_inputs() -> WorldInputs {
        let mut inputs = WorldInputs::default();
        for (i, (area, super_area)) in [("a1", "s1"), ("a2", "s1"), ("a3", "s2"), ("a4", "s2")]
            .into_iter()
            .enumerate()
        {
            inputs
                .hierarchy
                .push(HierarchyRow::new(area, super_area, "r1"));
            inputs.area_coordinates.insert(
                area.to_string(),
                Coordinates::new(21.20 + 0.01 * i as f64, 92.15),
            );
            inputs.demography.push(AreaDemography {
                area: area.to_string(),
                age_counts: (0..80).map(|age| u32::from(age % 2 == 0)).collect(),
                sex_bins: SexBins::uniform(0.5),
            });
            inputs.households.insert(area.to_string(), 8);
        }
        inputs.schools = vec![
            SchoolSite {
                coordinates: Coordinates::new(21.205, 92.15),
                n_pupils_max: 60,
                age_min: 5,
                age_max: 18,
            },
            SchoolSite {
                coordinates: Coordinates::new(21.225, 92.15),
                n_pupils_max: 60,
                age_min: 5,
                age_max: 18,
            },
        ];
        inputs.learning_centers = vec![FacilitySite {
            coordinates: Coordinates::new(21.21, 92.15),
            max_size: None,
        }];
        inputs.care_homes = vec![FacilitySite {
            coordinates: Coordinates::new(21.20, 92.15),
            max_size: Some(4),
        }];
        inputs.communal_residents.insert(
            "s1".to_string(),
            vec![CommunalBand {
                ages: AgeRange::new(65, 99),
                sex: Sex::Female,
                count: 2,
            }],
        );
        inputs.leisure_sites.insert(
            FacilityKind::Communal,
            vec![FacilitySite {
                coordinates: Coordinates::new(21.215, 92.15),
                max_size: None,
            }],
        );
        inputs
    }

    pub(crate) fn camp_parameters(seed: u64) -> Parameters {
        let mut parameters = Parameters {
            seed,
            ..Parameters::default()
        };
        parameters
            .leisure
            .insert(FacilityKind::Communal, LeisureParameters::default());
        parameters
    }

    #[test]
    fn everyone_lives_somewhere() {
        let (parameters, inputs) = (camp_parameters(7), camp_inputs());
        let mut context = Context::new();
        let audit = WorldBuilder::new(&parameters, &inputs)
            .build(&mut context)
            .unwrap();
        assert!(audit.failures().is_empty(), "{:?}", audit.failures());
        let world = context.world();
        assert_eq!(world.people().len(), 160);
        for person in world.people() {
            let residence = person.residence.expect("every person has a residence");
            let kind = world.facility(residence.facility).kind;
            assert!(
                matches!(kind, FacilityKind::Shelter | FacilityKind::CareHome),
                "{} lives in a {kind}",
                person.id
            );
        }
        let care_home = world.facilities_of_kind(FacilityKind::CareHome).next().unwrap();
        assert_eq!(care_home.subgroup(CareHomeSubgroup::Residents as usize).len(), 2);
    }

    #[test]
    fn mandatory_ages_attend_school() {
        let (parameters, inputs) = (camp_parameters(7), camp_inputs());
        let mut context = Context::new();
        WorldBuilder::new(&parameters, &inputs)
            .build(&mut context)
            .unwrap();
        let world = context.world();
        for person in world.people() {
            if parameters.schools.mandatory_age_range.contains(person.age) {
                let school = person.primary_activity.expect("mandatory age has a school");
                assert_eq!(world.facility(school.facility).kind, FacilityKind::School);
            }
        }
        let communal = world
            .facilities_of_kind(FacilityKind::Communal)
            .next()
            .unwrap();
        assert_eq!(communal.size(), 160);
    }

    #[test]
    fn unknown_area_is_a_failed_unit() {
        let parameters = camp_parameters(1);
        let mut inputs = camp_inputs();
        inputs.demography.push(AreaDemography {
            area: "nowhere".to_string(),
            age_counts: vec![3],
            sex_bins: SexBins::uniform(0.5),
        });
        let mut context = Context::new();
        let audit = WorldBuilder::new(&parameters, &inputs)
            .build(&mut context)
            .unwrap();
        assert_eq!(audit.failures().len(), 1);
        assert_eq!(audit.failures()[0].unit, "nowhere");
        assert_eq!(audit.failures()[0].stage, "population");
        assert_eq!(context.world().people().len(), 160);
        assert_eq!(audit.total(AuditEvent::Unplaced), 0);
    }

    #[test]
    fn empty_hierarchy_is_an_error() {
        let parameters = camp_parameters(1);
        let inputs = WorldInputs::default();
        let mut context = Context::new();
        assert!(matches!(
            WorldBuilder::new(&parameters, &inputs).build(&mut context),
            Err(SimError::Geography(_))
        ));
    }
}

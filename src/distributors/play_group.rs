//! Play groups: generated per capita in each area, one subgroup per age band.
use rand::Rng;
use synthpop_geo::AreaId;

use super::venue::{venues_for_population, VenueDistributor};
use crate::audit::BuildAudit;
use crate::error::SimError;
use crate::facility::{FacilityId, FacilityKind, FacilitySpec};
use crate::log::debug;
use crate::parameters::{AgeRange, PlayGroupParameters};
use crate::people::Activity;
use crate::world::World;

fn in_any_band(parameters: &PlayGroupParameters, age: u8) -> bool {
    parameters.age_bands.iter().any(|band| band.contains(age))
}

/// Creates `ceil(venues_per_capita * children)` play groups in `area`, counting the children in
/// any age band.
pub fn create_play_groups(
    world: &mut World,
    area: AreaId,
    parameters: &PlayGroupParameters,
) -> Vec<FacilityId> {
    let eligible = world
        .residents(area)
        .iter()
        .filter(|id| in_any_band(parameters, world.person(**id).age))
        .count();
    let n_venues = venues_for_population(parameters.venues_per_capita, eligible);
    let coordinates = world.geography().area(area).coordinates;
    let bands: Vec<(u8, u8)> = parameters
        .age_bands
        .iter()
        .map(|band| (band.min, band.max))
        .collect();
    debug!(
        "{}: {n_venues} play groups for {eligible} children",
        world.geography().area(area).name
    );
    (0..n_venues)
        .map(|_| {
            world.add_facility(FacilitySpec::play_group(
                area,
                coordinates,
                parameters.max_size,
                bands.clone(),
            ))
        })
        .collect()
}

/// Registers the children of `area` with the nearest play groups, in the subgroup of their age
/// band. The play group index must be current.
///
/// # Errors
///
/// [`SimError::Configuration`] if there are children but no play groups.
pub fn distribute_play_groups<R: Rng>(
    world: &mut World,
    area: AreaId,
    parameters: &PlayGroupParameters,
    rng: &mut R,
    audit: &mut BuildAudit,
) -> Result<usize, SimError> {
    let (Some(min), Some(max)) = (
        parameters.age_bands.iter().map(|band| band.min).min(),
        parameters.age_bands.iter().map(|band| band.max).max(),
    ) else {
        return Ok(0);
    };
    let children: Vec<_> = world
        .residents(area)
        .iter()
        .copied()
        .filter(|id| in_any_band(parameters, world.person(*id).age))
        .collect();
    VenueDistributor::new(
        FacilityKind::PlayGroup,
        parameters.k_candidates,
        AgeRange::new(min, max),
        Activity::Leisure,
    )
    .distribute(
        world,
        &children,
        |facility, person| facility.age_band_subgroup(person.age),
        rng,
        audit,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::people::Sex;
    use crate::world::tests::test_geography;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn per_capita_rounds_up() {
        let mut world = World::new(test_geography());
        for age in [4, 8, 13, 30] {
            world.add_person(age, Sex::Female, AreaId(0));
        }
        let parameters = PlayGroupParameters::default();
        let created = create_play_groups(&mut world, AreaId(0), &parameters);
        // ceil(3 / 20)
        assert_eq!(created.len(), 1);
        assert!(create_play_groups(&mut world, AreaId(1), &parameters).is_empty());
    }

    #[test]
    fn children_join_their_band() {
        let mut world = World::new(test_geography());
        let young = world.add_person(4, Sex::Female, AreaId(0));
        let middle = world.add_person(8, Sex::Male, AreaId(0));
        let old = world.add_person(13, Sex::Female, AreaId(0));
        let adult = world.add_person(30, Sex::Male, AreaId(0));
        let parameters = PlayGroupParameters::default();
        let created = create_play_groups(&mut world, AreaId(0), &parameters);
        world.rebuild_spatial_index(FacilityKind::PlayGroup);
        let mut audit = BuildAudit::default();
        let mut rng = SmallRng::seed_from_u64(9);
        let placed =
            distribute_play_groups(&mut world, AreaId(0), &parameters, &mut rng, &mut audit)
                .unwrap();
        assert_eq!(placed, 3);
        let group = world.facility(created[0]);
        assert_eq!(group.subgroup(0), &[young]);
        assert_eq!(group.subgroup(1), &[middle]);
        assert_eq!(group.subgroup(2), &[old]);
        assert!(world.person(adult).leisure.is_empty());
        assert_eq!(world.person(old).leisure.len(), 1);
    }
}

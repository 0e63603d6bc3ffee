//! Leisure venues: communal spaces, pumps and latrines, distribution centers.
//!
//! Venues come from a coordinate list, each placed in its closest area and dropped when that
//! area is further than `max_distance_to_area`, or are generated per capita in every area.
//! Each area gets a candidate list: venues within `search_radius_km` of its centre, sampled down
//! to `neighbours_to_consider`, or the single closest venue when none is that near. Eligible
//! residents are registered with a venue from their area's list, tried in random order.
use std::collections::BTreeMap;

use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use synthpop_geo::AreaId;

use super::venue::{venues_for_population, VenueDistributor};
use crate::audit::BuildAudit;
use crate::error::SimError;
use crate::facility::{FacilityId, FacilityKind, FacilitySite, FacilitySpec};
use crate::log::{debug, info};
use crate::parameters::LeisureParameters;
use crate::people::Activity;
use crate::world::World;

fn distributor(kind: FacilityKind, parameters: &LeisureParameters) -> VenueDistributor {
    VenueDistributor::new(
        kind,
        parameters.neighbours_to_consider,
        parameters.ages,
        Activity::Leisure,
    )
    .with_sex(parameters.sex)
}

/// Creates venues of `kind` from `sites`. Returns the venues kept.
pub fn create_venues_from_sites(
    world: &mut World,
    kind: FacilityKind,
    sites: &[FacilitySite],
    parameters: &LeisureParameters,
) -> Vec<FacilityId> {
    let mut venues = Vec::with_capacity(sites.len());
    for site in sites {
        let Some((area, distance)) = world
            .geography()
            .closest_areas(&site.coordinates, 1)
            .first()
            .copied()
        else {
            continue;
        };
        if distance > parameters.max_distance_to_area {
            debug!(
                "dropping {kind} at {}: {distance:.2} km from the nearest area",
                site.coordinates
            );
            continue;
        }
        venues.push(world.add_facility(FacilitySpec::new(
            kind,
            area,
            site.coordinates,
            site.max_size.unwrap_or(parameters.max_size),
        )));
    }
    info!("{} of {} {kind} sites kept", venues.len(), sites.len());
    venues
}

/// Creates `ceil(venues_per_capita * eligible)` venues of `kind` at the centre of `area`. Does
/// nothing unless the kind is generated per capita.
pub fn create_venues_per_capita(
    world: &mut World,
    area: AreaId,
    kind: FacilityKind,
    parameters: &LeisureParameters,
) -> Vec<FacilityId> {
    let Some(venues_per_capita) = parameters.venues_per_capita else {
        return Vec::new();
    };
    let eligible_filter = distributor(kind, parameters);
    let eligible = world
        .residents(area)
        .iter()
        .filter(|id| eligible_filter.is_eligible(world.person(**id)))
        .count();
    let coordinates = world.geography().area(area).coordinates;
    (0..venues_for_population(venues_per_capita, eligible))
        .map(|_| {
            world.add_facility(FacilitySpec::new(
                kind,
                area,
                coordinates,
                parameters.max_size,
            ))
        })
        .collect()
}

/// Candidate venues of `kind` for the residents of `area`. The index for `kind` must be
/// current.
pub fn area_candidates<R: Rng>(
    world: &World,
    area: AreaId,
    kind: FacilityKind,
    parameters: &LeisureParameters,
    rng: &mut R,
) -> Vec<FacilityId> {
    let coordinates = world.geography().area(area).coordinates;
    let index = world.spatial_index(kind);
    let nearby = index.within_radius(&coordinates, parameters.search_radius_km);
    if nearby.is_empty() {
        return index
            .nearest(&coordinates)
            .map(|(id, _)| vec![id])
            .unwrap_or_default();
    }
    if nearby.len() <= parameters.neighbours_to_consider {
        return nearby;
    }
    nearby
        .choose_multiple(rng, parameters.neighbours_to_consider)
        .copied()
        .collect()
}

/// Registers the eligible residents of `areas` with venues of `kind`. Returns the number of
/// people registered.
///
/// # Errors
///
/// [`SimError::Configuration`] naming the first area with eligible residents but no venue of
/// the kind anywhere.
pub fn distribute_leisure<R: Rng>(
    world: &mut World,
    areas: &[AreaId],
    kind: FacilityKind,
    parameters: &LeisureParameters,
    rng: &mut R,
    audit: &mut BuildAudit,
) -> Result<usize, SimError> {
    let mut candidates: BTreeMap<AreaId, Vec<FacilityId>> = BTreeMap::new();
    let mut people = Vec::new();
    for area in areas {
        candidates.insert(*area, area_candidates(world, *area, kind, parameters, rng));
        people.extend_from_slice(world.residents(*area));
    }
    let placed = distributor(kind, parameters).distribute_among(
        world,
        &people,
        |_, area, rng| {
            let mut order = candidates.get(&area).cloned().unwrap_or_default();
            order.shuffle(rng);
            order
        },
        |_, _| Some(0),
        rng,
        audit,
    )?;
    info!("{placed} people registered with {kind} venues");
    Ok(placed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditEvent;
    use crate::parameters::AgeRange;
    use crate::people::Sex;
    use crate::world::tests::test_geography;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use synthpop_geo::Coordinates;

    #[test]
    fn far_sites_are_dropped() {
        let mut world = World::new(test_geography());
        let sites = [
            FacilitySite {
                coordinates: Coordinates::new(21.201, 92.151),
                max_size: None,
            },
            FacilitySite {
                coordinates: Coordinates::new(23.0, 95.0),
                max_size: Some(4),
            },
        ];
        let parameters = LeisureParameters::default();
        let venues =
            create_venues_from_sites(&mut world, FacilityKind::Communal, &sites, &parameters);
        assert_eq!(venues.len(), 1);
        assert_eq!(world.facility(venues[0]).area, AreaId(0));
    }

    #[test]
    fn per_capita_counts_only_eligible() {
        let mut world = World::new(test_geography());
        for _ in 0..10 {
            world.add_person(30, Sex::Male, AreaId(0));
        }
        world.add_person(30, Sex::Female, AreaId(0));
        let parameters = LeisureParameters {
            venues_per_capita: Some(0.5),
            sex: Some(Sex::Female),
            ..LeisureParameters::default()
        };
        let venues = create_venues_per_capita(
            &mut world,
            AreaId(0),
            FacilityKind::FemaleCommunal,
            &parameters,
        );
        assert_eq!(venues.len(), 1);
    }

    #[test]
    fn closest_venue_when_none_in_radius() {
        let mut world = World::new(test_geography());
        let coordinates = world.geography().area(AreaId(2)).coordinates;
        let venue = world.add_facility(FacilitySpec::new(
            FacilityKind::DistributionCenter,
            AreaId(2),
            coordinates,
            usize::MAX,
        ));
        world.rebuild_spatial_index(FacilityKind::DistributionCenter);
        let parameters = LeisureParameters {
            search_radius_km: 1.0,
            ..LeisureParameters::default()
        };
        let mut rng = SmallRng::seed_from_u64(0);
        let candidates = area_candidates(
            &world,
            AreaId(0),
            FacilityKind::DistributionCenter,
            &parameters,
            &mut rng,
        );
        assert_eq!(candidates, vec![venue]);
    }

    #[test]
    fn candidates_are_sampled_down() {
        let mut world = World::new(test_geography());
        let coordinates = world.geography().area(AreaId(0)).coordinates;
        for _ in 0..8 {
            world.add_facility(FacilitySpec::new(
                FacilityKind::Communal,
                AreaId(0),
                coordinates,
                usize::MAX,
            ));
        }
        world.rebuild_spatial_index(FacilityKind::Communal);
        let parameters = LeisureParameters::default();
        let mut rng = SmallRng::seed_from_u64(0);
        let candidates =
            area_candidates(&world, AreaId(0), FacilityKind::Communal, &parameters, &mut rng);
        assert_eq!(candidates.len(), parameters.neighbours_to_consider);
    }

    #[test]
    fn residents_registered_by_sex() {
        let mut world = World::new(test_geography());
        let coordinates = world.geography().area(AreaId(0)).coordinates;
        world.add_facility(FacilitySpec::new(
            FacilityKind::FemaleCommunal,
            AreaId(0),
            coordinates,
            usize::MAX,
        ));
        world.rebuild_spatial_index(FacilityKind::FemaleCommunal);
        let woman = world.add_person(30, Sex::Female, AreaId(0));
        let man = world.add_person(30, Sex::Male, AreaId(0));
        let girl = world.add_person(8, Sex::Female, AreaId(1));
        let parameters = LeisureParameters {
            sex: Some(Sex::Female),
            ages: AgeRange::new(12, 99),
            ..LeisureParameters::default()
        };
        let mut audit = BuildAudit::default();
        let mut rng = SmallRng::seed_from_u64(0);
        let placed = distribute_leisure(
            &mut world,
            &[AreaId(0), AreaId(1)],
            FacilityKind::FemaleCommunal,
            &parameters,
            &mut rng,
            &mut audit,
        )
        .unwrap();
        assert_eq!(placed, 1);
        assert_eq!(world.person(woman).leisure.len(), 1);
        assert!(world.person(man).leisure.is_empty());
        assert!(world.person(girl).leisure.is_empty());
        assert_eq!(audit.total(AuditEvent::Overflow), 0);
    }
}

#![allow(dead_code)]
use std::collections::BTreeMap;

use synthpop::builder::WorldInputs;
use synthpop::demography::{AreaDemography, SexBins};
use synthpop::distributors::{CommunalBand, SchoolSite};
use synthpop::facility::{FacilityKind, FacilitySite};
use synthpop::parameters::{AgeRange, LeisureParameters, Parameters};
use synthpop::people::Sex;
use synthpop::synthpop_geo::{Coordinates, Geography, HierarchyRow};

/// Areas `a1`..`a4` about a kilometre apart; `a1`, `a2` in super area `s1`, `a3`, `a4` in `s2`.
pub fn camp_hierarchy() -> (Vec<HierarchyRow>, BTreeMap<String, Coordinates>) {
    let mut rows = Vec::new();
    let mut coordinates = BTreeMap::new();
    for (i, (area, super_area)) in [("a1", "s1"), ("a2", "s1"), ("a3", "s2"), ("a4", "s2")]
        .into_iter()
        .enumerate()
    {
        rows.push(HierarchyRow::new(area, super_area, "r1"));
        coordinates.insert(
            area.to_string(),
            Coordinates::new(21.20 + 0.01 * i as f64, 92.15),
        );
    }
    (rows, coordinates)
}

pub fn camp_geography() -> Geography {
    let (rows, coordinates) = camp_hierarchy();
    Geography::from_rows(&rows, &coordinates, &BTreeMap::new()).unwrap()
}

/// 60 residents per area, one school per super area, a learning center, a care home in `s1`
/// and two communal spaces.
pub fn camp_inputs() -> WorldInputs {
    let (hierarchy, area_coordinates) = camp_hierarchy();
    let mut inputs = WorldInputs {
        hierarchy,
        area_coordinates,
        ..WorldInputs::default()
    };
    for area in inputs.area_coordinates.keys() {
        inputs.demography.push(AreaDemography {
            area: area.clone(),
            age_counts: (0..90).map(|age| u32::from(age % 3 != 2)).collect(),
            sex_bins: SexBins::uniform(0.5),
        });
        inputs.households.insert(area.clone(), 10);
    }
    inputs.schools = [21.205, 21.225]
        .into_iter()
        .map(|latitude| SchoolSite {
            coordinates: Coordinates::new(latitude, 92.15),
            n_pupils_max: 80,
            age_min: 5,
            age_max: 18,
        })
        .collect();
    inputs.learning_centers = vec![FacilitySite {
        coordinates: Coordinates::new(21.215, 92.15),
        max_size: None,
    }];
    inputs.care_homes = vec![FacilitySite {
        coordinates: Coordinates::new(21.20, 92.15),
        max_size: Some(5),
    }];
    inputs.communal_residents.insert(
        "s1".to_string(),
        vec![
            CommunalBand {
                ages: AgeRange::new(75, 99),
                sex: Sex::Female,
                count: 2,
            },
            CommunalBand {
                ages: AgeRange::new(65, 74),
                sex: Sex::Male,
                count: 2,
            },
        ],
    );
    inputs.leisure_sites.insert(
        FacilityKind::Communal,
        vec![
            FacilitySite {
                coordinates: Coordinates::new(21.20, 92.151),
                max_size: None,
            },
            FacilitySite {
                coordinates: Coordinates::new(21.23, 92.151),
                max_size: None,
            },
        ],
    );
    inputs
}

pub fn camp_parameters(seed: u64) -> Parameters {
    let mut parameters = Parameters {
        seed,
        ..Parameters::default()
    };
    for kind in [FacilityKind::Communal, FacilityKind::PumpLatrine] {
        parameters
            .leisure
            .insert(kind, LeisureParameters::for_kind(kind));
    }
    parameters
}

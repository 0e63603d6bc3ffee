//! Model parameters, loaded from JSON.
//!
//! Every field has a default, so a parameter file only needs to name what it changes:
//!
//! ```json
//! {
//!     "seed": 42,
//!     "shelters": { "sharing_ratio": 0.5 },
//!     "interaction": { "alpha_physical": 3.0 }
//! }
//! ```
//!
//! Maps such as `interaction.betas` replace the default map as a whole, and loading fails unless
//! every facility kind still has a beta and a contact matrix.
//!
//! The parameters live in a data plugin on the [`Context`]; see [`ContextParametersExt`].
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::define_data_plugin;
use crate::error::SimError;
use crate::facility::FacilityKind;
use crate::log::info;
use crate::people::Sex;
use crate::transmission::InteractionModel;

/// Inclusive age range.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub min: u8,
    pub max: u8,
}

impl AgeRange {
    #[must_use]
    pub const fn new(min: u8, max: u8) -> Self {
        AgeRange { min, max }
    }

    #[must_use]
    pub fn contains(&self, age: u8) -> bool {
        (self.min..=self.max).contains(&age)
    }

    fn validate(&self, unit: &str) -> Result<(), SimError> {
        if self.min > self.max {
            return Err(SimError::configuration(
                unit,
                format!("empty age range {}..={}", self.min, self.max),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HouseholdParameters {
    /// Probability of each household size.
    pub size_distribution: BTreeMap<u8, f64>,
    pub kid_max_age: u8,
    pub adult_min_age: u8,
    pub adult_max_age: u8,
}

impl Default for HouseholdParameters {
    fn default() -> Self {
        HouseholdParameters {
            size_distribution: BTreeMap::from([
                (1, 0.07),
                (2, 0.11),
                (3, 0.15),
                (4, 0.18),
                (5, 0.17),
                (6, 0.13),
                (7, 0.08),
                (8, 0.07),
                (9, 0.03),
                (10, 0.01),
            ]),
            kid_max_age: 16,
            adult_min_age: 17,
            adult_max_age: 99,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShelterParameters {
    /// Whether households are grouped into shelters at all.
    pub enabled: bool,
    /// Fraction of households that share a shelter with another household.
    pub sharing_ratio: f64,
    /// Upper bound of the uniform number of visit targets per shelter.
    pub max_visits: usize,
}

impl Default for ShelterParameters {
    fn default() -> Self {
        ShelterParameters {
            enabled: true,
            sharing_ratio: 0.75,
            max_visits: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchoolParameters {
    pub k_candidates: usize,
    pub mandatory_age_range: AgeRange,
    pub students_per_teacher: f64,
    pub teacher_min_age: u8,
}

impl Default for SchoolParameters {
    fn default() -> Self {
        SchoolParameters {
            k_candidates: 5,
            mandatory_age_range: AgeRange::new(5, 18),
            students_per_teacher: 30.0,
            teacher_min_age: 21,
        }
    }
}

/// Probability that a child of the given sex and age range is enrolled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRate {
    pub sex: Sex,
    pub ages: AgeRange,
    pub rate: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningCenterParameters {
    pub k_candidates: usize,
    pub n_shifts: u8,
    pub max_size: usize,
    pub teacher_min_age: u8,
    pub enrollment: Vec<EnrollmentRate>,
}

impl Default for LearningCenterParameters {
    fn default() -> Self {
        let ages = AgeRange::new(3, 17);
        LearningCenterParameters {
            k_candidates: 5,
            n_shifts: 4,
            max_size: 120,
            teacher_min_age: 21,
            enrollment: vec![
                EnrollmentRate {
                    sex: Sex::Female,
                    ages,
                    rate: 0.6,
                },
                EnrollmentRate {
                    sex: Sex::Male,
                    ages,
                    rate: 0.6,
                },
            ],
        }
    }
}

impl LearningCenterParameters {
    /// Enrollment probability for a child; zero when no rate covers them.
    #[must_use]
    pub fn enrollment_rate(&self, sex: Sex, age: u8) -> f64 {
        self.enrollment
            .iter()
            .find(|rate| rate.sex == sex && rate.ages.contains(age))
            .map_or(0.0, |rate| rate.rate)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayGroupParameters {
    pub venues_per_capita: f64,
    pub max_size: usize,
    pub k_candidates: usize,
    /// Inclusive age band of each subgroup. Children outside every band do not attend.
    pub age_bands: Vec<AgeRange>,
}

impl Default for PlayGroupParameters {
    fn default() -> Self {
        PlayGroupParameters {
            venues_per_capita: 1.0 / 20.0,
            max_size: 20,
            k_candidates: 3,
            age_bands: vec![
                AgeRange::new(3, 6),
                AgeRange::new(7, 11),
                AgeRange::new(12, 16),
            ],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CareHomeParameters {
    pub residents_per_worker: f64,
    pub worker_ages: AgeRange,
}

impl Default for CareHomeParameters {
    fn default() -> Self {
        CareHomeParameters {
            residents_per_worker: 4.0,
            worker_ages: AgeRange::new(18, 64),
        }
    }
}

/// How venues of one leisure kind are created and who is registered to them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeisureParameters {
    /// Venues read from coordinates further than this from every area are dropped.
    pub max_distance_to_area: f64,
    /// Radius of the per-area candidate search.
    pub search_radius_km: f64,
    /// Candidate venues kept per area.
    pub neighbours_to_consider: usize,
    pub max_size: usize,
    /// When set, venues are generated per area instead of read from coordinates.
    pub venues_per_capita: Option<f64>,
    pub ages: AgeRange,
    /// Restricts the venue to one sex.
    pub sex: Option<Sex>,
}

impl Default for LeisureParameters {
    fn default() -> Self {
        LeisureParameters {
            max_distance_to_area: 5.0,
            search_radius_km: 5.0,
            neighbours_to_consider: 5,
            max_size: usize::MAX,
            venues_per_capita: None,
            ages: AgeRange::new(0, 99),
            sex: None,
        }
    }
}

impl LeisureParameters {
    /// Defaults per kind: pumps and latrines are generated per capita, female communal spaces
    /// only admit women.
    #[must_use]
    pub fn for_kind(kind: FacilityKind) -> Self {
        match kind {
            FacilityKind::PumpLatrine => LeisureParameters {
                venues_per_capita: Some(1.0 / (100.0 + 35.0 / 2.0)),
                ..LeisureParameters::default()
            },
            FacilityKind::FemaleCommunal => LeisureParameters {
                sex: Some(Sex::Female),
                ages: AgeRange::new(12, 99),
                ..LeisureParameters::default()
            },
            _ => LeisureParameters::default(),
        }
    }
}

/// Contact and physical-contact tables of one facility kind. Rows are the recipient subgroup,
/// columns the infector subgroup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContactMatrixParameters {
    pub contacts: Vec<Vec<f64>>,
    pub proportion_physical: Vec<Vec<f64>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionParameters {
    pub alpha_physical: f64,
    pub betas: BTreeMap<FacilityKind, f64>,
    pub contact_matrices: BTreeMap<FacilityKind, ContactMatrixParameters>,
    pub school_xi: f64,
}

impl Default for InteractionParameters {
    fn default() -> Self {
        let single = |contacts: f64, physical: f64| ContactMatrixParameters {
            contacts: vec![vec![contacts]],
            proportion_physical: vec![vec![physical]],
        };
        let mut contact_matrices = BTreeMap::new();
        contact_matrices.insert(
            FacilityKind::Household,
            ContactMatrixParameters {
                contacts: vec![vec![1.2; 4]; 4],
                proportion_physical: vec![vec![0.79; 4]; 4],
            },
        );
        contact_matrices.insert(
            FacilityKind::Shelter,
            ContactMatrixParameters {
                contacts: vec![vec![1.2, 0.5], vec![0.5, 1.2]],
                proportion_physical: vec![vec![0.79, 0.1], vec![0.1, 0.79]],
            },
        );
        contact_matrices.insert(
            FacilityKind::LearningCenter,
            ContactMatrixParameters {
                contacts: vec![vec![0.0, 5.0], vec![1.0, 10.0]],
                proportion_physical: vec![vec![0.0, 0.1], vec![0.1, 0.2]],
            },
        );
        contact_matrices.insert(
            FacilityKind::CareHome,
            ContactMatrixParameters {
                contacts: vec![
                    vec![5.0, 10.0, 1.0],
                    vec![3.0, 2.0, 1.0],
                    vec![1.0, 1.0, 0.0],
                ],
                proportion_physical: vec![
                    vec![0.05, 0.9, 0.5],
                    vec![0.9, 0.1, 0.5],
                    vec![0.5, 0.5, 0.0],
                ],
            },
        );
        contact_matrices.insert(FacilityKind::PlayGroup, single(3.0, 0.5));
        for kind in [
            FacilityKind::Communal,
            FacilityKind::FemaleCommunal,
            FacilityKind::DistributionCenter,
            FacilityKind::EVoucher,
            FacilityKind::NonFoodDistributionCenter,
        ] {
            contact_matrices.insert(kind, single(2.0, 0.05));
        }
        contact_matrices.insert(FacilityKind::PumpLatrine, single(1.0, 0.05));
        let betas = contact_matrices
            .keys()
            .copied()
            .chain([FacilityKind::School])
            .map(|kind| (kind, 0.1))
            .collect();
        InteractionParameters {
            alpha_physical: 2.0,
            betas,
            contact_matrices,
            school_xi: 0.3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    pub seed: u64,
    pub max_age: u8,
    pub households: HouseholdParameters,
    pub shelters: ShelterParameters,
    pub schools: SchoolParameters,
    pub learning_centers: LearningCenterParameters,
    pub play_groups: PlayGroupParameters,
    pub care_homes: CareHomeParameters,
    /// Leisure venue kinds to build. Kinds not listed are not built.
    pub leisure: BTreeMap<FacilityKind, LeisureParameters>,
    pub interaction: InteractionParameters,
    /// Length of a shift in days.
    pub time_step: f64,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            seed: 0,
            max_age: 99,
            households: HouseholdParameters::default(),
            shelters: ShelterParameters::default(),
            schools: SchoolParameters::default(),
            learning_centers: LearningCenterParameters::default(),
            play_groups: PlayGroupParameters::default(),
            care_homes: CareHomeParameters::default(),
            leisure: BTreeMap::new(),
            interaction: InteractionParameters::default(),
            time_step: 1.0 / 3.0,
        }
    }
}

fn check(condition: bool, unit: &str, message: &str) -> Result<(), SimError> {
    if condition {
        Ok(())
    } else {
        Err(SimError::configuration(unit, message))
    }
}

fn is_fraction(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

impl Parameters {
    /// Reads parameters from a JSON file.
    ///
    /// # Errors
    ///
    /// I/O and JSON errors, and anything [`Parameters::validate`] rejects.
    pub fn from_file(path: &Path) -> Result<Self, SimError> {
        let parameters: Parameters = serde_json::from_str(&fs::read_to_string(path)?)?;
        parameters.validate()?;
        Ok(parameters)
    }

    /// Checks ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// [`SimError::Configuration`] naming the offending section.
    pub fn validate(&self) -> Result<(), SimError> {
        let households = &self.households;
        check(
            !households.size_distribution.is_empty()
                && households.size_distribution.keys().all(|size| *size > 0)
                && households.size_distribution.values().all(|p| *p >= 0.0)
                && households.size_distribution.values().sum::<f64>() > 0.0,
            "households",
            "size distribution needs positive sizes and non-negative weights",
        )?;
        AgeRange::new(households.adult_min_age, households.adult_max_age).validate("households")?;

        check(
            is_fraction(self.shelters.sharing_ratio),
            "shelters",
            "sharing_ratio must lie in [0, 1]",
        )?;

        check(self.schools.k_candidates > 0, "schools", "k_candidates must be positive")?;
        check(
            self.schools.students_per_teacher > 0.0,
            "schools",
            "students_per_teacher must be positive",
        )?;
        self.schools.mandatory_age_range.validate("schools")?;

        let learning_centers = &self.learning_centers;
        check(
            learning_centers.k_candidates > 0,
            "learning_centers",
            "k_candidates must be positive",
        )?;
        check(
            learning_centers.n_shifts > 0,
            "learning_centers",
            "n_shifts must be positive",
        )?;
        for rate in &learning_centers.enrollment {
            rate.ages.validate("learning_centers")?;
            check(
                is_fraction(rate.rate),
                "learning_centers",
                "enrollment rates must lie in [0, 1]",
            )?;
        }

        let play_groups = &self.play_groups;
        check(
            play_groups.k_candidates > 0,
            "play_groups",
            "k_candidates must be positive",
        )?;
        check(
            play_groups.venues_per_capita >= 0.0,
            "play_groups",
            "venues_per_capita must not be negative",
        )?;
        for band in &play_groups.age_bands {
            band.validate("play_groups")?;
        }

        check(
            self.care_homes.residents_per_worker > 0.0,
            "care_homes",
            "residents_per_worker must be positive",
        )?;
        self.care_homes.worker_ages.validate("care_homes")?;

        for (kind, leisure) in &self.leisure {
            let unit = kind.to_string();
            check(kind.is_leisure(), &unit, "not a leisure venue kind")?;
            check(
                leisure.neighbours_to_consider > 0,
                &unit,
                "neighbours_to_consider must be positive",
            )?;
            check(
                leisure.max_distance_to_area >= 0.0 && leisure.search_radius_km >= 0.0,
                &unit,
                "distances must not be negative",
            )?;
            check(
                leisure.venues_per_capita.is_none_or(|rate| rate >= 0.0),
                &unit,
                "venues_per_capita must not be negative",
            )?;
            leisure.ages.validate(&unit)?;
        }

        check(
            self.interaction.betas.values().all(|beta| *beta >= 0.0),
            "interaction",
            "betas must not be negative",
        )?;
        // Every facility kind needs a beta and a usable contact matrix before anything is built.
        InteractionModel::from_parameters(&self.interaction)?;
        check(
            self.time_step > 0.0 && self.time_step.is_finite(),
            "time_step",
            "time_step must be positive",
        )?;
        Ok(())
    }
}

define_data_plugin!(ParametersPlugin, Option<Parameters>, None);

pub trait ContextParametersExt {
    /// Loads and validates parameters from a JSON file and stores them on the context.
    ///
    /// # Errors
    ///
    /// See [`Parameters::from_file`].
    fn load_parameters(&mut self, path: &Path) -> Result<(), SimError>;

    /// # Errors
    ///
    /// See [`Parameters::validate`].
    fn set_parameters(&mut self, parameters: Parameters) -> Result<(), SimError>;

    /// # Panics
    ///
    /// If no parameters were set.
    fn get_parameters(&self) -> &Parameters;
}

impl ContextParametersExt for Context {
    fn load_parameters(&mut self, path: &Path) -> Result<(), SimError> {
        let parameters = Parameters::from_file(path)?;
        info!("loaded parameters from {}", path.display());
        *self.get_data_container_mut(ParametersPlugin) = Some(parameters);
        Ok(())
    }

    fn set_parameters(&mut self, parameters: Parameters) -> Result<(), SimError> {
        parameters.validate()?;
        *self.get_data_container_mut(ParametersPlugin) = Some(parameters);
        Ok(())
    }

    fn get_parameters(&self) -> &Parameters {
        self.get_data_container(ParametersPlugin)
            .and_then(Option::as_ref)
            .expect("Parameters have not been set")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_are_valid() {
        Parameters::default().validate().unwrap();
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "seed": 42,
                "shelters": {{ "sharing_ratio": 0.5 }},
                "leisure": {{ "pump_latrine": {{ "max_size": 8 }} }},
                "interaction": {{ "alpha_physical": 3.0 }}
            }}"#
        )
        .unwrap();
        let mut context = Context::new();
        context.load_parameters(file.path()).unwrap();
        let parameters = context.get_parameters();
        assert_eq!(parameters.seed, 42);
        assert_eq!(parameters.shelters.sharing_ratio, 0.5);
        assert_eq!(parameters.shelters.max_visits, 3);
        assert_eq!(parameters.max_age, 99);
        assert_eq!(parameters.leisure[&FacilityKind::PumpLatrine].max_size, 8);
        assert_eq!(parameters.interaction.alpha_physical, 3.0);
        assert_eq!(
            parameters.interaction,
            InteractionParameters {
                alpha_physical: 3.0,
                ..InteractionParameters::default()
            }
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut parameters = Parameters::default();
        parameters.shelters.sharing_ratio = 1.5;
        assert!(matches!(
            parameters.validate(),
            Err(SimError::Configuration { unit, .. }) if unit == "shelters"
        ));

        let mut parameters = Parameters::default();
        parameters.schools.k_candidates = 0;
        assert!(parameters.validate().is_err());

        let mut parameters = Parameters::default();
        parameters.play_groups.age_bands = vec![AgeRange::new(9, 3)];
        assert!(parameters.validate().is_err());

        let mut parameters = Parameters::default();
        parameters
            .leisure
            .insert(FacilityKind::School, LeisureParameters::default());
        assert!(parameters.validate().is_err());

        let mut context = Context::new();
        let mut parameters = Parameters::default();
        parameters.time_step = 0.0;
        assert!(context.set_parameters(parameters).is_err());
    }

    #[test]
    fn incomplete_interaction_fails_at_load() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "interaction": {{ "betas": {{ "shelter": 0.2 }}, "contact_matrices": {{}} }} }}"#
        )
        .unwrap();
        let result = Parameters::from_file(file.path());
        assert!(matches!(
            result,
            Err(SimError::Configuration { unit, message })
                if unit == "interaction" && message.contains("no beta")
        ));

        let mut parameters = Parameters::default();
        parameters
            .interaction
            .contact_matrices
            .remove(&FacilityKind::PumpLatrine);
        let mut context = Context::new();
        assert!(matches!(
            context.set_parameters(parameters),
            Err(SimError::Configuration { message, .. }) if message.contains("pump_latrine")
        ));
    }

    #[test]
    fn unknown_file_is_an_io_error() {
        let result = Parameters::from_file(Path::new("/nonexistent/parameters.json"));
        assert!(matches!(result, Err(SimError::IoError(_))));
    }

    #[test]
    #[should_panic(expected = "Parameters have not been set")]
    fn get_before_set() {
        let context = Context::new();
        context.get_parameters();
    }

    #[test]
    fn enrollment_lookup() {
        let parameters = LearningCenterParameters::default();
        assert_eq!(parameters.enrollment_rate(Sex::Female, 10), 0.6);
        assert_eq!(parameters.enrollment_rate(Sex::Male, 30), 0.0);
    }
}

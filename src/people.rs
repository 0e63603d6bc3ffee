//! People and their health state.
//!
//! A [`Person`] refers to the facilities it belongs to by [`SubgroupRef`]; facilities list their
//! members by [`PersonId`]. Neither side owns the other: both live in the [`crate::world::World`]
//! registry.
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, EnumIter};
use synthpop_geo::AreaId;

use crate::facility::SubgroupRef;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct PersonId(pub u32);

impl PersonId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for PersonId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "person#{}", self.0)
    }
}

#[derive(
    Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize, StrumDisplay, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Sex {
    Female,
    Male,
}

#[derive(
    Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Serialize, Deserialize, StrumDisplay, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Susceptible,
    Infected,
    Recovered,
    Dead,
}

/// The infection-relevant part of a person. Only the transmission step and the infection
/// selector write to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub status: HealthStatus,
    /// Current infectiousness. Zero unless infected.
    pub transmission_probability: f64,
    /// Multiplier on the infection probability of a susceptible person.
    pub susceptibility: f64,
    pub infector: Option<PersonId>,
    pub infection_time: Option<f64>,
}

impl Default for Health {
    fn default() -> Self {
        Health {
            status: HealthStatus::Susceptible,
            transmission_probability: 0.0,
            susceptibility: 1.0,
            infector: None,
            infection_time: None,
        }
    }
}

impl Health {
    #[must_use]
    pub fn is_infected(&self) -> bool {
        self.status == HealthStatus::Infected
    }

    #[must_use]
    pub fn is_susceptible(&self) -> bool {
        self.status == HealthStatus::Susceptible
    }

    pub fn infect(&mut self, infector: Option<PersonId>, time: f64, transmission_probability: f64) {
        self.status = HealthStatus::Infected;
        self.infector = infector;
        self.infection_time = Some(time);
        self.transmission_probability = transmission_probability;
    }

    pub fn recover(&mut self) {
        self.status = HealthStatus::Recovered;
        self.transmission_probability = 0.0;
    }
}

/// Which slot of a person a facility membership fills.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize, StrumDisplay)]
#[strum(serialize_all = "snake_case")]
pub enum Activity {
    Residence,
    PrimaryActivity,
    Leisure,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub age: u8,
    pub sex: Sex,
    pub area: AreaId,
    pub residence: Option<SubgroupRef>,
    pub primary_activity: Option<SubgroupRef>,
    pub leisure: Vec<SubgroupRef>,
    pub health: Health,
}

impl Person {
    #[must_use]
    pub fn new(id: PersonId, age: u8, sex: Sex, area: AreaId) -> Self {
        Person {
            id,
            age,
            sex,
            area,
            residence: None,
            primary_activity: None,
            leisure: Vec::new(),
            health: Health::default(),
        }
    }
}

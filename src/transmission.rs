//! The contact-based infection kernel, run once per active group per shift.
//!
//! For an active group with present subgroups `0..n`:
//!
//! 1. the pressure of subgroup `i` is the summed transmission probability of its infected
//!    members, divided by the number of people present (at least one),
//! 2. each ordered pair `(i, j)` of occupied subgroups, `(i, i)` included, is visited once:
//!    infected in `i` expose the susceptible in `j`,
//! 3. a susceptible person is infected with probability
//!    `1 - exp(-dt * susceptibility * beta * contacts * (1 + (alpha - 1) * physical) * pressure)`,
//!    one uniform draw per person, and no draws at all when the pressure is zero,
//! 4. the infector of record is drawn from the infected of `i`, weighted by their transmission
//!    probability.
//!
//! Contact tables are indexed `[recipient][infector]`. Schools derive theirs: among students,
//! contacts and physical fraction decay as `xi^|i - j|` from the student-student entries, while
//! rows and columns involving teachers are read from the 2x2 table.
use std::collections::BTreeMap;

use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::activity::ActiveGroup;
use crate::error::SimError;
use crate::facility::{FacilityId, FacilityKind, TEACHERS};
use crate::log::trace;
use crate::parameters::{ContactMatrixParameters, InteractionParameters};
use crate::people::{Person, PersonId};
use crate::world::World;

/// Intensity and physical fraction used for subgroup pairs outside a table.
pub const NEUTRAL_CONTACT: (f64, f64) = (1.0, 0.0);

#[derive(Clone, Debug, PartialEq)]
pub struct ContactMatrix {
    contacts: Vec<Vec<f64>>,
    physical: Vec<Vec<f64>>,
}

impl ContactMatrix {
    /// # Errors
    ///
    /// [`SimError::Configuration`] if the two tables differ in shape or are not square.
    pub fn new(kind: FacilityKind, parameters: &ContactMatrixParameters) -> Result<Self, SimError> {
        let n = parameters.contacts.len();
        let square =
            |table: &Vec<Vec<f64>>| table.len() == n && table.iter().all(|row| row.len() == n);
        if n == 0 || !square(&parameters.contacts) || !square(&parameters.proportion_physical) {
            return Err(SimError::configuration(
                "interaction",
                format!("contact matrix of {kind} is not square or its tables differ in shape"),
            ));
        }
        Ok(ContactMatrix {
            contacts: parameters.contacts.clone(),
            physical: parameters.proportion_physical.clone(),
        })
    }

    /// `(contacts, physical fraction)` of a recipient with an infector.
    #[must_use]
    pub fn get(&self, infector: usize, recipient: usize) -> (f64, f64) {
        match (
            self.contacts.get(recipient).and_then(|row| row.get(infector)),
            self.physical.get(recipient).and_then(|row| row.get(infector)),
        ) {
            (Some(contacts), Some(physical)) => (*contacts, *physical),
            _ => NEUTRAL_CONTACT,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}

/// Teacher / student table used when schools have none configured.
fn default_school_matrix() -> ContactMatrix {
    ContactMatrix {
        contacts: vec![vec![5.25, 15.6], vec![0.81, 2.5]],
        physical: vec![vec![0.05, 0.08], vec![0.08, 0.15]],
    }
}

#[derive(Clone, Debug, PartialEq)]
enum KindContacts {
    Table(ContactMatrix),
    School { table: ContactMatrix, xi: f64 },
}

impl KindContacts {
    fn get(&self, infector: usize, recipient: usize) -> (f64, f64) {
        match self {
            KindContacts::Table(table) => table.get(infector, recipient),
            KindContacts::School { table, xi } => {
                let teacher = |subgroup: usize| subgroup == TEACHERS;
                match (teacher(infector), teacher(recipient)) {
                    (false, false) => {
                        let (contacts, physical) = table.get(1, 1);
                        let decay = xi.powi(infector.abs_diff(recipient) as i32);
                        (contacts * decay, physical * decay)
                    }
                    (true, false) => table.get(TEACHERS, 1),
                    (false, true) => table.get(1, TEACHERS),
                    (true, true) => table.get(TEACHERS, TEACHERS),
                }
            }
        }
    }
}

/// Infectiousness of the newly infected. The symptom and severity model lives behind this.
pub trait InfectionSelector {
    fn transmission_probability(&self, person: &Person, time: f64) -> f64;
}

/// Every infected person is equally infectious for as long as they are infected.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstantInfectiousness(pub f64);

impl Default for ConstantInfectiousness {
    fn default() -> Self {
        ConstantInfectiousness(1.0)
    }
}

impl InfectionSelector for ConstantInfectiousness {
    fn transmission_probability(&self, _person: &Person, _time: f64) -> f64 {
        self.0
    }
}

/// One infection caused by the kernel.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Infection {
    pub facility: FacilityId,
    pub kind: FacilityKind,
    pub infector: Option<PersonId>,
    pub infector_subgroup: usize,
    pub infectee: PersonId,
    pub infectee_subgroup: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InteractionModel {
    alpha_physical: f64,
    betas: BTreeMap<FacilityKind, f64>,
    contacts: BTreeMap<FacilityKind, KindContacts>,
}

impl InteractionModel {
    /// Every facility kind needs a beta and, except schools, a contact matrix.
    ///
    /// # Errors
    ///
    /// [`SimError::Configuration`] for a kind without a beta or a matrix, or a malformed matrix.
    pub fn from_parameters(parameters: &InteractionParameters) -> Result<Self, SimError> {
        let mut betas = BTreeMap::new();
        let mut contacts = BTreeMap::new();
        for kind in FacilityKind::iter() {
            let Some(beta) = parameters.betas.get(&kind) else {
                return Err(SimError::configuration(
                    "interaction",
                    format!("no beta for {kind}"),
                ));
            };
            betas.insert(kind, *beta);
            let table = parameters
                .contact_matrices
                .get(&kind)
                .map(|matrix| ContactMatrix::new(kind, matrix))
                .transpose()?;
            let entry = match (kind, table) {
                (FacilityKind::School, table) => KindContacts::School {
                    table: table.unwrap_or_else(default_school_matrix),
                    xi: parameters.school_xi,
                },
                (_, Some(table)) => KindContacts::Table(table),
                (_, None) => {
                    return Err(SimError::configuration(
                        "interaction",
                        format!("no contact matrix for {kind}"),
                    ));
                }
            };
            contacts.insert(kind, entry);
        }
        Ok(InteractionModel {
            alpha_physical: parameters.alpha_physical,
            betas,
            contacts,
        })
    }

    /// `beta * contacts * (1 + (alpha - 1) * physical)` for infectors in `infector` and
    /// recipients in `recipient`.
    #[must_use]
    pub fn intensity(&self, kind: FacilityKind, infector: usize, recipient: usize) -> f64 {
        let beta = self.betas.get(&kind).copied().unwrap_or(0.0);
        let (contacts, physical) = self
            .contacts
            .get(&kind)
            .map_or(NEUTRAL_CONTACT, |table| table.get(infector, recipient));
        beta * contacts * (1.0 + (self.alpha_physical - 1.0) * physical)
    }

    /// Runs the kernel over one active group, infecting people in `world`.
    pub fn time_step_for_group<R: Rng>(
        &self,
        world: &mut World,
        group: &ActiveGroup,
        time: f64,
        delta_time: f64,
        rng: &mut R,
        selector: &dyn InfectionSelector,
    ) -> Vec<Infection> {
        let norm = 1.0 / group.size().max(1) as f64;
        let mut pressure = vec![0.0; group.subgroups.len()];
        let mut infectors: Vec<Vec<(PersonId, f64)>> = vec![Vec::new(); group.subgroups.len()];
        for (i, present) in group.subgroups.iter().enumerate() {
            for id in present {
                let health = &world.person(*id).health;
                if health.is_infected() && health.transmission_probability > 0.0 {
                    pressure[i] += health.transmission_probability * norm;
                    infectors[i].push((*id, health.transmission_probability));
                }
            }
        }

        let occupied: Vec<usize> = (0..group.subgroups.len())
            .filter(|i| !group.subgroups[*i].is_empty())
            .collect();
        let mut infections = Vec::new();
        for (position, &i) in occupied.iter().enumerate() {
            for &j in &occupied[position..] {
                let pairs = if i == j { vec![(i, i)] } else { vec![(i, j), (j, i)] };
                for pair in pairs {
                    self.contaminate(
                        world,
                        group,
                        &pressure,
                        &infectors,
                        pair,
                        (time, delta_time),
                        rng,
                        selector,
                        &mut infections,
                    );
                }
            }
        }
        infections
    }

    #[allow(clippy::too_many_arguments)]
    fn contaminate<R: Rng>(
        &self,
        world: &mut World,
        group: &ActiveGroup,
        pressure: &[f64],
        infectors: &[Vec<(PersonId, f64)>],
        (infector_subgroup, recipient_subgroup): (usize, usize),
        (time, delta_time): (f64, f64),
        rng: &mut R,
        selector: &dyn InfectionSelector,
        infections: &mut Vec<Infection>,
    ) {
        let pressure = pressure[infector_subgroup];
        if pressure <= 0.0 {
            return;
        }
        let exposure = self.intensity(group.kind, infector_subgroup, recipient_subgroup) * pressure;
        for &recipient in &group.subgroups[recipient_subgroup] {
            let person = world.person(recipient);
            if !person.health.is_susceptible() {
                continue;
            }
            let probability =
                1.0 - (-delta_time * person.health.susceptibility * exposure).exp();
            if rng.random::<f64>() >= probability {
                continue;
            }
            let candidates = &infectors[infector_subgroup];
            let infector = WeightedIndex::new(candidates.iter().map(|(_, weight)| *weight))
                .ok()
                .map(|weights| candidates[weights.sample(rng)].0);
            let transmission_probability = selector.transmission_probability(person, time);
            trace!(
                "{recipient} infected in {} by {infector:?} (p={probability:.4})",
                group.facility
            );
            world
                .person_mut(recipient)
                .health
                .infect(infector, time, transmission_probability);
            infections.push(Infection {
                facility: group.facility,
                kind: group.kind,
                infector,
                infector_subgroup,
                infectee: recipient,
                infectee_subgroup: recipient_subgroup,
            });
        }
    }
}

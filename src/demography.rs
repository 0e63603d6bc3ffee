//! Per-area age and sex sampling.
//!
//! An [`AgeSexGenerator`] repeats every age exactly as often as the area's age histogram says and
//! then shuffles the result, so the age distribution of an area is exact rather than statistically
//! close. Sex is drawn per person from the female fraction of the person's age bin.
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use synthpop_geo::AreaId;

use crate::error::SimError;
use crate::log::{info, trace};
use crate::people::{PersonId, Sex};
use crate::world::World;

/// Female fraction per age bin. Bins are given by their lower edges, in increasing order; the
/// last bin is open ended. Ages below the first edge fall in the first bin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SexBins {
    pub lower_edges: Vec<u16>,
    pub female_fractions: Vec<f64>,
}

impl SexBins {
    /// A single bin covering every age.
    #[must_use]
    pub fn uniform(female_fraction: f64) -> Self {
        SexBins {
            lower_edges: vec![0],
            female_fractions: vec![female_fraction],
        }
    }

    #[must_use]
    pub fn female_fraction(&self, age: u16) -> f64 {
        let bin = self
            .lower_edges
            .iter()
            .take_while(|edge| **edge <= age)
            .count()
            .saturating_sub(1);
        self.female_fractions[bin]
    }

    fn validate(&self, area: &str) -> Result<(), SimError> {
        if self.lower_edges.is_empty() || self.lower_edges.len() != self.female_fractions.len() {
            return Err(SimError::configuration(
                area,
                "sex bins need one female fraction per lower edge",
            ));
        }
        if self.lower_edges.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(SimError::configuration(area, "sex bin edges must increase"));
        }
        if self
            .female_fractions
            .iter()
            .any(|f| !(0.0..=1.0).contains(f))
        {
            return Err(SimError::configuration(
                area,
                "female fractions must lie in [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Census input for one area: `age_counts[age]` people of each age.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AreaDemography {
    pub area: String,
    pub age_counts: Vec<u32>,
    pub sex_bins: SexBins,
}

/// A finite stream of `(age, sex)` draws for one area. Owns its generator; nothing is shared
/// between areas.
pub struct AgeSexGenerator<R> {
    area: String,
    ages: Vec<u16>,
    next: usize,
    sex_bins: SexBins,
    max_age: u8,
    rng: R,
}

impl<R: Rng> AgeSexGenerator<R> {
    /// # Errors
    ///
    /// [`SimError::Configuration`] if the sex bins are malformed.
    pub fn new(demography: &AreaDemography, max_age: u8, mut rng: R) -> Result<Self, SimError> {
        demography.sex_bins.validate(&demography.area)?;
        let mut ages: Vec<u16> = demography
            .age_counts
            .iter()
            .enumerate()
            .flat_map(|(age, count)| std::iter::repeat_n(age as u16, *count as usize))
            .collect();
        ages.shuffle(&mut rng);
        Ok(AgeSexGenerator {
            area: demography.area.clone(),
            ages,
            next: 0,
            sex_bins: demography.sex_bins.clone(),
            max_age,
            rng,
        })
    }

    /// Number of people the histogram describes.
    #[must_use]
    pub fn n_residents(&self) -> usize {
        self.ages.len()
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.ages.len() - self.next
    }

    /// The next person's age, capped at `max_age`, and sex.
    ///
    /// # Errors
    ///
    /// [`SimError::PopulationExhausted`] once every histogram entry has been drawn.
    pub fn draw(&mut self) -> Result<(u8, Sex), SimError> {
        let Some(&age) = self.ages.get(self.next) else {
            return Err(SimError::PopulationExhausted {
                area: self.area.clone(),
            });
        };
        self.next += 1;
        let female_fraction = self.sex_bins.female_fraction(age);
        let sex = if self.rng.random::<f64>() < female_fraction {
            Sex::Female
        } else {
            Sex::Male
        };
        let age = u8::try_from(age).unwrap_or(u8::MAX).min(self.max_age);
        trace!("{}: drew age {age} sex {sex}", self.area);
        Ok((age, sex))
    }
}

/// Creates every person of an area's histogram as a resident of `area`.
///
/// # Errors
///
/// Propagates [`SimError::PopulationExhausted`] from the generator.
pub fn populate_area<R: Rng>(
    world: &mut World,
    area: AreaId,
    generator: &mut AgeSexGenerator<R>,
) -> Result<Vec<PersonId>, SimError> {
    let mut people = Vec::with_capacity(generator.n_residents());
    for _ in 0..generator.n_residents() {
        let (age, sex) = generator.draw()?;
        people.push(world.add_person(age, sex, area));
    }
    info!("{}: {} residents", world.geography().area(area).name, people.len());
    Ok(people)
}

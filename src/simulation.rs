//! The shift loop: barrier, active groups, transmission, infection report.
use serde::{Deserialize, Serialize};

use crate::activity::{ActiveGroup, ActivitySource, Shift};
use crate::context::Context;
use crate::create_report_trait;
use crate::define_rng;
use crate::error::SimError;
use crate::log::{debug, info};
use crate::partition::{exchange, Partition};
use crate::random::ContextRandomExt;
use crate::report::ContextReportExt;
use crate::transmission::{Infection, InfectionSelector, InteractionModel};
use crate::world::World;

define_rng!(TransmissionRng);

/// One row per infection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InfectionReport {
    pub time: f64,
    pub shift: u32,
    pub facility: u32,
    pub kind: String,
    pub infector_subgroup: usize,
    pub infectee_subgroup: usize,
    pub infector: Option<u32>,
    pub infectee: u32,
}

create_report_trait!(InfectionReport);

impl InfectionReport {
    fn new(shift: &Shift, infection: &Infection) -> Self {
        InfectionReport {
            time: shift.start_time,
            shift: shift.index,
            facility: infection.facility.0,
            kind: infection.kind.to_string(),
            infector_subgroup: infection.infector_subgroup,
            infectee_subgroup: infection.infectee_subgroup,
            infector: infection.infector.map(|id| id.0),
            infectee: infection.infectee.0,
        }
    }
}

pub struct Simulator {
    model: InteractionModel,
    selector: Box<dyn InfectionSelector>,
}

impl Simulator {
    #[must_use]
    pub fn new(model: InteractionModel, selector: Box<dyn InfectionSelector>) -> Self {
        Simulator { model, selector }
    }

    fn transmit(
        &self,
        context: &mut Context,
        shift: &Shift,
        groups: &[ActiveGroup],
    ) -> Result<Vec<Infection>, SimError> {
        context.set_current_time(shift.start_time);
        let mut infections = Vec::new();
        {
            let (world, mut rng) = context.world_and_rng(TransmissionRng);
            for group in groups {
                infections.extend(self.model.time_step_for_group(
                    world,
                    group,
                    shift.start_time,
                    shift.duration,
                    &mut *rng,
                    self.selector.as_ref(),
                ));
            }
        }
        if context.has_report::<InfectionReport>() {
            for infection in &infections {
                context.send_report(InfectionReport::new(shift, infection))?;
            }
        }
        debug!(
            "shift {}: {} groups, {} infections",
            shift.index,
            groups.len(),
            infections.len()
        );
        Ok(infections)
    }

    /// Runs the transmission step over every group `source` reports active during `shift`.
    ///
    /// # Errors
    ///
    /// If an infection report row cannot be written.
    ///
    /// # Panics
    ///
    /// If the random module was not initialized, or `shift` starts before the current time.
    pub fn run_shift(
        &self,
        context: &mut Context,
        shift: &Shift,
        source: &mut dyn ActivitySource,
    ) -> Result<Vec<Infection>, SimError> {
        let groups = source.active_groups(context.world(), shift);
        self.transmit(context, shift, &groups)
    }

    /// Runs `shifts` in order. `barrier` is called with the world before each shift starts, so
    /// state exchanged there is never older than one shift. Returns the number of infections.
    ///
    /// # Errors
    ///
    /// If an infection report row cannot be written.
    pub fn run_shifts(
        &self,
        context: &mut Context,
        shifts: impl IntoIterator<Item = Shift>,
        source: &mut dyn ActivitySource,
        barrier: &mut dyn FnMut(&mut World),
    ) -> Result<usize, SimError> {
        let mut total = 0;
        for shift in shifts {
            barrier(context.world_mut());
            total += self.run_shift(context, &shift, source)?.len();
        }
        info!("{total} infections");
        Ok(total)
    }

    /// Runs `shifts` over partitions holding replicas of the same world. Each partition runs
    /// the groups located in its super areas, then all of them meet at the barrier before the
    /// next shift. Returns the number of infections.
    ///
    /// # Errors
    ///
    /// If an infection report row cannot be written.
    pub fn run_partitioned(
        &self,
        partitions: &mut [(Partition, Context)],
        shifts: impl IntoIterator<Item = Shift>,
        source: &mut dyn ActivitySource,
    ) -> Result<usize, SimError> {
        for (partition, context) in partitions.iter_mut() {
            partition.find_crossing(context.world());
        }
        let mut total = 0;
        for shift in shifts {
            for (partition, context) in partitions.iter_mut() {
                let groups = source.active_groups(context.world(), &shift);
                let groups = partition.local_groups(context.world(), groups);
                total += self.transmit(context, &shift, &groups)?.len();
            }
            let mut states: Vec<(&mut Partition, &mut World)> = partitions
                .iter_mut()
                .map(|(partition, context)| (partition, context.world_mut()))
                .collect();
            let applied = exchange(&mut states);
            debug!("shift {}: {applied} ghost updates applied", shift.index);
        }
        info!("{total} infections over {} partitions", partitions.len());
        Ok(total)
    }
}

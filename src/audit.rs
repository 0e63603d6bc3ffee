//! Counters of everything a world build did not do the preferred way.
//!
//! Overflow placements, residual placements and people nobody could place are expected outcomes
//! of the distribution policies, not errors, but a build that did not place everyone must say so.
//! Each distributor records its events here; [`BuildAudit::summary`] is logged at the end of a
//! build and [`BuildAudit::send_reports`] writes one [`BuildAuditReport`] row per counter.
use std::collections::BTreeMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, EnumIter};

use crate::context::Context;
use crate::create_report_trait;
use crate::error::SimError;
use crate::facility::FacilityKind;
use crate::report::ContextReportExt;

#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, StrumDisplay, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum AuditEvent {
    /// Placed in a facility that was already at capacity.
    Overflow,
    /// Left over after proportional allocation and placed in a random facility of the area.
    ResidualPlacement,
    /// Eligible but deliberately not placed (non-mandatory age with no room, not enrolled).
    Skipped,
    /// Could not be placed at all.
    Unplaced,
    /// An empty household offered to a shelter.
    EmptyHousehold,
    /// A household rejected by a shelter whose slots were taken.
    ShelterFull,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedUnit {
    /// The area or super area whose build was aborted.
    pub unit: String,
    /// Build stage, e.g. `"schools"`.
    pub stage: String,
    pub error: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildAudit {
    counts: BTreeMap<(AuditEvent, FacilityKind), usize>,
    failures: Vec<FailedUnit>,
}

/// One row of the build audit report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuildAuditReport {
    pub event: String,
    /// Facility kind for counters, build stage for failed units.
    pub facility_kind: String,
    pub count: usize,
    pub detail: String,
}

create_report_trait!(BuildAuditReport);

impl BuildAudit {
    pub fn record(&mut self, event: AuditEvent, kind: FacilityKind) {
        self.record_n(event, kind, 1);
    }

    pub fn record_n(&mut self, event: AuditEvent, kind: FacilityKind, n: usize) {
        if n > 0 {
            *self.counts.entry((event, kind)).or_default() += n;
        }
    }

    pub fn record_failure(&mut self, unit: &str, stage: &str, error: &SimError) {
        self.failures.push(FailedUnit {
            unit: unit.to_string(),
            stage: stage.to_string(),
            error: error.to_string(),
        });
    }

    #[must_use]
    pub fn count(&self, event: AuditEvent, kind: FacilityKind) -> usize {
        self.counts.get(&(event, kind)).copied().unwrap_or(0)
    }

    /// Count of an event over all facility kinds.
    #[must_use]
    pub fn total(&self, event: AuditEvent) -> usize {
        self.counts
            .iter()
            .filter(|((e, _), _)| *e == event)
            .map(|(_, n)| n)
            .sum()
    }

    #[must_use]
    pub fn failures(&self) -> &[FailedUnit] {
        &self.failures
    }

    /// No fallback of any kind was needed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.counts.is_empty() && self.failures.is_empty()
    }

    pub fn merge(&mut self, other: BuildAudit) {
        for ((event, kind), n) in other.counts {
            self.record_n(event, kind, n);
        }
        self.failures.extend(other.failures);
    }

    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_clean() {
            return "build audit: no fallbacks".to_string();
        }
        let mut summary = String::from("build audit:");
        for ((event, kind), n) in &self.counts {
            let _ = write!(summary, " {event}[{kind}]={n}");
        }
        if !self.failures.is_empty() {
            let _ = write!(summary, " failed_units={}", self.failures.len());
        }
        summary
    }

    /// Writes the audit through the [`BuildAuditReport`] writer registered on `context`.
    ///
    /// # Errors
    ///
    /// If no writer was added for [`BuildAuditReport`] or writing fails.
    pub fn send_reports(&self, context: &Context) -> Result<(), SimError> {
        for ((event, kind), n) in &self.counts {
            context.send_report(BuildAuditReport {
                event: event.to_string(),
                facility_kind: kind.to_string(),
                count: *n,
                detail: String::new(),
            })?;
        }
        for failure in &self.failures {
            context.send_report(BuildAuditReport {
                event: "failed_unit".to_string(),
                facility_kind: failure.stage.clone(),
                count: 1,
                detail: format!("{}: {}", failure.unit, failure.error),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn counters() {
        let mut audit = BuildAudit::default();
        assert!(audit.is_clean());
        audit.record(AuditEvent::Overflow, FacilityKind::School);
        audit.record(AuditEvent::Overflow, FacilityKind::School);
        audit.record(AuditEvent::Overflow, FacilityKind::Household);
        audit.record_n(AuditEvent::Skipped, FacilityKind::School, 0);
        assert_eq!(audit.count(AuditEvent::Overflow, FacilityKind::School), 2);
        assert_eq!(audit.total(AuditEvent::Overflow), 3);
        assert_eq!(audit.total(AuditEvent::Skipped), 0);
        assert!(!audit.is_clean());
        assert_eq!(
            audit.summary(),
            "build audit: overflow[household]=1 overflow[school]=2"
        );
    }

    #[test]
    fn merge_and_failures() {
        let mut audit = BuildAudit::default();
        let mut other = BuildAudit::default();
        other.record(AuditEvent::Unplaced, FacilityKind::Shelter);
        other.record_failure(
            "a1",
            "schools",
            &SimError::configuration("a1", "no schools"),
        );
        audit.merge(other);
        assert_eq!(audit.total(AuditEvent::Unplaced), 1);
        assert_eq!(audit.failures().len(), 1);
        assert_eq!(audit.failures()[0].stage, "schools");
        assert!(audit.summary().ends_with("failed_units=1"));
    }

    #[test]
    fn report_rows() {
        let mut context = Context::new();
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.csv");
        context
            .add_report::<BuildAuditReport>(path.to_str().unwrap())
            .unwrap();
        let mut audit = BuildAudit::default();
        audit.record_n(AuditEvent::ResidualPlacement, FacilityKind::CareHome, 3);
        audit.record_failure("s1", "care_homes", &SimError::from("boom"));
        audit.send_reports(&context).unwrap();

        let mut reader = csv::Reader::from_path(path).unwrap();
        let rows: Vec<BuildAuditReport> = reader.deserialize().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].event, "residual_placement");
        assert_eq!(rows[0].facility_kind, "care_home");
        assert_eq!(rows[0].count, 3);
        assert_eq!(rows[1].detail, "s1: boom");
    }
}

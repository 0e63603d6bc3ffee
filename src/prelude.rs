pub use crate::activity::{ActiveGroup, ActivitySource, ScheduledActivities, Shift};
pub use crate::audit::{AuditEvent, BuildAudit};
pub use crate::builder::{WorldBuilder, WorldInputs};
pub use crate::context::Context;
pub use crate::error::SimError;
pub use crate::facility::{FacilityId, FacilityKind, SubgroupRef};
pub use crate::log::{debug, error, info, trace, warn};
pub use crate::parameters::{ContextParametersExt, Parameters};
pub use crate::partition::Partition;
pub use crate::people::{Activity, HealthStatus, PersonId, Sex};
pub use crate::random::ContextRandomExt;
pub use crate::report::ContextReportExt;
pub use crate::simulation::{InfectionReport, Simulator};
pub use crate::transmission::{ConstantInfectiousness, InfectionSelector, InteractionModel};
pub use crate::world::World;
pub use crate::{create_report_trait, define_data_plugin, define_rng};
pub use synthpop_geo::{AreaId, Coordinates, SuperAreaId};

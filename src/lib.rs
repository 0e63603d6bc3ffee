//! Synthetic populations and contact-based transmission for agent-based epidemic models.
//!
//! A synthetic population is built once from census inputs: people are generated per area from
//! age and sex histograms, then seated in households, shelters, schools, learning centers, play
//! groups, care homes and leisure venues by a family of distributors that all share the same
//! capacity and overflow rules. The result is a [`World`](crate::world::World), a registry of
//! people and facilities indexed by dense ids, which can be written to and read back from a
//! binary snapshot.
//!
//! The central object of a simulation is the [`Context`](crate::context::Context). It owns the
//! world and holds module-specific data in data plugins, so that modules can rely on it for
//! core services such as:
//! * Maintaining a notion of time for the simulation
//! * Independent, reproducible random number streams
//! * Parameters loaded from JSON
//! * CSV reports of build audits and infection events
//!
//! A simulation run consists of a sequence of shifts. For each shift an
//! [`ActivitySource`](crate::activity::ActivitySource) says which facilities are in session and
//! who is present, and the [`InteractionModel`](crate::transmission::InteractionModel) decides
//! who becomes infected in each active group. Worlds split into
//! [`Partition`](crate::partition::Partition)s exchange the infection state of people who cross
//! partitions at every shift boundary.
pub mod activity;
pub mod audit;
pub mod builder;
pub mod context;
pub mod demography;
pub mod distributors;
pub mod error;
pub mod facility;
pub mod hashing;
pub mod log;
pub mod parameters;
pub mod partition;
pub mod people;
pub mod prelude;
pub mod random;
pub mod report;
pub mod simulation;
pub mod snapshot;
pub mod transmission;
pub mod world;

// Re-exported for use in macros and by downstream models.
pub use paste;
pub use rand;
pub use synthpop_geo;

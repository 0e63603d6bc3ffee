//! Build-time assignment of people to facilities.
//!
//! [`venue`] holds the capacity / age / proximity algorithm every facility kind shares; the
//! other modules apply it with the role splitting and facility generation of their kind.
pub mod care_home;
pub mod household;
pub mod learning_center;
pub mod leisure;
pub mod play_group;
pub mod school;
pub mod shelter;
pub mod venue;

pub use care_home::{CareHomeDistributor, CommunalBand};
pub use household::HouseholdDistributor;
pub use learning_center::LearningCenterDistributor;
pub use school::{SchoolDistributor, SchoolIndex, SchoolSite};
pub use shelter::{add_household_to_shelter, shelters_for_area, ShelterDistributor};
pub use venue::{choose_facility, OverflowPolicy, Placement, VenueDistributor};

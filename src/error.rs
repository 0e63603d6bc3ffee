use std::fmt::{self, Debug, Display};
use std::io;

use synthpop_geo::GeoError;

/// Provides `SimError` and maps other errors to convert to a `SimError`.
///
/// Construction errors name the build unit they abort (an area or super area). Per person
/// anomalies never surface here: they are recovered by the distributors and counted in the
/// [`crate::audit::BuildAudit`].
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum SimError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CSVError(csv::Error),
    EncodeError(bincode::error::EncodeError),
    DecodeError(bincode::error::DecodeError),
    Geography(GeoError),
    /// Missing or inconsistent configuration for a build unit, e.g. an area with no facilities
    /// of a kind it needs, or a facility kind without a contact matrix.
    Configuration { unit: String, message: String },
    /// An area's age histogram ran out before every person was drawn.
    PopulationExhausted { area: String },
    /// An empty household was offered to a shelter.
    EmptyHousehold { household: String },
    /// Both household slots of a shelter are taken.
    ShelterFull { shelter: String },
    /// A snapshot could not be reconstructed.
    Snapshot(String),
    ReportError(String),
    SimError(String),
}

impl SimError {
    pub fn configuration(unit: impl Display, message: impl Display) -> Self {
        SimError::Configuration {
            unit: unit.to_string(),
            message: message.to_string(),
        }
    }
}

impl From<io::Error> for SimError {
    fn from(error: io::Error) -> Self {
        SimError::IoError(error)
    }
}

impl From<serde_json::Error> for SimError {
    fn from(error: serde_json::Error) -> Self {
        SimError::JsonError(error)
    }
}

impl From<csv::Error> for SimError {
    fn from(error: csv::Error) -> Self {
        SimError::CSVError(error)
    }
}

impl From<bincode::error::EncodeError> for SimError {
    fn from(error: bincode::error::EncodeError) -> Self {
        SimError::EncodeError(error)
    }
}

impl From<bincode::error::DecodeError> for SimError {
    fn from(error: bincode::error::DecodeError) -> Self {
        SimError::DecodeError(error)
    }
}

impl From<GeoError> for SimError {
    fn from(error: GeoError) -> Self {
        SimError::Geography(error)
    }
}

impl From<String> for SimError {
    fn from(error: String) -> Self {
        SimError::SimError(error)
    }
}

impl From<&str> for SimError {
    fn from(error: &str) -> Self {
        SimError::SimError(error.to_string())
    }
}

impl std::error::Error for SimError {}

impl Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SimError::Configuration { unit, message } => {
                write!(f, "configuration error in {unit}: {message}")
            }
            SimError::PopulationExhausted { area } => {
                write!(f, "no more people to draw in area {area}")
            }
            SimError::EmptyHousehold { household } => {
                write!(f, "household {household} has no members")
            }
            SimError::ShelterFull { shelter } => write!(f, "shelter {shelter} is full"),
            SimError::Snapshot(message) => write!(f, "invalid snapshot: {message}"),
            SimError::Geography(error) => write!(f, "geography error: {error}"),
            SimError::ReportError(message) | SimError::SimError(message) => {
                write!(f, "{message}")
            }
            _ => write!(f, "Error: {self:?}"),
        }
    }
}

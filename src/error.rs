use crate::orchestration::validator::ValidationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Plan rejected after {rounds} planning rounds ({} errors)", errors.len())]
    PlanRejected {
        rounds: u32,
        errors: Vec<ValidationError>,
    },

    #[error("Plan generator error: {0}")]
    PlanGenerator(String),

    #[error("No eligible worker for role {role} and no default worker configured")]
    NoWorkerAvailable { role: String },

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Context provider error: {0}")]
    Context(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

pub type Result<T> = std::result::Result<T, Error>;

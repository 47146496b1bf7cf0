use std::path::PathBuf;

use thiserror::Error;

use crate::common::error::QchainError::GenericError;

#[derive(Debug, Error)]
pub enum QchainError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Submission error: {0}")]
    SubmissionError(String),
    #[error(
        "Admission failure: {staged} staged and {incoming} incoming script(s) exceed the ceiling \
        of {ceiling} after {attempts} attempt(s)"
    )]
    AdmissionFailure {
        staged: usize,
        incoming: usize,
        ceiling: usize,
        attempts: u32,
    },
    #[error(
        "Auto run is already running (iteration {current} of {max}).\n\
        Remove the counter file {} to force a restart.", .counter.display()
    )]
    AutoRunAlreadyRunning {
        current: u32,
        max: u32,
        counter: PathBuf,
    },
    #[error("Machine not found: {0}")]
    MachineNotFound(String),
    #[error("No parallel environment on machine {machine} accepts {cores} cores")]
    ParallelEnvironmentNotFound { machine: String, cores: u32 },
    #[error("Invalid continuation: {0}")]
    ContinuationError(String),
    #[error("Error: {0}")]
    GenericError(String),
}

impl From<serde_json::error::Error> for QchainError {
    fn from(e: serde_json::error::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

impl From<toml::de::Error> for QchainError {
    fn from(error: toml::de::Error) -> Self {
        Self::DeserializationError(error.to_string())
    }
}

impl From<anyhow::Error> for QchainError {
    fn from(error: anyhow::Error) -> Self {
        Self::GenericError(format!("{error:?}"))
    }
}

impl From<derive_builder::UninitializedFieldError> for QchainError {
    fn from(error: derive_builder::UninitializedFieldError) -> Self {
        Self::GenericError(error.to_string())
    }
}

impl From<String> for QchainError {
    fn from(e: String) -> Self {
        GenericError(e)
    }
}

pub fn error<T>(message: String) -> crate::Result<T> {
    Err(GenericError(message))
}

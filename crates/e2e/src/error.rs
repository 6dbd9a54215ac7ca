//! Error types for E2E testing

use std::time::Duration;

use thiserror::Error;

use supplyhub_contract::{SchemaDefinitionError, SchemaValidationError};

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Test spec parse error: {0}")]
    SpecParse(String),

    #[error("Unknown schema fixture: {0}")]
    SchemaNotFound(String),

    #[error("Unexpected status for {path}: expected {expected}, got {actual}")]
    UnexpectedStatus {
        path: String,
        expected: u16,
        actual: u16,
    },

    #[error("Timeout waiting for {description} after {elapsed:?} ({attempts} attempts); last observed: {last_observed}")]
    PollTimeout {
        description: String,
        elapsed: Duration,
        attempts: u32,
        last_observed: String,
    },

    #[error("Polling for {description} cancelled after {elapsed:?}")]
    PollCancelled { description: String, elapsed: Duration },

    #[error("Schema fixture '{name}' is invalid: {source}")]
    InvalidFixture {
        name: String,
        #[source]
        source: SchemaDefinitionError,
    },

    #[error(transparent)]
    SchemaValidation(#[from] SchemaValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;

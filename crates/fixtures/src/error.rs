//! Error types for fixture management

use thiserror::Error;

use crate::model::Role;

#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Backend unreachable after {attempts} attempt(s): {message}")]
    TransientInfra { attempts: u32, message: String },

    #[error("Backend rejected request with status {status}: {body}")]
    BackendRejection { status: u16, body: String },

    #[error("Could not seed fixture '{fixture}' (status {status}): {body}")]
    SeedFailure {
        fixture: String,
        status: u16,
        body: String,
    },

    #[error("Login failed for {role}{}: {message}", status_suffix(.status))]
    Login {
        role: Role,
        status: Option<u16>,
        message: String,
    },

    #[error("Invalid fixture spec: {0}")]
    InvalidSpec(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Hook table error: {0}")]
    HookTable(String),

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

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl FixtureError {
    /// Whether the failure came from the network rather than the backend's answer.
    pub fn is_transient(&self) -> bool {
        matches!(self, FixtureError::TransientInfra { .. })
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

pub type FixtureResult<T> = Result<T, FixtureError>;

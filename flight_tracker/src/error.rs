use std::io;

use config::ConfigError;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::task::JoinError;

pub(crate) type ApplicationResult<T> = Result<T, ApplicationError>;

#[derive(Debug, Error)]
pub(crate) enum ApplicationError {
    #[error("Error regarding config: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Could not determine the config directory for this platform")]
    NoProjectDirectory,
    #[error("System input/output error: {0}")]
    IoError(#[from] io::Error),
    #[error("Error with reqwest: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("Flight feed returned {status} for {url}")]
    HttpStatus { url: String, status: StatusCode },
    #[error("Failed to parse flight feed: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Failed to serialize config: {0}")]
    TomlError(#[from] toml::ser::Error),
    #[error("Join error: {0}")]
    AsyncJoinError(#[from] JoinError),
}

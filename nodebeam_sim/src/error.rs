//! Error types for the scenario harness.

use nodebeam_core::PhysicsError;
use nodebeam_env::EnvError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Physics error: {0}")]
    Physics(#[from] PhysicsError),

    #[error("Environment error: {0}")]
    Env(#[from] EnvError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

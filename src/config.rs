//! Process configuration, supplied through the environment.

use std::env;
use std::path::PathBuf;
use thiserror::Error;

pub const DATABASE_VAR: &str = "MEDVAULT_DATABASE";
pub const SESSION_SECRET_VAR: &str = "MEDVAULT_SESSION_SECRET";

/// Immutable configuration resolved once at process start and passed to
/// component constructors. There are no built-in defaults: credentials and
/// key material must come from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Where the entity store lives.
    pub database_path: PathBuf,
    /// Key material the embedding HTTP layer uses to sign session cookies.
    pub session_secret: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(&'static str),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            database_path: env::var(DATABASE_VAR)
                .map_err(|_| ConfigError::MissingVar(DATABASE_VAR))?
                .into(),
            session_secret: env::var(SESSION_SECRET_VAR)
                .map_err(|_| ConfigError::MissingVar(SESSION_SECRET_VAR))?,
        })
    }
}

//! Errors shared by the controller crates

use std::path::PathBuf;
use thiserror::Error;

/// Settings, environment file and value parsing failures
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to load settings: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Failed to read environment file {}: {source}", .path.display())]
    EnvFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid {what} '{value}': {reason}")]
    Parse {
        what: &'static str,
        value: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn parse(what: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Parse {
            what,
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the failure came from a settings file or `SDN_*` override
    pub fn is_settings(&self) -> bool {
        matches!(self, Error::Settings(_))
    }
}

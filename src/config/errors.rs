//! Configuration error types

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read config '{path}': {message}")]
    Read { path: String, message: String },

    /// File is not valid configuration JSON
    #[error("Invalid config JSON: {0}")]
    Parse(String),

    /// Well-formed but unusable setting
    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ConfigError::Invalid(message.into())
    }
}

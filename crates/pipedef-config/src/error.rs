//! Loading and merging errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yml::Error),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("{location} references unknown inherit block '{name}'")]
    UnknownInheritReference { location: String, name: String },

    #[error("cyclic inheritance at {location}: {}", .chain.join(" -> "))]
    CyclicInheritance { location: String, chain: Vec<String> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

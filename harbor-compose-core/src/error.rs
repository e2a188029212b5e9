//! Error types for harbor-compose core.

use std::{error::Error, fmt, io};

/// Error type for harbor-compose core operations.
#[derive(Debug)]
pub enum HarborComposeError {
    /// An underlying I/O error.
    Io(io::Error),
    /// A compose file could not be parsed or serialized.
    Yaml(serde_yaml::Error),
    /// A JSON payload could not be parsed or serialized.
    Json(serde_json::Error),
    /// The input model is missing something the platform requires.
    Validation(String),
    /// A catch-all error with a message.
    Other(String),
}

impl HarborComposeError {
    /// Build a validation error from a message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl fmt::Display for HarborComposeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Yaml(err) => write!(f, "yaml error: {err}"),
            Self::Json(err) => write!(f, "json error: {err}"),
            Self::Validation(message) => write!(f, "invalid input: {message}"),
            Self::Other(message) => write!(f, "{message}"),
        }
    }
}

impl Error for HarborComposeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Yaml(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::Validation(_) | Self::Other(_) => None,
        }
    }
}

impl From<io::Error> for HarborComposeError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_yaml::Error> for HarborComposeError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Yaml(value)
    }
}

impl From<serde_json::Error> for HarborComposeError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Convenience result type for harbor-compose core.
pub type Result<T> = std::result::Result<T, HarborComposeError>;

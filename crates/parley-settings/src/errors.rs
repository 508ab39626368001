//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why settings could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// File that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid JSON, or a field has the wrong type.
    #[error("malformed settings: {0}")]
    Json(#[from] serde_json::Error),

    /// A field parsed but the relay cannot run with its value.
    #[error("invalid {field}: {reason}")]
    InvalidValue {
        /// Dotted camelCase path, as written in the settings file.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl SettingsError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }

    /// Settings path of the offending field, for validation failures.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::InvalidValue { field, .. } => Some(*field),
            Self::Io { .. } | Self::Json(_) => None,
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

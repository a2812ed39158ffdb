//! Errors raised while loading settings.

use thiserror::Error;

/// Why a settings load failed.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("reading settings: {0}")]
    Io(#[from] std::io::Error),
    /// The settings file is not valid JSON, or does not fit the schema.
    #[error("settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Values parse but cannot run together.
    #[error("invalid setting {field}: {reason}")]
    InvalidValue {
        /// Dotted camelCase key, e.g. `server.maxConnections`.
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
}

/// Result alias for settings loading.
pub type Result<T> = std::result::Result<T, SettingsError>;

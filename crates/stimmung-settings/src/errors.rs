//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The settings file is not valid JSON.
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// Merged values do not fit the settings types (e.g. a string port).
    #[error("settings do not match the expected shape: {0}")]
    Shape(#[from] serde_json::Error),
    /// A field holds a value the server cannot run with.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// camelCase field name as written in the file.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl SettingsError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn read_error_names_the_file() {
        let err = SettingsError::Read {
            path: PathBuf::from("/etc/stimmung.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "failed to read /etc/stimmung.json: denied");
    }

    #[test]
    fn shape_error_from_serde() {
        let json_err = serde_json::from_str::<u16>("\"eighty\"").unwrap_err();
        let err: SettingsError = json_err.into();
        assert_matches!(err, SettingsError::Shape(_));
    }

    #[test]
    fn invalid_names_the_field() {
        let err = SettingsError::invalid("sendQueueCapacity", "must be positive");
        assert_eq!(err.to_string(), "invalid sendQueueCapacity: must be positive");
    }
}

//! Failures while turning `settings.json` into [`TbibiSettings`](crate::TbibiSettings).

use thiserror::Error;

/// Why the backend could not obtain usable settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The file exists but could not be read.
    #[error("cannot read settings: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid JSON, or a field has the wrong shape.
    #[error("malformed settings: {0}")]
    Json(#[from] serde_json::Error),
    /// Parsed fine, but a value would leave the server unusable.
    #[error("rejected setting: {0}")]
    InvalidValue(String),
}

/// Shorthand used throughout the settings crate.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_json_names_the_cause() {
        let source = serde_json::from_str::<serde_json::Value>("{port:").unwrap_err();
        let message = SettingsError::from(source).to_string();
        assert!(message.starts_with("malformed settings: "), "{message}");
    }

    #[test]
    fn rejected_value_keeps_reason() {
        let err = SettingsError::InvalidValue("server.port must be non-zero".into());
        assert_eq!(err.to_string(), "rejected setting: server.port must be non-zero");
    }

    #[test]
    fn io_errors_convert() {
        let err: SettingsError = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert!(matches!(err, SettingsError::Io(e) if e.kind() == std::io::ErrorKind::NotFound));
    }
}

//! Error types for unblock-core.

use thiserror::Error;

/// Result type alias using unblock-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for unblock operations
#[derive(Error, Debug)]
pub enum Error {
    // Contract errors
    #[error("Unknown diagnosis: {0}")]
    UnknownDiagnosis(String),

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("Unknown outcome: {0} (expected success or failure)")]
    UnknownOutcome(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an unknown diagnosis error
    pub fn unknown_diagnosis(name: impl Into<String>) -> Self {
        Self::UnknownDiagnosis(name.into())
    }

    /// Create an unknown strategy error
    pub fn unknown_strategy(name: impl Into<String>) -> Self {
        Self::UnknownStrategy(name.into())
    }

    /// Check if this error is about an unrecognized identifier
    pub fn is_unknown_identifier(&self) -> bool {
        matches!(
            self,
            Self::UnknownDiagnosis(_) | Self::UnknownStrategy(_) | Self::UnknownOutcome(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::unknown_diagnosis("Bogus");
        assert!(err.is_unknown_identifier());
        assert!(err.to_string().contains("Bogus"));

        let err = Error::unknown_strategy("Teleport");
        assert!(err.is_unknown_identifier());
        assert!(err.to_string().contains("Teleport"));

        let err = Error::Other("boom".into());
        assert!(!err.is_unknown_identifier());
    }

    #[test]
    fn test_persistence_errors_convert() {
        fn parse(raw: &str) -> Result<serde_json::Value> {
            Ok(serde_json::from_str(raw)?)
        }
        let err = parse("{ not json").unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
        assert!(!err.is_unknown_identifier());

        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, Error::Io(_)));
    }
}

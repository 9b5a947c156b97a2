//! Error types for Ember

use thiserror::Error;

/// The main error type for Ember operations.
///
/// Every variant except the IO and TOML ones is a configuration error: it is
/// raised while a particle system is built or activated, never mid-step.
#[derive(Debug, Error)]
pub enum EmberError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Value out of range: {field} must be between {min} and {max}, got {value}")]
    ValueOutOfRange {
        field: String,
        min: f64,
        max: f64,
        value: f64,
    },

    #[error("Curve has no keyframes: {0}")]
    EmptyCurve(String),

    #[error("Keyframes of {curve} are not sorted by time (keyframe {index})")]
    UnsortedKeyframes { curve: String, index: usize },

    #[error("Mesh not found: {0}")]
    MissingMesh(u64),

    #[error("Mesh has nothing to emit from: {0}")]
    EmptyMesh(u64),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(String),

    #[error("TOML serialization error: {0}")]
    TomlSerError(String),
}

impl EmberError {
    /// True for errors caused by invalid particle-system configuration
    pub fn is_configuration(&self) -> bool {
        !matches!(
            self,
            EmberError::IoError(_) | EmberError::TomlParseError(_) | EmberError::TomlSerError(_)
        )
    }

    /// Shorthand for a `ValueOutOfRange` error on a named field
    pub fn out_of_range(field: impl Into<String>, min: f64, max: f64, value: f64) -> Self {
        EmberError::ValueOutOfRange {
            field: field.into(),
            min,
            max,
            value,
        }
    }
}

/// Result type alias for Ember operations
pub type Result<T> = std::result::Result<T, EmberError>;

impl From<toml::de::Error> for EmberError {
    fn from(err: toml::de::Error) -> Self {
        EmberError::TomlParseError(err.to_string())
    }
}

impl From<toml::ser::Error> for EmberError {
    fn from(err: toml::ser::Error) -> Self {
        EmberError::TomlSerError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_classification() {
        assert!(EmberError::EmptyCurve("size".into()).is_configuration());
        assert!(EmberError::MissingMesh(3).is_configuration());
        assert!(EmberError::out_of_range("thickness", 0.0, 1.0, 2.0).is_configuration());
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(!EmberError::from(io).is_configuration());
    }

    #[test]
    fn out_of_range_message() {
        let err = EmberError::out_of_range("thickness", 0.0, 1.0, 1.5);
        assert_eq!(
            err.to_string(),
            "Value out of range: thickness must be between 0 and 1, got 1.5"
        );
    }
}

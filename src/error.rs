//! Error types for pipelines and grid search

use thiserror::Error;

/// Result type alias for Kolosal operations
pub type Result<T> = std::result::Result<T, KolosalError>;

/// Coarse classification of errors, used by callers that only care about
/// which phase rejected the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed grid, unresolvable parameter name, duplicate stage name
    Configuration,
    /// A stage lacks the capability its position requires
    Contract,
    /// Feature dimensionality mismatch between chained stages
    DataShape,
    /// A fit/transform/predict raised during a search
    FitFailure,
    /// Everything else (bad input data, unfitted model, IO, ...)
    Other,
}

/// Main error type for the Kolosal tuning crate
#[derive(Error, Debug)]
pub enum KolosalError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Contract error: stage '{stage}' {reason}")]
    ContractError { stage: String, reason: String },

    #[error("Invalid shape at stage '{stage}': expected {expected}, got {actual}")]
    ShapeError {
        stage: String,
        expected: String,
        actual: String,
    },

    #[error("Fit failed for grid point {point} [{params}]{}: {source}", fold_label(.fold))]
    FitFailure {
        point: usize,
        fold: Option<usize>,
        params: String,
        #[source]
        source: Box<KolosalError>,
    },

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

fn fold_label(fold: &Option<usize>) -> String {
    match fold {
        Some(f) => format!(" on fold {}", f),
        None => " during refit".to_string(),
    }
}

impl KolosalError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            KolosalError::ConfigError(_) | KolosalError::InvalidParameter { .. } => {
                ErrorKind::Configuration
            }
            KolosalError::ContractError { .. } => ErrorKind::Contract,
            KolosalError::ShapeError { .. } => ErrorKind::DataShape,
            KolosalError::FitFailure { .. } => ErrorKind::FitFailure,
            _ => ErrorKind::Other,
        }
    }

    pub(crate) fn unknown_param(owner: &str, name: &str) -> Self {
        KolosalError::InvalidParameter {
            name: name.to_string(),
            value: "?".to_string(),
            reason: format!("not a parameter of {}", owner),
        }
    }

    pub(crate) fn invalid_value(name: &str, value: impl std::fmt::Display, reason: &str) -> Self {
        KolosalError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for KolosalError {
    fn from(err: serde_json::Error) -> Self {
        KolosalError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for KolosalError {
    fn from(err: ndarray::ShapeError) -> Self {
        KolosalError::ShapeError {
            stage: "<array>".to_string(),
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KolosalError::ConfigError("empty grid".to_string());
        assert_eq!(err.to_string(), "Configuration error: empty grid");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: KolosalError = io_err.into();
        assert!(matches!(err, KolosalError::IoError(_)));
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[test]
    fn test_fit_failure_display() {
        let err = KolosalError::FitFailure {
            point: 2,
            fold: Some(1),
            params: "k=3".to_string(),
            source: Box::new(KolosalError::DataError("boom".to_string())),
        };
        assert_eq!(
            err.to_string(),
            "Fit failed for grid point 2 [k=3] on fold 1: Data error: boom"
        );

        let refit = KolosalError::FitFailure {
            point: 0,
            fold: None,
            params: String::new(),
            source: Box::new(KolosalError::ModelNotFitted),
        };
        assert!(refit.to_string().contains("during refit"));
        assert_eq!(refit.kind(), ErrorKind::FitFailure);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            KolosalError::unknown_param("Pipeline", "x").kind(),
            ErrorKind::Configuration
        );
        let shape = KolosalError::ShapeError {
            stage: "pca".into(),
            expected: "3".into(),
            actual: "4".into(),
        };
        assert_eq!(shape.kind(), ErrorKind::DataShape);
    }
}

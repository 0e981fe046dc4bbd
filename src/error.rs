//! Error types for the comfort scoring pipeline

use thiserror::Error;

/// Main error type for `comfortcast`
#[derive(Error, Debug)]
pub enum ComfortError {
    /// Missing or malformed caller input
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Geocoding or forecast service unavailable, timed out or returned an unexpected shape
    #[error("Upstream failure: {message}")]
    UpstreamFailure { message: String, retryable: bool },

    /// An engineered feature row contains missing or non-numeric values
    #[error("Feature validation failed for row {row} ({date}): {message}")]
    FeatureValidation {
        row: usize,
        date: String,
        message: String,
    },

    /// The persisted model artifact is missing, corrupt or built for another schema
    #[error("Model load failure: {message}")]
    ModelLoad { message: String },

    /// Offline labeling or fitting failed
    #[error("Training error: {message}")]
    Training { message: String },

    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl ComfortError {
    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn upstream<S: Into<String>>(message: S) -> Self {
        Self::UpstreamFailure {
            message: message.into(),
            retryable: true,
        }
    }

    /// The service understood the request and refused it; repeating it cannot help
    pub fn upstream_rejected<S: Into<String>>(message: S) -> Self {
        Self::UpstreamFailure {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn feature_validation<D: Into<String>, S: Into<String>>(
        row: usize,
        date: D,
        message: S,
    ) -> Self {
        Self::FeatureValidation {
            row,
            date: date.into(),
            message: message.into(),
        }
    }

    pub fn model_load<S: Into<String>>(message: S) -> Self {
        Self::ModelLoad {
            message: message.into(),
        }
    }

    pub fn training<S: Into<String>>(message: S) -> Self {
        Self::Training {
            message: message.into(),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Short machine-readable kind, used as the `error` field of API payloads
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ComfortError::InvalidRequest { .. } => "invalid_request",
            ComfortError::UpstreamFailure { .. } => "upstream_failure",
            ComfortError::FeatureValidation { .. } => "feature_validation_error",
            ComfortError::ModelLoad { .. } => "model_load_failure",
            ComfortError::Training { .. } => "training_error",
            ComfortError::Config { .. } => "config_error",
            ComfortError::Io { .. } => "io_error",
        }
    }

    /// Whether the caller may retry the same request unchanged
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ComfortError::UpstreamFailure {
                retryable: true,
                ..
            }
        )
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            ComfortError::InvalidRequest { message } => format!("Invalid request: {message}"),
            ComfortError::UpstreamFailure { .. } => {
                "Weather services are unavailable right now. Please try again later.".to_string()
            }
            ComfortError::FeatureValidation { date, .. } => {
                format!("Incomplete forecast data for {date}; no comfort score could be computed.")
            }
            ComfortError::ModelLoad { .. } => {
                "The comfort model is unavailable. Retrain and redeploy the model artifact."
                    .to_string()
            }
            ComfortError::Training { message } => format!("Training failed: {message}"),
            ComfortError::Config { .. } => {
                "Configuration error. Please check your config file and environment.".to_string()
            }
            ComfortError::Io { .. } => {
                "File operation failed. Please check file paths and permissions.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ComfortError::invalid_request("city is required");
        assert!(matches!(err, ComfortError::InvalidRequest { .. }));

        let err = ComfortError::upstream("connection refused");
        assert!(matches!(err, ComfortError::UpstreamFailure { .. }));

        let err = ComfortError::feature_validation(1, "2025-04-02", "temp_max is missing");
        assert!(matches!(err, ComfortError::FeatureValidation { row: 1, .. }));
        assert!(err.to_string().contains("row 1 (2025-04-02)"));
    }

    #[test]
    fn test_only_upstream_failures_are_retryable() {
        assert!(ComfortError::upstream("timeout").is_retryable());
        assert!(!ComfortError::invalid_request("x").is_retryable());
        assert!(!ComfortError::feature_validation(0, "d", "x").is_retryable());
        assert!(!ComfortError::model_load("x").is_retryable());
        assert!(!ComfortError::upstream_rejected("bad start_date").is_retryable());
    }

    #[test]
    fn test_user_messages() {
        let err = ComfortError::invalid_request("city is required");
        assert!(err.user_message().contains("city is required"));

        let err = ComfortError::feature_validation(0, "2025-04-01", "cloudcover is missing");
        assert!(err.user_message().contains("2025-04-01"));
        assert_eq!(err.kind(), "feature_validation_error");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ComfortError = io_err.into();
        assert!(matches!(err, ComfortError::Io { .. }));
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application error types
///
/// Display strings are returned to clients verbatim as `{"error": ...}`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Bad or missing request input
    #[error("{0}")]
    Validation(String),

    /// Request body over the configured upload limit
    #[error("File too large. Maximum file size is {0}.")]
    PayloadTooLarge(String),

    /// Malformed pipeline definition
    #[error("{0}")]
    Parse(String),

    /// Model or vectorizer failed to load at startup
    #[error("{0}")]
    ModelUnavailable(String),

    /// Encoded vector width does not match the loaded model
    #[error("Server error during prediction: feature count mismatch (model expects {expected}, got {actual})")]
    FeatureMismatch { expected: usize, actual: usize },

    /// Failure inside the prediction pipeline
    #[error("Server error during prediction: {0}")]
    Prediction(String),

    /// Unknown route
    #[error("{0}")]
    NotFound(String),

    /// Internal server errors
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Parse(_) => StatusCode::BAD_REQUEST,
            AppError::ModelUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::FeatureMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Prediction(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            AppError::Parse(_) => "PARSE_ERROR",
            AppError::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
            AppError::FeatureMismatch { .. } => "FEATURE_MISMATCH",
            AppError::Prediction(_) => "PREDICTION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(
                error_code = error_code,
                status_code = status.as_u16(),
                message = %message,
                "Request error"
            );
        } else {
            tracing::warn!(
                error_code = error_code,
                status_code = status.as_u16(),
                message = %message,
                "Request rejected"
            );
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Failure of either feature extraction path.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    /// Empty document or invalid YAML
    #[error("{0}")]
    Parse(String),

    /// A form value could not be coerced to its field type
    #[error("Invalid form data: {0}")]
    Validation(String),
}

impl From<ExtractionError> for AppError {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::Parse(_) => AppError::Parse(err.to_string()),
            ExtractionError::Validation(_) => AppError::Validation(err.to_string()),
        }
    }
}

/// Reasons an alert email was not delivered.
///
/// These are reported to the caller as `{"success": false, "message": ...}`
/// and never escalate into an HTTP error.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Email credentials not configured. Set SENDER_EMAIL and SENDER_PASSWORD environment variables.")]
    CredentialsNotConfigured,

    #[error("Recipient email address is required.")]
    MissingRecipient,

    #[error("Invalid email address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("SMTP authentication failed. Check email credentials.")]
    AuthenticationFailed,

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("Unexpected error sending email: {0}")]
    Unexpected(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::Validation("test".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::PayloadTooLarge("16MB".to_string()).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            AppError::ModelUnavailable("test".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::NotFound("test".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_error_messages_are_client_facing() {
        assert_eq!(
            AppError::Validation("No file uploaded".to_string()).to_string(),
            "No file uploaded"
        );
        assert_eq!(
            AppError::PayloadTooLarge("16MB".to_string()).to_string(),
            "File too large. Maximum file size is 16MB."
        );
        assert_eq!(
            AppError::FeatureMismatch { expected: 3, actual: 11 }.to_string(),
            "Server error during prediction: feature count mismatch (model expects 3, got 11)"
        );
    }

    #[test]
    fn test_extraction_error_conversion() {
        let err: AppError = ExtractionError::Parse("Empty or invalid YAML file".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "PARSE_ERROR");

        let err: AppError =
            ExtractionError::Validation("build_duration must be a number".to_string()).into();
        assert_eq!(err.to_string(), "Invalid form data: build_duration must be a number");
    }

    #[test]
    fn test_delivery_messages_are_distinct() {
        let messages = [
            DeliveryError::CredentialsNotConfigured.to_string(),
            DeliveryError::MissingRecipient.to_string(),
            DeliveryError::AuthenticationFailed.to_string(),
            DeliveryError::Smtp("421 busy".to_string()).to_string(),
            DeliveryError::Unexpected("boom".to_string()).to_string(),
        ];
        for (i, a) in messages.iter().enumerate() {
            for b in &messages[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}

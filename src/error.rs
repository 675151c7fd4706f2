//! Error types for herald

use thiserror::Error;

/// Errors that can occur in the notification service
#[derive(Debug, Error)]
pub enum HeraldError {
    /// Malformed input: bad JSON, missing fields, invalid enums,
    /// contradictory subscription fields
    #[error("Validation error: {0}")]
    Validation(String),

    /// Backing-store I/O failure
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Delivery failure; `transient` distinguishes retryable failures
    /// from permanent rejections
    #[error("Delivery failed for '{destination}': {reason}")]
    Delivery {
        destination: String,
        reason: String,
        transient: bool,
    },

    /// Pub/sub source failure (connect, consume, ack)
    #[error("Source error: {0}")]
    Source(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Requested entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invariant violation or unexpected internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for herald operations
pub type Result<T> = std::result::Result<T, HeraldError>;

impl axum::response::IntoResponse for HeraldError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        use axum::response::IntoResponse;

        let status = match &self {
            HeraldError::Validation(_) | HeraldError::Serialization(_) => StatusCode::BAD_REQUEST,
            HeraldError::NotFound(_) => StatusCode::NOT_FOUND,
            HeraldError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HeraldError::Delivery {
            destination: "a@example.com".to_string(),
            reason: "connection refused".to_string(),
            transient: true,
        };
        assert!(err.to_string().contains("a@example.com"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse: std::result::Result<crate::types::Event, _> =
            serde_json::from_str("not json");
        let err: HeraldError = parse.unwrap_err().into();
        assert!(matches!(err, HeraldError::Serialization(_)));
    }
}

/// Error types for the prediction client.
///
/// Cancellation is not an error: a superseded request settles as
/// `Outcome::Cancelled`, never as an `AppError`.

use thiserror::Error;

/// Marker the service puts in its error body when the inference backend is not installed.
pub const CAPABILITY_MISSING_MARKER: &str = "PyTorch is not installed";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Image decode error: {0}")]
    ImageDecode(String),

    #[error("Image encode error: {0}")]
    Encode(String),

    #[error("Service still unavailable after {attempts} attempts: {message}")]
    TransientServiceUnavailable { attempts: u32, message: String },

    #[error("Service error ({status}): {body}")]
    Service { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl AppError {
    /// True when the service reported that it lacks the inference backend entirely.
    ///
    /// This is the only condition that should route a prediction to the fallback predictor.
    pub fn is_capability_missing(&self) -> bool {
        match self {
            AppError::Service { body, .. } => service_error_text(body)
                .map(|text| text.contains(CAPABILITY_MISSING_MARKER))
                .unwrap_or_else(|| body.contains(CAPABILITY_MISSING_MARKER)),
            _ => false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::TransientServiceUnavailable { .. })
    }

    pub fn is_network(&self) -> bool {
        matches!(self, AppError::Network(_))
    }
}

/// Extract the `error` field from a JSON error body, if the body is JSON.
pub fn service_error_text(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("error")?
        .as_str()
        .map(str::to_string)
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AppError::InvalidResponse(format!("{err}"))
        } else {
            AppError::Network(format!("{err}"))
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(format!("{err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_marker_is_read_from_json_error_field() {
        let err = AppError::Service {
            status: 500,
            body: r#"{"error":"PyTorch is not installed on the server.","fix":"pip install"}"#.to_string(),
        };
        assert!(err.is_capability_missing());
        assert!(!err.is_retryable());
    }

    #[test]
    fn plain_text_body_still_matches_marker() {
        let err = AppError::Service {
            status: 500,
            body: "PyTorch is not installed".to_string(),
        };
        assert!(err.is_capability_missing());
    }

    #[test]
    fn other_failures_do_not_trigger_fallback() {
        let err = AppError::Service {
            status: 500,
            body: r#"{"error":"Failed to process image"}"#.to_string(),
        };
        assert!(!err.is_capability_missing());
        assert!(!AppError::Network("connection refused".into()).is_capability_missing());
        assert!(AppError::TransientServiceUnavailable {
            attempts: 4,
            message: "loading".into()
        }
        .is_retryable());
    }
}

//! Provider error types

use thiserror::Error;

/// Errors returned by cloud provider implementations
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The change already exists or conflicts with current resource state
    #[error("conflict on {resource}: {message}")]
    Conflict { resource: String, message: String },

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("throttled by the management API: {0}")]
    Throttled(String),

    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ProviderError::Conflict { .. })
    }

    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Throttled(_) | ProviderError::Network(_) => true,
            ProviderError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Map a non-success HTTP status to an error
    pub fn from_status(status: u16, resource: &str, body: String) -> Self {
        match status {
            409 => ProviderError::Conflict {
                resource: resource.to_string(),
                message: body,
            },
            404 => ProviderError::NotFound(resource.to_string()),
            401 | 403 => ProviderError::Unauthorized(body),
            429 => ProviderError::Throttled(body),
            _ => ProviderError::Http {
                status,
                message: body,
            },
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            ProviderError::Decode(error.to_string())
        } else if let Some(status) = error.status() {
            ProviderError::Http {
                status: status.as_u16(),
                message: error.to_string(),
            }
        } else {
            ProviderError::Network(error.to_string())
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(ProviderError::from_status(409, "/vm", "exists".into()).is_conflict());
        assert!(matches!(
            ProviderError::from_status(404, "/vm", String::new()),
            ProviderError::NotFound(r) if r == "/vm"
        ));
        assert!(matches!(
            ProviderError::from_status(403, "/vm", String::new()),
            ProviderError::Unauthorized(_)
        ));
        assert!(matches!(
            ProviderError::from_status(418, "/vm", "teapot".into()),
            ProviderError::Http { status: 418, .. }
        ));
    }

    #[test]
    fn test_retryable_classes() {
        assert!(ProviderError::Throttled("slow down".into()).is_retryable());
        assert!(ProviderError::Network("reset".into()).is_retryable());
        assert!(ProviderError::from_status(503, "/vm", String::new()).is_retryable());
        assert!(!ProviderError::from_status(400, "/vm", String::new()).is_retryable());
        assert!(!ProviderError::from_status(409, "/vm", String::new()).is_retryable());
    }
}

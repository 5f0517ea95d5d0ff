use thiserror::Error;

use super::types::CategoryId;

/// Errors returned by a [`CategoryRepository`](super::CategoryRepository).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server error: status {status}{}", message.as_deref().map(|m| format!(" ({m})")).unwrap_or_default())]
    Server { status: u16, message: Option<String> },

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),

    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Insecure API base URL: HTTPS required (except localhost)")]
    InsecureBaseUrl,

    #[error("Category {0} not found")]
    NotFound(CategoryId),

    #[error("Rejected: {0}")]
    Rejected(String),

    /// The background task running the request panicked.
    #[error("Request task failed: {0}")]
    TaskFailed(String),
}

impl RepositoryError {
    /// Returns true if this error is transient and the request may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) => true,
            Self::Server { status, .. } => *status >= 500,
            Self::Decode(_)
            | Self::ResponseTooLarge(_)
            | Self::InvalidBaseUrl(_)
            | Self::InsecureBaseUrl
            | Self::NotFound(_)
            | Self::Rejected(_)
            | Self::TaskFailed(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(RepositoryError::Timeout(15).is_retryable());
        assert!(RepositoryError::Server {
            status: 503,
            message: None
        }
        .is_retryable());
        assert!(!RepositoryError::Server {
            status: 404,
            message: None
        }
        .is_retryable());
        assert!(!RepositoryError::NotFound(CategoryId(3)).is_retryable());
        assert!(!RepositoryError::Rejected("has children".into()).is_retryable());
    }

    #[test]
    fn test_server_error_message() {
        let err = RepositoryError::Server {
            status: 409,
            message: Some("category has children".into()),
        };
        assert_eq!(
            err.to_string(),
            "Server error: status 409 (category has children)"
        );

        let bare = RepositoryError::Server {
            status: 500,
            message: None,
        };
        assert_eq!(bare.to_string(), "Server error: status 500");
    }
}

use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

/// Failure from the code-hosting API, classified by HTTP status where one exists.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Status { status: StatusCode, message: String },
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Other(String),
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Not found, unauthorized or forbidden.
    pub fn is_not_found_or_forbidden(&self) -> bool {
        matches!(
            self.status(),
            Some(StatusCode::NOT_FOUND | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
        )
    }
}

impl From<octocrab::Error> for ApiError {
    fn from(err: octocrab::Error) -> Self {
        match err {
            octocrab::Error::GitHub { source, .. } => {
                Self::Status { status: source.status_code, message: source.message }
            }
            e => Self::Other(without_backtrace(&e.to_string()).to_string()),
        }
    }
}

/// Octocrab appends `Found at <backtrace>` to most error messages.
fn without_backtrace(message: &str) -> &str {
    message.split("\nFound at ").next().unwrap_or(message).trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        for status in [StatusCode::NOT_FOUND, StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            let err = ApiError::Status { status, message: "nope".to_string() };
            assert!(err.is_not_found_or_forbidden());
            assert_eq!(err.to_string(), "nope");
        }
        let err = ApiError::Status { status: StatusCode::CONFLICT, message: "x".to_string() };
        assert!(!err.is_not_found_or_forbidden());
        assert_eq!(ApiError::Timeout(Duration::from_secs(30)).status(), None);
        assert_eq!(
            ApiError::Timeout(Duration::from_secs(30)).to_string(),
            "request timed out after 30s"
        );
    }

    #[test]
    fn test_backtrace_is_stripped() {
        let message = "Serde Error: expected value\nFound at \n   0: octocrab::Octocrab\n";
        assert_eq!(without_backtrace(message), "Serde Error: expected value");
        let message = "Hyper Error: connection refused\n\nFound at disabled backtrace";
        assert_eq!(without_backtrace(message), "Hyper Error: connection refused");
        assert_eq!(without_backtrace("UriParse"), "UriParse");
    }
}

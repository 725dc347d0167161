use reqwest::StatusCode;
use thiserror::Error;

/// Failure reported by the remote drive.
///
/// Variants carry rendered messages instead of source errors so the value can
/// be cloned into task records and fanned out to several event subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("service error: {message}")]
    Service {
        status: Option<u16>,
        message: String,
    },
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// Rejected locally before any request was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl ApiError {
    pub fn from_status(status: StatusCode, body: String) -> Self {
        let body = if body.trim().is_empty() {
            status.to_string()
        } else {
            body
        };
        match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => ApiError::NotFound(body),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Forbidden(body),
            StatusCode::PAYLOAD_TOO_LARGE | StatusCode::INSUFFICIENT_STORAGE => {
                ApiError::QuotaExceeded(body)
            }
            _ => ApiError::Service {
                status: Some(status.as_u16()),
                message: body,
            },
        }
    }

    /// Whether a manual re-submission has a fair chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) => true,
            ApiError::Service {
                status: Some(status),
                ..
            } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Service {
                status: err.status().map(|status| status.as_u16()),
                message: format!("malformed response: {err}"),
            }
        } else if let Some(status) = err.status() {
            ApiError::from_status(status, err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<url::ParseError> for ApiError {
    fn from(err: url::ParseError) -> Self {
        ApiError::InvalidUrl(err.to_string())
    }
}

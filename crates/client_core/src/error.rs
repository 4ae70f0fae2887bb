use reqwest::StatusCode;
use shared::error::ValidationError;
use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    /// A client-side guard refused the action before any request was sent.
    #[error("{0}")]
    Rejected(String),
    /// Optimistic-locking failure: someone else changed the record first.
    #[error("conflict: {message}")]
    Conflict {
        message: String,
        current: Option<serde_json::Value>,
    },
    #[error("server responded {status}: {message}")]
    Http { status: StatusCode, message: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid api url: {0}")]
    Url(#[from] url::ParseError),
}

impl ClientError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Expected failures are the user's to fix; everything else is a fault.
    pub fn is_expected(&self) -> bool {
        match self {
            ClientError::Validation(_) | ClientError::Rejected(_) | ClientError::Conflict { .. } => {
                true
            }
            ClientError::Http { status, .. } => {
                *status == StatusCode::BAD_REQUEST || *status == StatusCode::UNPROCESSABLE_ENTITY
            }
            ClientError::Transport(_) | ClientError::Decode(_) | ClientError::Url(_) => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Conflict { .. })
    }

    /// Text for the toast shown after a failed action.
    ///
    /// Expected errors show their own message. Server faults and network
    /// failures collapse into `fallback`, since the raw cause means nothing to
    /// the front desk.
    pub fn toast_message(&self, fallback: &str) -> String {
        match self {
            ClientError::Validation(err) => err.message.clone(),
            ClientError::Rejected(message) => message.clone(),
            ClientError::Conflict { .. } => {
                "This record was changed by someone else. Review the latest values and try again."
                    .to_string()
            }
            ClientError::Http { message, .. } if self.is_expected() && !message.is_empty() => {
                message.clone()
            }
            ClientError::Http { status, .. } if *status == StatusCode::NOT_FOUND => {
                "That record no longer exists.".to_string()
            }
            _ => fallback.to_string(),
        }
    }
}

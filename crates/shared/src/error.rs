use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body returned by the salon API on non-2xx responses.
///
/// Optimistic-locking failures set `conflict` and usually carry the record as
/// it currently exists on the server in `current`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    #[serde(default, alias = "message")]
    pub error: String,
    #[serde(default)]
    pub conflict: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<serde_json::Value>,
}

impl ApiErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            conflict: false,
            current: None,
        }
    }

    pub fn conflict(error: impl Into<String>, current: Option<serde_json::Value>) -> Self {
        Self {
            error: error.into(),
            conflict: true,
            current,
        }
    }
}

/// An expected, user-facing input failure. Raised before any request is sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }

    pub fn required(field: &'static str, label: &str) -> Self {
        Self::new(field, format!("{label} is required"))
    }
}

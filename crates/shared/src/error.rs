use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Coarse class of a failed backend response, derived from its status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    RateLimited,
    /// Exactly HTTP 500: the backend's transient analysis failure.
    Internal,
    Unavailable,
    Other,
}

impl ErrorClass {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorClass::Unauthorized,
            403 => ErrorClass::Forbidden,
            404 => ErrorClass::NotFound,
            400 | 409 | 413 | 415 | 422 => ErrorClass::Validation,
            429 => ErrorClass::RateLimited,
            500 => ErrorClass::Internal,
            501..=599 => ErrorClass::Unavailable,
            _ => ErrorClass::Other,
        }
    }
}

/// Error body emitted by the backend: `{"detail": ..., "message": ...}`.
///
/// `detail` is usually a string but validation failures carry a JSON array,
/// so it is kept as a raw value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub detail: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiErrorBody {
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    /// The most specific human-readable message: a string `detail`, then `message`.
    pub fn best_message(&self) -> Option<String> {
        let detail = self
            .detail
            .as_ref()
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|detail| !detail.is_empty());
        if let Some(detail) = detail {
            return Some(detail.to_string());
        }

        self.message
            .as_deref()
            .map(str::trim)
            .filter(|message| !message.is_empty())
            .map(str::to_string)
    }
}

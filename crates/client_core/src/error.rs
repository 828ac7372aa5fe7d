use shared::error::ErrorClass;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("backend returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid backend response: {0}")]
    Decode(String),
    #[error("{0}")]
    Validation(String),
    #[error("token store failure: {0}")]
    TokenStore(String),
    #[error("no artifact selected")]
    NoSelection,
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Transport(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    pub fn class(&self) -> Option<ErrorClass> {
        self.status().map(ErrorClass::from_status)
    }

    /// Only a plain internal server error is worth retrying; the backend's
    /// analysis workers fail transiently with 500 while warming up.
    pub fn is_retryable(&self) -> bool {
        self.class() == Some(ErrorClass::Internal)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.class() == Some(ErrorClass::Unauthorized)
    }

    /// Text shown inline in the panel that failed.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ClientError::Api { message, .. } if !message.trim().is_empty() => message.clone(),
            ClientError::Validation(message) => message.clone(),
            _ => fallback.to_string(),
        }
    }
}

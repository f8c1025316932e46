use thiserror::Error;

/// What a failure means for the user, independent of how it was transported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Auth,
    Forbidden,
    NotFound,
    Conflict,
    Transient,
    Unexpected,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("request timed out")]
    Timeout,

    #[error("server rejected request ({status}): {message}")]
    ServerRejected { status: u16, message: String },

    #[error("invalid response: {0}")]
    Decode(String),

    /// Rejected locally before any request was sent.
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::NetworkUnreachable(_) | ApiError::Timeout => ErrorKind::Transient,
            ApiError::Invalid(_) => ErrorKind::Validation,
            ApiError::Decode(_) => ErrorKind::Unexpected,
            ApiError::ServerRejected { status, .. } => match status {
                400 | 422 => ErrorKind::Validation,
                401 => ErrorKind::Auth,
                403 => ErrorKind::Forbidden,
                404 => ErrorKind::NotFound,
                409 => ErrorKind::Conflict,
                502..=504 => ErrorKind::Transient,
                _ => ErrorKind::Unexpected,
            },
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Server-provided message, when there is one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::ServerRejected { message, .. } => Some(message),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::NetworkUnreachable(e.to_string())
        }
    }
}

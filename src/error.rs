//! Error types for hall-chat

use thiserror::Error;

use crate::chat::messages::ReduceError;

/// Main error type for the hall-chat library
#[derive(Error, Debug)]
pub enum HallChatError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not connected to the chat service")]
    NotConnected,

    #[error("a reply is still in progress")]
    Busy,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("message list error: {0}")]
    Reduce(#[from] ReduceError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Convenience type alias for Result using HallChatError
pub type Result<T> = std::result::Result<T, HallChatError>;

impl HallChatError {
    /// Text suitable for a toast or an inline error bubble
    pub fn to_user_string(&self) -> String {
        match self {
            HallChatError::Transport(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

impl From<HallChatError> for String {
    fn from(err: HallChatError) -> Self {
        err.to_user_string()
    }
}

// ═══════════════════════════════════════
// TRANSPORT ERRORS
// ═══════════════════════════════════════

/// Classification of a failed HTTP exchange, keyed off the status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Status 0: the request never reached the server
    Connectivity,
    /// 401
    Unauthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 429
    RateLimited,
    /// >= 500
    Server,
    /// Any other 4xx
    Request,
    /// 2xx with a body that does not match the expected shape
    Decode,
}

impl TransportErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            0 => Self::Connectivity,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            s if s >= 500 => Self::Server,
            _ => Self::Request,
        }
    }

    /// Whether a configured retry budget may be spent on this kind
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connectivity | Self::RateLimited | Self::Server)
    }
}

/// A network or HTTP failure at the transport boundary
#[derive(Error, Debug, Clone)]
#[error("transport error ({status}): {detail}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    /// HTTP status, 0 when no response was received
    pub status: u16,
    pub detail: String,
}

impl TransportError {
    pub fn from_status(status: u16, detail: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::from_status(status),
            status,
            detail: detail.into(),
        }
    }

    pub fn connectivity(detail: impl Into<String>) -> Self {
        Self::from_status(0, detail)
    }

    /// The request could not be built (bad url, unserializable body)
    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Request,
            status: 0,
            detail: detail.into(),
        }
    }

    pub fn decode(status: u16, detail: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Decode,
            status,
            detail: detail.into(),
        }
    }

    /// Human-readable message shown to the user
    pub fn user_message(&self) -> String {
        match self.kind {
            TransportErrorKind::Connectivity => {
                "Unable to reach the server. Please check your connection.".to_string()
            }
            TransportErrorKind::Unauthorized => {
                "Your session has expired. Please log in again.".to_string()
            }
            TransportErrorKind::Forbidden => {
                "You don't have permission to use the assistant.".to_string()
            }
            TransportErrorKind::NotFound => {
                "The requested conversation could not be found.".to_string()
            }
            TransportErrorKind::RateLimited => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            TransportErrorKind::Server => {
                "The server encountered an error. Please try again later.".to_string()
            }
            TransportErrorKind::Request if self.status == 0 => {
                "The request could not be completed.".to_string()
            }
            TransportErrorKind::Request => {
                format!("The request could not be completed ({}).", self.status)
            }
            TransportErrorKind::Decode => "Invalid response format from server.".to_string(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            return Self::invalid_request(err.to_string());
        }
        match err.status() {
            Some(status) => Self::from_status(status.as_u16(), err.to_string()),
            None if err.is_decode() => Self::decode(0, err.to_string()),
            None => Self::connectivity(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_status() {
        assert_eq!(TransportErrorKind::from_status(0), TransportErrorKind::Connectivity);
        assert_eq!(TransportErrorKind::from_status(401), TransportErrorKind::Unauthorized);
        assert_eq!(TransportErrorKind::from_status(403), TransportErrorKind::Forbidden);
        assert_eq!(TransportErrorKind::from_status(404), TransportErrorKind::NotFound);
        assert_eq!(TransportErrorKind::from_status(429), TransportErrorKind::RateLimited);
        assert_eq!(TransportErrorKind::from_status(500), TransportErrorKind::Server);
        assert_eq!(TransportErrorKind::from_status(503), TransportErrorKind::Server);
        assert_eq!(TransportErrorKind::from_status(422), TransportErrorKind::Request);
    }

    #[test]
    fn test_user_messages() {
        assert!(TransportError::connectivity("refused")
            .user_message()
            .contains("check your connection"));
        assert!(TransportError::from_status(401, "")
            .user_message()
            .contains("log in"));
        assert!(TransportError::from_status(403, "")
            .user_message()
            .contains("permission"));
        assert!(TransportError::from_status(404, "")
            .user_message()
            .contains("could not be found"));
        assert!(TransportError::from_status(429, "")
            .user_message()
            .contains("wait a moment and try again"));
        assert!(TransportError::from_status(502, "")
            .user_message()
            .contains("server encountered an error"));
    }

    #[test]
    fn test_transient_kinds() {
        assert!(TransportErrorKind::Connectivity.is_transient());
        assert!(TransportErrorKind::RateLimited.is_transient());
        assert!(TransportErrorKind::Server.is_transient());
        assert!(!TransportErrorKind::Unauthorized.is_transient());
        assert!(!TransportErrorKind::Decode.is_transient());
    }

    #[test]
    fn test_to_user_string_uses_transport_text() {
        let err: HallChatError = TransportError::from_status(429, "slow down").into();
        assert!(err.to_user_string().contains("Too many requests"));

        let err = HallChatError::InvalidInput("empty".to_string());
        assert_eq!(err.to_user_string(), err.to_string());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<i32>("not json").unwrap_err();
        let err: HallChatError = json_err.into();
        assert!(matches!(err, HallChatError::Json(_)));
        assert!(err.to_string().contains("JSON"));
    }

    #[test]
    fn test_into_string() {
        let err = HallChatError::NotConnected;
        let s: String = err.into();
        assert!(s.contains("not connected"));
    }
}

//! Error types for the sync client.

use std::path::PathBuf;

use tokio_tungstenite::tungstenite;

/// A UI command the client refused to carry out.
///
/// Returned synchronously instead of being sent, so calling code can react
/// (disable a button, show a hint) without any error plumbing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandRejected {
    #[error("not connected")]
    NotConnected,

    #[error("session not active")]
    SessionNotActive,

    #[error("no session selected")]
    NoSession,

    #[error("older history is already loading")]
    AlreadyLoading,

    #[error("no more history")]
    NoMoreHistory,

    #[error("input is empty")]
    EmptyInput,
}

impl CommandRejected {
    pub fn error_code(&self) -> &str {
        match self {
            Self::NotConnected => "not_connected",
            Self::SessionNotActive => "session_not_active",
            Self::NoSession => "no_session",
            Self::AlreadyLoading => "already_loading",
            Self::NoMoreHistory => "no_more_history",
            Self::EmptyInput => "empty_input",
        }
    }
}

/// Failures of the async [`ClientHandle`](crate::runtime::ClientHandle).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("client loop has stopped")]
    Stopped,

    #[error(transparent)]
    Rejected(#[from] CommandRejected),
}

/// Transport failures. These never reach the UI directly: a failed
/// connection surfaces as an abnormal close and goes through reconnect.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport is not open")]
    NotOpen,

    #[error("connection task has stopped")]
    TaskGone,

    #[error("no async runtime available to drive the connection")]
    NoRuntime,

    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("server is unavailable")]
    Unavailable,

    #[error(transparent)]
    WebSocket(tungstenite::Error),
}

impl TransportError {
    pub fn from_tungstenite(err: tungstenite::Error) -> Self {
        let is_connect = match &err {
            tungstenite::Error::Io(io_err) => matches!(
                io_err.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        };
        if is_connect {
            Self::Unavailable
        } else {
            Self::WebSocket(err)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("failed to write credential file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove credential file {path:?}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("credential is empty")]
    Empty,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to create data directory {path:?}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not determine home directory; pass --data-dir")]
    NoHome,

    #[error("invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_rejected_codes() {
        assert_eq!(CommandRejected::NotConnected.error_code(), "not_connected");
        assert_eq!(CommandRejected::SessionNotActive.error_code(), "session_not_active");
        assert_eq!(CommandRejected::NoMoreHistory.to_string(), "no more history");
    }

    #[test]
    fn test_refused_connection_is_unavailable() {
        let io = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        let err = TransportError::from_tungstenite(tungstenite::Error::Io(io));
        assert!(matches!(err, TransportError::Unavailable));
    }

    #[test]
    fn test_other_io_errors_pass_through() {
        let io = std::io::Error::from(std::io::ErrorKind::TimedOut);
        let err = TransportError::from_tungstenite(tungstenite::Error::Io(io));
        assert!(matches!(err, TransportError::WebSocket(_)));
    }
}

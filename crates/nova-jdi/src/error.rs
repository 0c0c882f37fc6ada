use std::io;

use thiserror::Error;

use crate::session::SessionId;
use crate::ObjectId;

pub type Result<T, E = JdiError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum JdiError {
    #[error("mirror belongs to session {mirror} but was used with session {current}")]
    SessionMismatch {
        mirror: SessionId,
        current: SessionId,
    },
    #[error("null reference where a {expected} is required")]
    NullReference { expected: &'static str },
    #[error("mirror is no longer valid: thread {thread:#x} has been resumed")]
    InvalidatedMirror { thread: ObjectId },
    #[error("absent information: {0}")]
    AbsentInformation(String),
    #[error("type {signature} has not been loaded by the target")]
    TypeNotLoaded { signature: String },
    #[error("invalid conversion: {0}")]
    InvalidConversion(String),
    #[error("invalid type signature: {0}")]
    InvalidSignature(String),
    #[error("invalid connector argument `{name}`: {reason}")]
    ConnectorArgument { name: String, reason: String },
    #[error("transport failure: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<io::Error>,
    },
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("JDWP protocol error: {0}")]
    Protocol(String),
    #[error("target command failed with error code {error_code}")]
    CommandFailed { error_code: u16 },
    #[error("session is disconnected")]
    Disconnected,
    #[error("internal error: {0}")]
    Internal(String),
}

impl JdiError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn transport_io(message: impl Into<String>, source: io::Error) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn argument(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectorArgument {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Builds an [`JdiError::Internal`] and records it; these indicate a bug in
    /// this crate rather than a problem with the target or the caller.
    #[track_caller]
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        let loc = std::panic::Location::caller();
        tracing::error!(
            target: "nova.jdi",
            file = loc.file(),
            line = loc.line(),
            "{message}"
        );
        Self::Internal(message)
    }

    pub fn is_invalidated(&self) -> bool {
        matches!(self, Self::InvalidatedMirror { .. })
    }
}

impl From<io::Error> for JdiError {
    fn from(err: io::Error) -> Self {
        Self::transport_io(err.to_string(), err)
    }
}

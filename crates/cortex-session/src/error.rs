//! Error type shared by every part of the session library.

use std::path::PathBuf;
use thiserror::Error;

use crate::state::ControllerState;

/// Errors raised by the recording lifecycle and its persistence helpers.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid subject name {name:?}: {reason}")]
    InvalidSubject { name: String, reason: &'static str },

    #[error("invalid {field}: {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    #[error("run {0} already has an active recording")]
    RunAlreadyActive(i64),

    #[error("controller already started ({0})")]
    AlreadyStarted(ControllerState),

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ControllerState,
    },

    #[error("no record to stop yet ({0})")]
    NotRecording(ControllerState),

    #[error("recording already finished ({0})")]
    Finished(ControllerState),

    /// The headset SDK rejected an outbound request.
    #[error("headset SDK error: {0}")]
    Sdk(String),

    #[error("unknown SDK event binding: {0}")]
    UnknownEvent(String),

    #[error("malformed {event} payload: {reason}")]
    MalformedEvent { event: &'static str, reason: String },

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode session parameters: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SessionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

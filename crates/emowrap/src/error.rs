//! HTTP-facing errors.
//!
//! Every error renders as `{"status": "error", "message": ...}` so the
//! frontend can treat all failures the same way.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cortex_session::SessionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed JSON, bad subject name or out-of-range parameter.
    #[error("{0}")]
    BadRequest(String),

    #[error("Record instance not found.")]
    RecordNotFound,

    /// Run id already active, or the recording is not in a stoppable state.
    #[error("{0}")]
    Conflict(String),

    /// The SDK reported an error while connecting.
    #[error("Error connecting to headset: {0}")]
    Headset(String),

    /// No readiness signal within the timeout.
    #[error("Headset not found. Please check that the headset is connected and powered on.")]
    HeadsetNotFound,

    /// Log or parameter persistence failed. Details go to the server log only.
    #[error("{0}")]
    Storage(&'static str),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RecordNotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Headset(_) => StatusCode::BAD_GATEWAY,
            Self::HeadsetNotFound => StatusCode::GATEWAY_TIMEOUT,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidSubject { .. } | SessionError::InvalidParameter { .. } => {
                Self::BadRequest(err.to_string())
            }
            SessionError::RunAlreadyActive(_)
            | SessionError::AlreadyStarted(_)
            | SessionError::InvalidState { .. }
            | SessionError::NotRecording(_) => Self::Conflict(err.to_string()),
            // Still registered while it closes; the reaper removes it shortly.
            SessionError::Finished(_) => Self::RecordNotFound,
            SessionError::Sdk(message) => Self::Headset(message),
            SessionError::UnknownEvent(_) | SessionError::MalformedEvent { .. } => {
                Self::Headset(err.to_string())
            }
            SessionError::Io { .. } | SessionError::Encode(_) => {
                tracing::error!(error = %err, "persistence failed");
                Self::Storage("Failed to write recording files")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(%status, error = %self, "request failed");
        } else {
            tracing::debug!(%status, error = %self, "request rejected");
        }

        let body = Json(serde_json::json!({
            "status": "error",
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

//! SDK lifecycle events and the sink the SDK delivers them through.
//!
//! The headset SDK reports progress through six named callbacks, each with
//! a loosely typed payload. Here they become one tagged enum so the
//! controller handles them through a single typed entry point.

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{SessionError, SessionResult};

/// One lifecycle callback from the headset SDK.
#[derive(Debug, Clone, PartialEq)]
pub enum CortexEvent {
    /// `create_session_done`: the headset was found and a session is open.
    SessionCreated,
    /// `create_record_done`: a record exists and is capturing.
    RecordCreated { record_id: String },
    /// `stop_record_done`: capture has stopped.
    RecordStopped,
    /// `warn_record_post_processing_done`: the record is ready for export.
    PostProcessingDone { record_id: String },
    /// `export_record_done`
    ExportDone,
    /// `inform_error`: anything the SDK considers a failure.
    Error { payload: Value },
}

impl CortexEvent {
    pub const BINDINGS: [&'static str; 6] = [
        "create_session_done",
        "create_record_done",
        "stop_record_done",
        "warn_record_post_processing_done",
        "export_record_done",
        "inform_error",
    ];

    /// The SDK's callback name for this event.
    pub fn binding(&self) -> &'static str {
        match self {
            CortexEvent::SessionCreated => "create_session_done",
            CortexEvent::RecordCreated { .. } => "create_record_done",
            CortexEvent::RecordStopped => "stop_record_done",
            CortexEvent::PostProcessingDone { .. } => "warn_record_post_processing_done",
            CortexEvent::ExportDone => "export_record_done",
            CortexEvent::Error { .. } => "inform_error",
        }
    }

    /// Translate a named SDK callback and its payload into a typed event.
    ///
    /// `create_record_done` needs a record `uuid` (top level or under
    /// `data`). `warn_record_post_processing_done` carries the record id
    /// either as a bare string or as `recordId`/`uuid`.
    pub fn from_binding(name: &str, payload: Value) -> SessionResult<Self> {
        match name {
            "create_session_done" => Ok(CortexEvent::SessionCreated),
            "create_record_done" => {
                let record_id = payload
                    .get("uuid")
                    .or_else(|| payload.pointer("/data/uuid"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| SessionError::MalformedEvent {
                        event: "create_record_done",
                        reason: format!("missing uuid in {payload}"),
                    })?;
                Ok(CortexEvent::RecordCreated {
                    record_id: record_id.to_string(),
                })
            }
            "stop_record_done" => Ok(CortexEvent::RecordStopped),
            "warn_record_post_processing_done" => {
                let record_id = payload
                    .as_str()
                    .or_else(|| payload.get("recordId").and_then(Value::as_str))
                    .or_else(|| payload.get("uuid").and_then(Value::as_str))
                    .ok_or_else(|| SessionError::MalformedEvent {
                        event: "warn_record_post_processing_done",
                        reason: format!("missing record id in {payload}"),
                    })?;
                Ok(CortexEvent::PostProcessingDone {
                    record_id: record_id.to_string(),
                })
            }
            "export_record_done" => Ok(CortexEvent::ExportDone),
            "inform_error" => Ok(CortexEvent::Error { payload }),
            other => Err(SessionError::UnknownEvent(other.to_string())),
        }
    }
}

/// Render an error payload for humans: bare strings stay bare, anything
/// else is compact JSON.
pub fn describe_payload(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Where an SDK client delivers events. Cheap to clone, callable from any
/// thread; delivery never blocks.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<CortexEvent>,
}

impl EventSink {
    /// Create a sink and the receiving end the controller consumes.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CortexEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Deliver an event. Returns false once the controller stopped listening.
    pub fn emit(&self, event: CortexEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Deliver a named callback, for adapters that receive string-keyed events.
    pub fn emit_binding(&self, name: &str, payload: Value) -> SessionResult<bool> {
        Ok(self.emit(CortexEvent::from_binding(name, payload)?))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

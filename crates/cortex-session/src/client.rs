//! The seam between the controller and a headset SDK.
//!
//! A `CortexClient` issues requests; it reports their outcome later through
//! the [`EventSink`] handed to `open`. Request methods return as soon as the
//! request is on its way. An `Err` means the SDK refused to even send it,
//! which the controller treats like an `inform_error` callback.

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::SessionResult;
use crate::event::EventSink;
use crate::params::SessionParameters;

/// Export of one or more finished records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRequest {
    pub folder: PathBuf,
    pub stream_types: Vec<String>,
    pub format: String,
    pub record_ids: Vec<String>,
    pub version: String,
}

/// Outbound half of a headset SDK connection.
#[async_trait]
pub trait CortexClient: Send + Sync {
    /// Restrict discovery to one headset id. Must be called before `open`.
    fn set_wanted_headset(&self, headset_id: &str);

    /// Connect, authorize and create a session. Progress arrives through
    /// `sink`: `SessionCreated` on success, `Error` otherwise.
    async fn open(&self, sink: EventSink) -> SessionResult<()>;

    async fn create_record(&self, title: &str, description: &str) -> SessionResult<()>;

    async fn stop_record(&self) -> SessionResult<()>;

    async fn export_record(&self, request: &ExportRequest) -> SessionResult<()>;

    /// Tear down the connection. Idempotent.
    async fn close(&self);
}

/// Builds one client per recording.
pub trait ClientFactory: Send + Sync {
    fn create(&self, params: &SessionParameters) -> Arc<dyn CortexClient>;
}

impl<F> ClientFactory for F
where
    F: Fn(&SessionParameters) -> Arc<dyn CortexClient> + Send + Sync,
{
    fn create(&self, params: &SessionParameters) -> Arc<dyn CortexClient> {
        self(params)
    }
}

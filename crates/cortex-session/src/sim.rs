//! Simulated headset backend.
//!
//! Behaves like a single headset on the desk: discovery takes a moment,
//! records get fresh UUIDs, and post-processing and export complete after
//! configurable delays. With `headset_present = false` the connection is
//! never confirmed, which exercises the "headset not found" path.

use async_trait::async_trait;
use emoconf::{CortexBackend, CortexConfig, SimulatedConfig};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::{ClientFactory, CortexClient, ExportRequest};
use crate::error::{SessionError, SessionResult};
use crate::event::{CortexEvent, EventSink};
use crate::params::SessionParameters;

#[derive(Debug, Default)]
struct SimState {
    sink: Option<EventSink>,
    wanted_headset: Option<String>,
    record_id: Option<String>,
}

#[derive(Debug)]
pub struct SimulatedCortex {
    config: SimulatedConfig,
    state: Mutex<SimState>,
    tasks: CancellationToken,
}

impl SimulatedCortex {
    pub fn new(config: SimulatedConfig) -> Self {
        Self {
            config,
            state: Mutex::new(SimState::default()),
            tasks: CancellationToken::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sink(&self) -> SessionResult<EventSink> {
        if self.tasks.is_cancelled() {
            return Err(SessionError::Sdk("connection closed".to_string()));
        }
        self.lock()
            .sink
            .clone()
            .ok_or_else(|| SessionError::Sdk("not connected".to_string()))
    }

    /// Deliver `events` after `delay` unless the client is closed first.
    fn emit_after(&self, sink: EventSink, delay: Duration, events: Vec<CortexEvent>) {
        let token = self.tasks.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    for event in events {
                        if !sink.emit(event) {
                            break;
                        }
                    }
                }
            }
        });
    }
}

#[async_trait]
impl CortexClient for SimulatedCortex {
    fn set_wanted_headset(&self, headset_id: &str) {
        self.lock().wanted_headset = Some(headset_id.to_string());
    }

    async fn open(&self, sink: EventSink) -> SessionResult<()> {
        if self.tasks.is_cancelled() {
            return Err(SessionError::Sdk("connection closed".to_string()));
        }
        let wanted = {
            let mut state = self.lock();
            state.sink = Some(sink.clone());
            state.wanted_headset.clone()
        };

        if !self.config.headset_present {
            info!(headset = ?wanted, "simulated discovery: no headset in range");
            return Ok(());
        }

        debug!(headset = ?wanted, "simulated discovery started");
        self.emit_after(
            sink,
            Duration::from_millis(self.config.discovery_delay_ms),
            vec![CortexEvent::SessionCreated],
        );
        Ok(())
    }

    async fn create_record(&self, title: &str, _description: &str) -> SessionResult<()> {
        let sink = self.sink()?;
        let record_id = uuid::Uuid::new_v4().to_string();
        self.lock().record_id = Some(record_id.clone());

        debug!(%record_id, title, "simulated record created");
        sink.emit(CortexEvent::RecordCreated { record_id });
        Ok(())
    }

    async fn stop_record(&self) -> SessionResult<()> {
        let sink = self.sink()?;
        let record_id = self
            .lock()
            .record_id
            .clone()
            .ok_or_else(|| SessionError::Sdk("no record in progress".to_string()))?;

        sink.emit(CortexEvent::RecordStopped);
        self.emit_after(
            sink,
            Duration::from_millis(self.config.post_processing_delay_ms),
            vec![CortexEvent::PostProcessingDone { record_id }],
        );
        Ok(())
    }

    async fn export_record(&self, request: &ExportRequest) -> SessionResult<()> {
        let sink = self.sink()?;
        debug!(
            folder = %request.folder.display(),
            records = ?request.record_ids,
            format = %request.format,
            "simulated export"
        );
        self.emit_after(
            sink,
            Duration::from_millis(self.config.export_delay_ms),
            vec![CortexEvent::ExportDone],
        );
        Ok(())
    }

    async fn close(&self) {
        self.tasks.cancel();
        self.lock().sink.take();
    }
}

/// Builds clients for the configured backend.
#[derive(Debug, Clone)]
pub struct BackendFactory {
    config: CortexConfig,
}

impl BackendFactory {
    pub fn new(config: CortexConfig) -> Self {
        Self { config }
    }
}

impl ClientFactory for BackendFactory {
    fn create(&self, _params: &SessionParameters) -> Arc<dyn CortexClient> {
        match self.config.backend {
            CortexBackend::Simulated => Arc::new(SimulatedCortex::new(self.config.simulated.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast(headset_present: bool) -> SimulatedConfig {
        SimulatedConfig {
            headset_present,
            discovery_delay_ms: 5,
            post_processing_delay_ms: 5,
            export_delay_ms: 5,
        }
    }

    async fn next(rx: &mut tokio::sync::mpsc::UnboundedReceiver<CortexEvent>) -> CortexEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no event")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn walks_through_a_full_recording() {
        let sim = SimulatedCortex::new(fast(true));
        let (sink, mut rx) = EventSink::channel();

        sim.open(sink).await.unwrap();
        assert_eq!(next(&mut rx).await, CortexEvent::SessionCreated);

        sim.create_record("recording", "").await.unwrap();
        let record_id = match next(&mut rx).await {
            CortexEvent::RecordCreated { record_id } => record_id,
            other => panic!("unexpected {other:?}"),
        };
        assert!(uuid::Uuid::parse_str(&record_id).is_ok());

        sim.stop_record().await.unwrap();
        assert_eq!(next(&mut rx).await, CortexEvent::RecordStopped);
        assert_eq!(
            next(&mut rx).await,
            CortexEvent::PostProcessingDone {
                record_id: record_id.clone()
            }
        );

        let request = ExportRequest {
            folder: "/tmp/exports".into(),
            stream_types: vec!["EEG".into()],
            format: "CSV".into(),
            record_ids: vec![record_id],
            version: "V2".into(),
        };
        sim.export_record(&request).await.unwrap();
        assert_eq!(next(&mut rx).await, CortexEvent::ExportDone);
    }

    #[tokio::test]
    async fn missing_headset_never_confirms() {
        let sim = SimulatedCortex::new(fast(false));
        let (sink, mut rx) = EventSink::channel();
        sim.open(sink).await.unwrap();

        let waited = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn close_cancels_pending_events_and_refuses_requests() {
        let mut config = fast(true);
        config.discovery_delay_ms = 50;
        let sim = SimulatedCortex::new(config);
        let (sink, mut rx) = EventSink::channel();

        sim.open(sink).await.unwrap();
        sim.close().await;

        // Every sink clone is gone once the pending task is cancelled
        let got = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .unwrap();
        assert_eq!(got, None);
        assert!(matches!(sim.stop_record().await, Err(SessionError::Sdk(_))));
    }

    #[tokio::test]
    async fn stop_without_record_is_refused() {
        let sim = SimulatedCortex::new(fast(true));
        let (sink, _rx) = EventSink::channel();
        sim.open(sink).await.unwrap();
        assert!(matches!(sim.stop_record().await, Err(SessionError::Sdk(_))));
    }
}

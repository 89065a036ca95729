//! Per-recording lifecycle controller.
//!
//! A controller owns one SDK client for one run. Its worker task opens the
//! connection and then consumes SDK events one at a time; each event moves
//! the state machine forward and triggers at most one outbound request.
//! The HTTP side only ever touches a controller through `stop_record`,
//! `abandon`, the readiness gate and `snapshot`.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use crate::client::{CortexClient, ExportRequest};
use crate::error::{SessionError, SessionResult};
use crate::event::{describe_payload, CortexEvent, EventSink};
use crate::gate::{Readiness, ReadinessGate};
use crate::log_sink::{LogLayout, LogSink};
use crate::params::SessionParameters;
use crate::state::ControllerState;

/// Result of a stop request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// Stop was sent to the SDK.
    Requested,
    /// A stop was already in flight; nothing was sent.
    AlreadyStopping,
}

/// Point-in-time view of a controller for status endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerSnapshot {
    pub run_id: i64,
    pub subject_name: String,
    pub state: ControllerState,
    pub record_id: Option<String>,
    pub error: Option<String>,
    pub log_lines: usize,
    pub log_path: PathBuf,
}

#[derive(Debug, Default)]
struct Inner {
    state: ControllerState,
    record_id: Option<String>,
    error: Option<String>,
}

pub struct SessionController {
    params: Arc<SessionParameters>,
    client: Arc<dyn CortexClient>,
    gate: ReadinessGate,
    logs: LogSink,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ControllerState>,
    cancel: CancellationToken,
    /// Held across every outbound request and across `close`, so a request
    /// whose state check passed is on the wire before the client closes.
    requests: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("run_id", &self.params.run_id)
            .field("subject", &self.params.subject_name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SessionController {
    pub fn new(
        params: SessionParameters,
        client: Arc<dyn CortexClient>,
        layout: &LogLayout,
    ) -> Arc<Self> {
        let logs = LogSink::new(layout, &params.subject_name, params.run_id);
        let (state_tx, _) = watch::channel(ControllerState::Idle);
        Arc::new(Self {
            params: Arc::new(params),
            client,
            gate: ReadinessGate::new(),
            logs,
            inner: Mutex::new(Inner::default()),
            state_tx,
            cancel: CancellationToken::new(),
            requests: tokio::sync::Mutex::new(()),
        })
    }

    pub fn params(&self) -> &SessionParameters {
        &self.params
    }

    pub fn run_id(&self) -> i64 {
        self.params.run_id
    }

    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    pub fn log_sink(&self) -> &LogSink {
        &self.logs
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ControllerState {
        self.lock().state
    }

    /// Watch published states. Terminal states are published only after
    /// logs are flushed and the client is closed.
    pub fn subscribe_state(&self) -> watch::Receiver<ControllerState> {
        self.state_tx.subscribe()
    }

    /// Wait until the controller is closed or failed and fully cleaned up.
    pub async fn finished(&self) -> ControllerState {
        let mut rx = self.subscribe_state();
        let state = match rx.wait_for(ControllerState::is_terminal).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        state
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        let inner = self.lock();
        ControllerSnapshot {
            run_id: self.params.run_id,
            subject_name: self.params.subject_name.to_string(),
            state: inner.state,
            record_id: inner.record_id.clone(),
            error: inner.error.clone(),
            log_lines: self.logs.len(),
            log_path: self.logs.path().to_path_buf(),
        }
    }

    fn set_state(&self, inner: &mut Inner, to: ControllerState) {
        let from = std::mem::replace(&mut inner.state, to);
        debug!(run_id = self.params.run_id, %from, %to, "state transition");
    }

    /// Move to `to` if the current state is one of `from`.
    fn advance(&self, event: &str, from: &[ControllerState], to: ControllerState) -> bool {
        let mut inner = self.lock();
        if !from.contains(&inner.state) {
            warn!(
                run_id = self.params.run_id,
                event,
                state = %inner.state,
                "ignoring out-of-order SDK event"
            );
            return false;
        }
        self.set_state(&mut inner, to);
        self.state_tx.send_replace(to);
        true
    }

    /// Pin the headset and spawn the worker that opens the connection.
    pub fn start(self: &Arc<Self>) -> SessionResult<JoinHandle<()>> {
        {
            let mut inner = self.lock();
            if inner.state != ControllerState::Idle {
                return Err(SessionError::AlreadyStarted(inner.state));
            }
            self.set_state(&mut inner, ControllerState::Connecting);
            self.state_tx.send_replace(ControllerState::Connecting);
        }

        if let Some(headset) = &self.params.headset_id {
            self.client.set_wanted_headset(headset);
        }

        let (sink, events) = EventSink::channel();
        let span = info_span!(
            "recording",
            run_id = self.params.run_id,
            subject = %self.params.subject_name,
        );
        let this = Arc::clone(self);
        Ok(tokio::spawn(this.run(sink, events).instrument(span)))
    }

    async fn run(self: Arc<Self>, sink: EventSink, mut events: mpsc::UnboundedReceiver<CortexEvent>) {
        self.logs.log("Connecting to headset...");

        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            opened = self.client.open(sink) => opened,
        };
        if let Err(e) = opened {
            self.fail(sdk_message(&e)).await;
            return;
        }

        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                event = events.recv() => event,
            };

            match event {
                Some(event) => self.handle(event).await,
                None => {
                    self.fail("headset connection dropped").await;
                    break;
                }
            }

            if self.state().is_terminal() {
                break;
            }
        }
        debug!(run_id = self.params.run_id, "worker finished");
    }

    async fn handle(self: &Arc<Self>, event: CortexEvent) {
        let binding = event.binding();
        debug!(run_id = self.params.run_id, event = binding, "SDK event");

        match event {
            CortexEvent::SessionCreated => {
                if !self.advance(binding, &[ControllerState::Connecting], ControllerState::SessionReady) {
                    return;
                }
                self.logs.log("Session created successfully.");
                self.gate.signal(Readiness::Ready);

                let params = Arc::clone(&self.params);
                if let Err(e) = self
                    .create_record(&params.record_title, &params.record_description)
                    .await
                {
                    debug!(run_id = self.params.run_id, error = %e, "record creation not sent");
                }
            }

            CortexEvent::RecordCreated { record_id } => {
                {
                    let mut inner = self.lock();
                    if inner.state != ControllerState::SessionReady {
                        warn!(
                            run_id = self.params.run_id,
                            event = binding,
                            state = %inner.state,
                            "ignoring out-of-order SDK event"
                        );
                        return;
                    }
                    inner.record_id = Some(record_id.clone());
                    self.set_state(&mut inner, ControllerState::RecordCreated);
                    self.state_tx.send_replace(ControllerState::RecordCreated);
                }
                self.logs.log(format!("Record created with ID: {record_id}"));

                if let Some(duration) = self.params.auto_stop() {
                    self.spawn_auto_stop(duration);
                }
            }

            CortexEvent::RecordStopped => {
                if self.advance(
                    binding,
                    &[ControllerState::RecordCreated, ControllerState::Stopping],
                    ControllerState::Stopping,
                ) {
                    self.logs.log("Recording stopped.");
                    self.logs.log("Post-processing in progress...");
                }
            }

            CortexEvent::PostProcessingDone { record_id } => {
                if !self.advance(binding, &[ControllerState::Stopping], ControllerState::PostProcessing) {
                    return;
                }
                self.logs
                    .log(format!("Post-processing completed for record {record_id}."));

                let request = self.params.export.request_for(&record_id);
                if let Err(e) = self.export_record(&request).await {
                    debug!(run_id = self.params.run_id, error = %e, "export not sent");
                }
            }

            CortexEvent::ExportDone => {
                {
                    let mut inner = self.lock();
                    if !matches!(
                        inner.state,
                        ControllerState::PostProcessing | ControllerState::Exporting
                    ) {
                        warn!(
                            run_id = self.params.run_id,
                            event = binding,
                            state = %inner.state,
                            "ignoring out-of-order SDK event"
                        );
                        return;
                    }
                    self.set_state(&mut inner, ControllerState::Closed);
                }
                self.logs.log("Data export completed successfully.");
                self.shutdown().await;
                self.state_tx.send_replace(ControllerState::Closed);
            }

            CortexEvent::Error { payload } => {
                self.fail(describe_payload(&payload)).await;
            }
        }
    }

    /// Legacy fixed-length recording: log the elapsed second, wait one
    /// second, repeat, then stop. A manual stop that lands first turns the
    /// timer into a no-op.
    fn spawn_auto_stop(self: &Arc<Self>, duration: Duration) {
        let this = Arc::clone(self);
        let secs = duration.as_secs();

        tokio::spawn(
            async move {
                this.logs.log("Recording started...");

                // First tick is immediate; each later one closes a second.
                let mut ticker = tokio::time::interval(Duration::from_secs(1));
                for elapsed in 0..=secs {
                    tokio::select! {
                        _ = this.cancel.cancelled() => return,
                        _ = ticker.tick() => {}
                    }
                    if this.state() != ControllerState::RecordCreated {
                        return;
                    }
                    if elapsed < secs {
                        this.logs.log(format!("Recording at {elapsed} seconds"));
                    }
                }

                this.logs.log("Recording ended.");
                if let Err(e) = this.stop_record().await {
                    debug!(run_id = this.params.run_id, error = %e, "auto-stop not sent");
                }
            }
            .in_current_span(),
        );
    }

    /// Ask the SDK for a new record. Only valid once the session exists.
    pub async fn create_record(&self, title: &str, description: &str) -> SessionResult<()> {
        let lane = self.requests.lock().await;
        let state = self.state();
        if state != ControllerState::SessionReady {
            return Err(SessionError::InvalidState {
                operation: "create a record",
                state,
            });
        }

        self.logs.log(format!("Creating record: {title}"));
        let result = self.client.create_record(title, description).await;
        drop(lane);
        self.outbound(result).await
    }

    /// Ask the SDK to stop recording.
    ///
    /// Returns `AlreadyStopping` when a stop is in flight, `NotRecording`
    /// before a record exists and `Finished` once the controller is done.
    pub async fn stop_record(&self) -> SessionResult<StopOutcome> {
        let lane = self.requests.lock().await;
        {
            let mut inner = self.lock();
            match inner.state {
                ControllerState::RecordCreated => {
                    self.set_state(&mut inner, ControllerState::Stopping);
                    self.state_tx.send_replace(ControllerState::Stopping);
                }
                ControllerState::Stopping
                | ControllerState::PostProcessing
                | ControllerState::Exporting => return Ok(StopOutcome::AlreadyStopping),
                state if state.is_terminal() => return Err(SessionError::Finished(state)),
                state => return Err(SessionError::NotRecording(state)),
            }
        }

        self.logs.log("Stopping record...");
        let result = self.client.stop_record().await;
        drop(lane);
        self.outbound(result).await?;
        Ok(StopOutcome::Requested)
    }

    /// Ask the SDK to export a post-processed record.
    pub async fn export_record(&self, request: &ExportRequest) -> SessionResult<()> {
        let lane = self.requests.lock().await;
        {
            let mut inner = self.lock();
            if inner.state != ControllerState::PostProcessing {
                return Err(SessionError::InvalidState {
                    operation: "export a record",
                    state: inner.state,
                });
            }
            self.set_state(&mut inner, ControllerState::Exporting);
            self.state_tx.send_replace(ControllerState::Exporting);
        }

        self.logs.log(format!(
            "Exporting record to folder: {}",
            request.folder.display()
        ));
        let result = self.client.export_record(request).await;
        drop(lane);
        self.outbound(result).await
    }

    /// Give up on this recording. Used when the headset never became ready.
    /// No outbound request except `close` follows.
    pub async fn abandon(&self, reason: impl Into<String>) {
        self.cancel.cancel();
        self.fail(reason).await;
    }

    /// A refused outbound request ends the recording like an SDK error.
    async fn outbound(&self, result: SessionResult<()>) -> SessionResult<()> {
        if let Err(e) = &result {
            self.fail(sdk_message(e)).await;
        }
        result
    }

    async fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        {
            let mut inner = self.lock();
            if inner.state.is_terminal() {
                debug!(run_id = self.params.run_id, %message, "already finished, error ignored");
                return;
            }
            inner.error = Some(message.clone());
            self.set_state(&mut inner, ControllerState::Failed);
        }

        warn!(run_id = self.params.run_id, error = %message, "recording failed");
        self.logs.log(format!("Error: {message}"));
        self.shutdown().await;
        self.gate.signal(Readiness::Failed(message));
        self.state_tx.send_replace(ControllerState::Failed);
    }

    async fn shutdown(&self) {
        self.cancel.cancel();
        if let Err(e) = self.logs.flush() {
            warn!(run_id = self.params.run_id, error = %e, "failed to save logs");
        }
        let _lane = self.requests.lock().await;
        self.client.close().await;
    }
}

fn sdk_message(err: &SessionError) -> String {
    match err {
        SessionError::Sdk(message) => message.clone(),
        other => other.to_string(),
    }
}

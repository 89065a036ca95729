//! Scriptable in-process client for tests.
//!
//! `MockCortex` records every request it receives. Events are pushed by the
//! test through [`MockCortex::emit`], queued to fire on `open`, or produced
//! automatically in responsive mode, where each request is answered with
//! the event a healthy headset would send.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

use crate::client::{ClientFactory, CortexClient, ExportRequest};
use crate::error::{SessionError, SessionResult};
use crate::event::{CortexEvent, EventSink};
use crate::params::SessionParameters;

#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    SetWantedHeadset(String),
    Open,
    CreateRecord { title: String, description: String },
    StopRecord,
    ExportRecord(ExportRequest),
    Close,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct MockCortex {
    sink: Mutex<Option<EventSink>>,
    calls: Mutex<Vec<MockCall>>,
    on_open: Mutex<Vec<CortexEvent>>,
    failure: Mutex<Option<String>>,
    responsive: bool,
    close_delay: Duration,
    request_delay: Duration,
    opened: watch::Sender<bool>,
    closed: AtomicBool,
}

impl MockCortex {
    /// Record id used by responsive mode.
    pub const RECORD_ID: &'static str = "mock-record-0001";

    /// A silent headset: requests are recorded, nothing answers.
    pub fn new() -> Self {
        let (opened, _) = watch::channel(false);
        Self {
            sink: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            on_open: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            responsive: false,
            close_delay: Duration::ZERO,
            request_delay: Duration::ZERO,
            opened,
            closed: AtomicBool::new(false),
        }
    }

    /// A healthy headset that answers every request.
    pub fn responsive() -> Self {
        Self {
            responsive: true,
            ..Self::new()
        }
    }

    /// Queue an event to be delivered as soon as `open` is called.
    pub fn on_open(self, event: CortexEvent) -> Self {
        lock(&self.on_open).push(event);
        self
    }

    /// Make `close` take `delay` before it returns, like an SDK tearing
    /// down its websocket.
    pub fn with_close_delay(self, delay: Duration) -> Self {
        Self {
            close_delay: delay,
            ..self
        }
    }

    /// Hold record, stop and export requests for `delay` before they land.
    pub fn with_request_delay(self, delay: Duration) -> Self {
        Self {
            request_delay: delay,
            ..self
        }
    }

    /// Make every later request (including `open`) fail with `message`.
    pub fn fail_requests_with(&self, message: impl Into<String>) {
        *lock(&self.failure) = Some(message.into());
    }

    /// Deliver an event as if the SDK had called back. False before `open`
    /// or once the controller stopped listening.
    pub fn emit(&self, event: CortexEvent) -> bool {
        match lock(&self.sink).as_ref() {
            Some(sink) => sink.emit(event),
            None => false,
        }
    }

    pub async fn wait_opened(&self, timeout: Duration) -> bool {
        let mut rx = self.opened.subscribe();
        let opened = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|opened| *opened)).await,
            Ok(Ok(_))
        );
        opened
    }

    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn record(&self, call: MockCall) -> SessionResult<()> {
        lock(&self.calls).push(call);
        match lock(&self.failure).as_ref() {
            Some(message) => Err(SessionError::Sdk(message.clone())),
            None => Ok(()),
        }
    }

    async fn pause(&self) {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
    }

    fn answer(&self, events: impl IntoIterator<Item = CortexEvent>) {
        if self.responsive {
            for event in events {
                self.emit(event);
            }
        }
    }
}

impl Default for MockCortex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CortexClient for MockCortex {
    fn set_wanted_headset(&self, headset_id: &str) {
        lock(&self.calls).push(MockCall::SetWantedHeadset(headset_id.to_string()));
    }

    async fn open(&self, sink: EventSink) -> SessionResult<()> {
        self.record(MockCall::Open)?;
        *lock(&self.sink) = Some(sink);
        self.opened.send_replace(true);

        let queued: Vec<CortexEvent> = lock(&self.on_open).drain(..).collect();
        for event in queued {
            self.emit(event);
        }
        self.answer([CortexEvent::SessionCreated]);
        Ok(())
    }

    async fn create_record(&self, title: &str, description: &str) -> SessionResult<()> {
        self.pause().await;
        self.record(MockCall::CreateRecord {
            title: title.to_string(),
            description: description.to_string(),
        })?;
        self.answer([CortexEvent::RecordCreated {
            record_id: Self::RECORD_ID.to_string(),
        }]);
        Ok(())
    }

    async fn stop_record(&self) -> SessionResult<()> {
        self.pause().await;
        self.record(MockCall::StopRecord)?;
        self.answer([
            CortexEvent::RecordStopped,
            CortexEvent::PostProcessingDone {
                record_id: Self::RECORD_ID.to_string(),
            },
        ]);
        Ok(())
    }

    async fn export_record(&self, request: &ExportRequest) -> SessionResult<()> {
        self.pause().await;
        self.record(MockCall::ExportRecord(request.clone()))?;
        self.answer([CortexEvent::ExportDone]);
        Ok(())
    }

    async fn close(&self) {
        lock(&self.calls).push(MockCall::Close);
        lock(&self.sink).take();
        if !self.close_delay.is_zero() {
            tokio::time::sleep(self.close_delay).await;
        }
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Hands out a fresh mock per recording and keeps them for inspection.
pub struct MockFactory {
    make: Box<dyn Fn() -> MockCortex + Send + Sync>,
    created: Mutex<Vec<Arc<MockCortex>>>,
}

impl MockFactory {
    pub fn new(make: impl Fn() -> MockCortex + Send + Sync + 'static) -> Self {
        Self {
            make: Box::new(make),
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn created(&self) -> Vec<Arc<MockCortex>> {
        lock(&self.created).clone()
    }

    pub fn last(&self) -> Option<Arc<MockCortex>> {
        lock(&self.created).last().cloned()
    }
}

impl ClientFactory for MockFactory {
    fn create(&self, _params: &SessionParameters) -> Arc<dyn CortexClient> {
        let mock = Arc::new((self.make)());
        lock(&self.created).push(Arc::clone(&mock));
        mock
    }
}

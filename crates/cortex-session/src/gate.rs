//! One-shot readiness signal between the SDK callbacks and the HTTP request.

use std::time::Duration;
use tokio::sync::watch;

/// The first outcome of connecting to the headset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Failed(String),
}

/// Fires at most once. Later signals are ignored, so whichever of
/// session-created or inform-error arrives first decides the outcome.
#[derive(Debug)]
pub struct ReadinessGate {
    slot: watch::Sender<Option<Readiness>>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot }
    }

    /// Record `value` if nothing was recorded yet. Returns whether this call won.
    pub fn signal(&self, value: Readiness) -> bool {
        let mut value = Some(value);
        self.slot.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = value.take();
            true
        })
    }

    /// The recorded outcome, if any.
    pub fn get(&self) -> Option<Readiness> {
        self.slot.borrow().clone()
    }

    pub fn is_signaled(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Wait up to `timeout` for the outcome. `None` means nothing arrived in time.
    pub async fn wait(&self, timeout: Duration) -> Option<Readiness> {
        let mut rx = self.slot.subscribe();
        let outcome = match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Ok(Ok(value)) => Option::clone(&value),
            Ok(Err(_)) | Err(_) => None,
        };
        outcome
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

//! Process-wide map of run ids to live controllers.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::controller::{ControllerSnapshot, SessionController};
use crate::error::{SessionError, SessionResult};

/// Shared between request handlers. Cloning shares the same map.
#[derive(Debug, Clone, Default)]
pub struct RecordRegistry {
    entries: Arc<DashMap<i64, Arc<SessionController>>>,
}

impl RecordRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a controller under its run id.
    ///
    /// A run id held by a live controller is refused; one held by a closed
    /// or failed controller is replaced.
    pub fn insert(&self, controller: Arc<SessionController>) -> SessionResult<()> {
        let run_id = controller.run_id();
        match self.entries.entry(run_id) {
            Entry::Occupied(mut entry) => {
                let previous = entry.get().state();
                if !previous.is_terminal() {
                    return Err(SessionError::RunAlreadyActive(run_id));
                }
                tracing::debug!(run_id, %previous, "replacing finished recording");
                entry.insert(controller);
            }
            Entry::Vacant(entry) => {
                entry.insert(controller);
            }
        }
        tracing::info!(run_id, "recording registered");
        Ok(())
    }

    pub fn get(&self, run_id: i64) -> Option<Arc<SessionController>> {
        self.entries.get(&run_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove the entry for this controller's run id, but only if it still
    /// points at this very controller.
    pub fn remove_if_same(&self, controller: &Arc<SessionController>) -> bool {
        self.entries
            .remove_if(&controller.run_id(), |_, current| Arc::ptr_eq(current, controller))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshots of every registered controller, ordered by run id.
    pub fn snapshots(&self) -> Vec<ControllerSnapshot> {
        let controllers: Vec<Arc<SessionController>> = self
            .entries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut snapshots: Vec<_> = controllers.iter().map(|c| c.snapshot()).collect();
        snapshots.sort_by_key(|s| s.run_id);
        snapshots
    }

    /// Drop the controller from the map once it has closed or failed.
    pub fn reap_when_finished(&self, controller: Arc<SessionController>) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let state = controller.finished().await;
            if registry.remove_if_same(&controller) {
                tracing::info!(run_id = controller.run_id(), %state, "recording removed from registry");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_sink::LogLayout;
    use crate::mock::MockCortex;
    use crate::params::{ExportSettings, SessionParameters, SubjectName};
    use crate::state::ControllerState;
    use emoconf::RecordingConfig;
    use std::time::Duration;

    fn controller(run_id: i64, dir: &std::path::Path) -> Arc<SessionController> {
        let recording = RecordingConfig::default();
        let params = SessionParameters::new(
            SubjectName::new("p1").unwrap(),
            run_id,
            ExportSettings::from_config(dir, &recording),
            &recording,
        );
        SessionController::new(params, Arc::new(MockCortex::new()), &LogLayout::new(dir))
    }

    #[tokio::test]
    async fn live_run_id_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RecordRegistry::new();

        registry.insert(controller(1, dir.path())).unwrap();
        let err = registry.insert(controller(1, dir.path())).unwrap_err();
        assert!(matches!(err, SessionError::RunAlreadyActive(1)));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn finished_run_id_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RecordRegistry::new();

        let first = controller(1, dir.path());
        registry.insert(Arc::clone(&first)).unwrap();
        first.abandon("gone").await;
        assert_eq!(first.state(), ControllerState::Failed);

        let second = controller(1, dir.path());
        registry.insert(Arc::clone(&second)).unwrap();
        assert!(Arc::ptr_eq(&registry.get(1).unwrap(), &second));

        // The old controller's cleanup must not evict its replacement
        assert!(!registry.remove_if_same(&first));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn unknown_run_id_is_a_miss() {
        let registry = RecordRegistry::new();
        assert!(registry.get(42).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn reaper_removes_finished_controller() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RecordRegistry::new();
        let c = controller(5, dir.path());

        registry.insert(Arc::clone(&c)).unwrap();
        let reaper = registry.reap_when_finished(Arc::clone(&c));
        assert_eq!(registry.len(), 1);

        c.abandon("Headset not found").await;
        tokio::time::timeout(Duration::from_secs(2), reaper)
            .await
            .unwrap()
            .unwrap();
        assert!(registry.get(5).is_none());
    }

    #[tokio::test]
    async fn snapshots_are_sorted_by_run_id() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RecordRegistry::new();
        for run_id in [30, 10, 20] {
            registry.insert(controller(run_id, dir.path())).unwrap();
        }

        let ids: Vec<i64> = registry.snapshots().iter().map(|s| s.run_id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
        assert!(registry
            .snapshots()
            .iter()
            .all(|s| s.state == ControllerState::Idle));
    }

    #[tokio::test]
    async fn concurrent_inserts_for_one_run_admit_exactly_one() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RecordRegistry::new();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                let c = controller(99, dir.path());
                tokio::spawn(async move { registry.insert(c).is_ok() })
            })
            .collect();

        let mut admitted = 0;
        for h in handles {
            if h.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }
}

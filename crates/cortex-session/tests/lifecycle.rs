//! Controller, registry and simulated backend working together.

use std::sync::Arc;
use std::time::Duration;

use cortex_session::mock::{MockCall, MockCortex};
use cortex_session::{
    BackendFactory, ClientFactory, ControllerState, CortexEvent, ExportSettings, LogLayout,
    ParamsStore, Readiness, RecordRegistry, SessionController, SessionParameters, StopOutcome,
    SubjectName,
};
use emoconf::{CortexConfig, RecordingConfig};
use serde_json::json;

const WAIT: Duration = Duration::from_secs(3);

fn params(subject: &str, run_id: i64, dir: &std::path::Path) -> SessionParameters {
    let recording = RecordingConfig::default();
    SessionParameters::new(
        SubjectName::new(subject).unwrap(),
        run_id,
        ExportSettings::from_config(dir.join("exports"), &recording),
        &recording,
    )
}

fn fast_backend() -> BackendFactory {
    let mut cortex = CortexConfig::default();
    cortex.simulated.discovery_delay_ms = 10;
    cortex.simulated.post_processing_delay_ms = 10;
    cortex.simulated.export_delay_ms = 10;
    BackendFactory::new(cortex)
}

async fn wait_state(controller: &SessionController, state: ControllerState) {
    let mut rx = controller.subscribe_state();
    tokio::time::timeout(WAIT, rx.wait_for(|s| *s == state))
        .await
        .expect("state not reached")
        .unwrap();
}

#[tokio::test]
async fn simulated_recording_runs_to_closed_and_is_reaped() {
    let dir = tempfile::tempdir().unwrap();
    let layout = LogLayout::new(dir.path().join("data_logs"));
    let store = ParamsStore::new(dir.path().join("data"));
    let registry = RecordRegistry::new();
    let factory = fast_backend();

    let p = params("p1", 7, dir.path());
    let client = factory.create(&p);
    let controller = SessionController::new(p, client, &layout);

    registry.insert(Arc::clone(&controller)).unwrap();
    store.save(controller.params()).unwrap();
    let reaper = registry.reap_when_finished(Arc::clone(&controller));
    controller.start().unwrap();

    assert_eq!(controller.gate().wait(WAIT).await, Some(Readiness::Ready));
    wait_state(&controller, ControllerState::RecordCreated).await;

    let record_id = controller.snapshot().record_id.unwrap();
    assert!(!record_id.is_empty());

    assert_eq!(
        registry.get(7).unwrap().stop_record().await.unwrap(),
        StopOutcome::Requested
    );
    assert_eq!(
        tokio::time::timeout(WAIT, controller.finished()).await.unwrap(),
        ControllerState::Closed
    );
    tokio::time::timeout(WAIT, reaper).await.unwrap().unwrap();
    assert!(registry.get(7).is_none());

    let log = std::fs::read_to_string(layout.path_for(&controller.params().subject_name, 7)).unwrap();
    assert!(log.contains(&format!("Record created with ID: {record_id}")));
    assert!(log.contains("Data export completed successfully."));
    assert!(store.path_for(&controller.params().subject_name, 7).exists());
}

#[tokio::test]
async fn readiness_timeout_abandons_without_further_requests() {
    let dir = tempfile::tempdir().unwrap();
    let layout = LogLayout::new(dir.path());
    let mock = Arc::new(MockCortex::new());
    let controller = SessionController::new(params("p1", 1, dir.path()), mock.clone(), &layout);

    controller.start().unwrap();
    assert!(mock.wait_opened(WAIT).await);
    assert_eq!(controller.gate().wait(Duration::from_millis(50)).await, None);

    controller.abandon("Headset not found").await;
    assert_eq!(controller.finished().await, ControllerState::Failed);

    // Events arriving after the give-up are not acted on
    mock.emit(CortexEvent::SessionCreated);
    mock.emit(CortexEvent::RecordCreated {
        record_id: "late".into(),
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(mock.calls(), vec![MockCall::Open, MockCall::Close]);
    assert!(controller.snapshot().record_id.is_none());

    let log = std::fs::read_to_string(controller.log_sink().path()).unwrap();
    assert!(log.contains("Error: Headset not found"));
}

#[tokio::test]
async fn gate_reports_first_outcome_only() {
    let dir = tempfile::tempdir().unwrap();
    let mock = Arc::new(
        MockCortex::new()
            .on_open(CortexEvent::Error {
                payload: json!({"code": -32152, "message": "No headset connected."}),
            })
            .on_open(CortexEvent::SessionCreated),
    );
    let controller =
        SessionController::new(params("p1", 2, dir.path()), mock.clone(), &LogLayout::new(dir.path()));

    controller.start().unwrap();
    let outcome = controller.gate().wait(WAIT).await;
    assert_eq!(
        outcome,
        Some(Readiness::Failed(
            r#"{"code":-32152,"message":"No headset connected."}"#.to_string()
        ))
    );
    assert_eq!(controller.finished().await, ControllerState::Failed);
    assert!(!mock
        .calls()
        .iter()
        .any(|c| matches!(c, MockCall::CreateRecord { .. })));
}

#[tokio::test]
async fn restarting_a_finished_run_reuses_its_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let layout = LogLayout::new(dir.path());
    let registry = RecordRegistry::new();

    let first = SessionController::new(
        params("p1", 3, dir.path()),
        Arc::new(MockCortex::new()),
        &layout,
    );
    registry.insert(Arc::clone(&first)).unwrap();
    first.start().unwrap();
    first.abandon("Headset not found").await;

    let second = SessionController::new(
        params("p1", 3, dir.path()),
        Arc::new(MockCortex::responsive()),
        &layout,
    );
    registry.insert(Arc::clone(&second)).unwrap();
    second.start().unwrap();
    assert_eq!(second.gate().wait(WAIT).await, Some(Readiness::Ready));
    wait_state(&second, ControllerState::RecordCreated).await;
    second.stop_record().await.unwrap();
    assert_eq!(second.finished().await, ControllerState::Closed);

    assert_eq!(first.log_sink().path(), second.log_sink().path());
    let log = std::fs::read_to_string(second.log_sink().path()).unwrap();
    let failed_at = log.find("Error: Headset not found").unwrap();
    let done_at = log.find("Data export completed successfully.").unwrap();
    assert!(failed_at < done_at);
}

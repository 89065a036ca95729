//! Callback-driven recording lifecycle for an EEG headset SDK.
//!
//! One [`SessionController`] drives one recording:
//!
//! ```text
//! open → session created → record created → (stop) → stopped
//!      → post-processing done → export requested → export done → closed
//! ```
//!
//! Every step is triggered by an SDK event delivered through an
//! [`EventSink`]. Any `inform_error` event, or an outbound request the SDK
//! refuses, ends the recording in `Failed`. The HTTP layer waits on the
//! controller's [`ReadinessGate`] for the first outcome and finds running
//! controllers again through the [`RecordRegistry`].

pub mod client;
pub mod controller;
pub mod error;
pub mod event;
pub mod gate;
pub mod log_sink;
pub mod mock;
pub mod params;
pub mod registry;
pub mod sim;
pub mod state;

pub use client::{ClientFactory, CortexClient, ExportRequest};
pub use controller::{ControllerSnapshot, SessionController, StopOutcome};
pub use error::{SessionError, SessionResult};
pub use event::{describe_payload, CortexEvent, EventSink};
pub use gate::{Readiness, ReadinessGate};
pub use log_sink::{LogEntry, LogLayout, LogSink};
pub use params::{ExportSettings, ParamsStore, PersistedParams, SessionParameters, StimulusSequence, SubjectName};
pub use registry::RecordRegistry;
pub use sim::{BackendFactory, SimulatedCortex};
pub use state::ControllerState;

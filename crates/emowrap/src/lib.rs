//! emowrap - HTTP recording controller for Emotiv EEG headsets
//!
//! This library provides:
//! - `api`: the recording endpoints and their shared state
//! - `error`: the JSON error type every endpoint returns
//! - `serve`: the server loop with graceful shutdown
//! - `telemetry`: stdout and OTLP tracing setup

pub mod api;
pub mod error;
pub mod serve;
pub mod telemetry;

pub use api::{router, AppState};
pub use error::ApiError;

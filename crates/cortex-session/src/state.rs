//! Controller lifecycle states.

use serde::Serialize;

/// Where a recording is in its lifecycle.
///
/// Transitions are driven by SDK events, plus the explicit stop request
/// and the readiness-timeout abandon. `Closed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    /// Constructed, `start()` not yet called
    #[default]
    Idle,
    /// Connection requested, waiting for the session
    Connecting,
    /// Session exists, record creation requested
    SessionReady,
    /// Record is capturing data
    RecordCreated,
    /// Stop requested or confirmed, waiting for post-processing
    Stopping,
    /// Post-processing finished, export about to be requested
    PostProcessing,
    /// Export requested, waiting for completion
    Exporting,
    /// Export done and connection closed
    Closed,
    /// SDK error, outbound failure, or readiness timeout
    Failed,
}

impl ControllerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerState::Idle => "idle",
            ControllerState::Connecting => "connecting",
            ControllerState::SessionReady => "session_ready",
            ControllerState::RecordCreated => "record_created",
            ControllerState::Stopping => "stopping",
            ControllerState::PostProcessing => "post_processing",
            ControllerState::Exporting => "exporting",
            ControllerState::Closed => "closed",
            ControllerState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ControllerState::Closed | ControllerState::Failed)
    }
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_closed_and_failed_are_terminal() {
        let terminal: Vec<_> = [
            ControllerState::Idle,
            ControllerState::Connecting,
            ControllerState::SessionReady,
            ControllerState::RecordCreated,
            ControllerState::Stopping,
            ControllerState::PostProcessing,
            ControllerState::Exporting,
            ControllerState::Closed,
            ControllerState::Failed,
        ]
        .into_iter()
        .filter(ControllerState::is_terminal)
        .collect();

        assert_eq!(terminal, vec![ControllerState::Closed, ControllerState::Failed]);
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&ControllerState::PostProcessing).unwrap();
        assert_eq!(json, "\"post_processing\"");
        assert_eq!(ControllerState::SessionReady.to_string(), "session_ready");
    }
}

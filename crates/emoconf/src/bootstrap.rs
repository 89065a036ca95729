//! Bootstrap configuration - seeds each recording session, then the session owns it.

use serde::{Deserialize, Serialize};

/// Which SDK client backs the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CortexBackend {
    /// In-process simulated headset. Useful for frontend work without hardware.
    #[default]
    Simulated,
}

/// Knobs for the simulated headset backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedConfig {
    /// Whether the simulated headset answers discovery at all.
    /// When false, start requests hit the readiness timeout.
    #[serde(default = "SimulatedConfig::default_headset_present")]
    pub headset_present: bool,

    /// Delay before the session-created event fires.
    #[serde(default = "SimulatedConfig::default_discovery_delay_ms")]
    pub discovery_delay_ms: u64,

    /// Delay between stop-done and post-processing-done.
    #[serde(default = "SimulatedConfig::default_post_processing_delay_ms")]
    pub post_processing_delay_ms: u64,

    /// Delay between an export request and export-done.
    #[serde(default = "SimulatedConfig::default_export_delay_ms")]
    pub export_delay_ms: u64,
}

impl SimulatedConfig {
    fn default_headset_present() -> bool {
        true
    }

    fn default_discovery_delay_ms() -> u64 {
        500
    }

    fn default_post_processing_delay_ms() -> u64 {
        1000
    }

    fn default_export_delay_ms() -> u64 {
        500
    }
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            headset_present: Self::default_headset_present(),
            discovery_delay_ms: Self::default_discovery_delay_ms(),
            post_processing_delay_ms: Self::default_post_processing_delay_ms(),
            export_delay_ms: Self::default_export_delay_ms(),
        }
    }
}

/// Credentials and device selection for the headset SDK.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CortexConfig {
    /// Application client id issued by the headset vendor. Read only by
    /// a live Cortex backend; the simulated backend ignores it.
    #[serde(default)]
    pub client_id: String,

    /// Application client secret, paired with `client_id` and likewise
    /// ignored by the simulated backend. Never rendered by `to_toml`.
    #[serde(default)]
    pub client_secret: String,

    /// Pin a specific headset id. Empty means "first headset found".
    #[serde(default)]
    pub headset_id: String,

    #[serde(default)]
    pub backend: CortexBackend,

    #[serde(default)]
    pub simulated: SimulatedConfig,
}

impl CortexConfig {
    pub fn wanted_headset(&self) -> Option<&str> {
        let id = self.headset_id.trim();
        (!id.is_empty()).then_some(id)
    }
}

/// Per-recording defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// How long a start request waits for the session-ready signal.
    /// Default: 3000
    #[serde(default = "RecordingConfig::default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,

    #[serde(default = "RecordingConfig::default_record_title")]
    pub record_title: String,

    #[serde(default)]
    pub record_description: String,

    /// Export file format understood by the SDK (CSV, EDF).
    #[serde(default = "RecordingConfig::default_export_format")]
    pub export_format: String,

    /// Export layout version understood by the SDK (V1, V2).
    #[serde(default = "RecordingConfig::default_export_version")]
    pub export_version: String,

    /// Data streams included in the export.
    #[serde(default = "RecordingConfig::default_stream_types")]
    pub stream_types: Vec<String>,
}

impl RecordingConfig {
    fn default_ready_timeout_ms() -> u64 {
        3000
    }

    fn default_record_title() -> String {
        "recording".to_string()
    }

    fn default_export_format() -> String {
        "CSV".to_string()
    }

    fn default_export_version() -> String {
        "V2".to_string()
    }

    fn default_stream_types() -> Vec<String> {
        ["EEG", "MOTION", "PM", "BP"]
            .into_iter()
            .map(String::from)
            .collect()
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            ready_timeout_ms: Self::default_ready_timeout_ms(),
            record_title: Self::default_record_title(),
            record_description: String::new(),
            export_format: Self::default_export_format(),
            export_version: Self::default_export_version(),
            stream_types: Self::default_stream_types(),
        }
    }
}

/// Bootstrap configuration - seeds sessions, then sessions own it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub cortex: CortexConfig,

    #[serde(default)]
    pub recording: RecordingConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_defaults() {
        let rec = RecordingConfig::default();
        assert_eq!(rec.ready_timeout_ms, 3000);
        assert_eq!(rec.export_format, "CSV");
        assert_eq!(rec.export_version, "V2");
        assert_eq!(rec.stream_types, vec!["EEG", "MOTION", "PM", "BP"]);
    }

    #[test]
    fn test_wanted_headset_blank_is_none() {
        let mut cortex = CortexConfig::default();
        assert_eq!(cortex.wanted_headset(), None);

        cortex.headset_id = "  ".to_string();
        assert_eq!(cortex.wanted_headset(), None);

        cortex.headset_id = "INSIGHT-5A68".to_string();
        assert_eq!(cortex.wanted_headset(), Some("INSIGHT-5A68"));
    }

    #[test]
    fn test_simulated_defaults() {
        let sim = SimulatedConfig::default();
        assert!(sim.headset_present);
        assert_eq!(sim.discovery_delay_ms, 500);
        assert_eq!(CortexBackend::default(), CortexBackend::Simulated);
    }
}

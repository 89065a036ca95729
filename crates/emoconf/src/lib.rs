//! Minimal configuration loading for emowrap.
//!
//! This crate provides configuration loading with minimal dependencies,
//! designed to be imported by the session library and the server alike.
//!
//! # Configuration Philosophy
//!
//! Configuration is split into two categories:
//!
//! - **Infrastructure** (`InfraConfig`): Things that physically cannot change
//!   at runtime - output paths, bind address, telemetry endpoint.
//!
//! - **Bootstrap** (`BootstrapConfig`): Initial values that seed each
//!   recording session (credentials, export settings, readiness timeout).
//!   A start request may override some of them per session.
//!
//! # Usage
//!
//! ```rust,no_run
//! use emoconf::EmoConfig;
//!
//! let config = EmoConfig::load().expect("Failed to load config");
//!
//! println!("Logs under: {}", config.infra.paths.log_dir.display());
//! println!("HTTP: {}", config.infra.bind.addr());
//! println!("Ready timeout: {}ms", config.bootstrap.recording.ready_timeout_ms);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, key by key):
//! 1. `/etc/emowrap/config.toml` (system)
//! 2. `~/.config/emowrap/config.toml` (user)
//! 3. `./emowrap.toml` (local override, or the `--config` path)
//! 4. Environment variables (`EMOWRAP_*`, `EMOTIV_CLIENT_ID`, `EMOTIV_CLIENT_SECRET`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! data_dir = "./data"
//! log_dir = "./data_logs"
//!
//! [bind]
//! host = "127.0.0.1"
//! http_port = 8000
//!
//! [telemetry]
//! otlp_endpoint = "127.0.0.1:4317"
//! log_level = "info"
//!
//! [cortex]
//! headset_id = "INSIGHT-5A688E16"
//!
//! [recording]
//! ready_timeout_ms = 3000
//! export_format = "CSV"
//! stream_types = ["EEG", "MOTION", "PM", "BP"]
//! ```

pub mod bootstrap;
pub mod infra;
pub mod loader;

pub use bootstrap::{BootstrapConfig, CortexBackend, CortexConfig, RecordingConfig, SimulatedConfig};
pub use infra::{BindConfig, InfraConfig, PathsConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete emowrap configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EmoConfig {
    /// Infrastructure - cannot change at runtime.
    #[serde(flatten)]
    pub infra: InfraConfig,

    /// Bootstrap - seeds each recording session.
    #[serde(flatten)]
    pub bootstrap: BootstrapConfig,
}

impl EmoConfig {
    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/emowrap/config.toml`
    /// 3. `~/.config/emowrap/config.toml`
    /// 4. `./emowrap.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    ///
    /// If `config_path` is provided, it takes precedence over the local
    /// `./emowrap.toml` override. System and user configs still load first.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in loader::discover_config_files_with_override(config_path) {
            let table = loader::load_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let origin = sources
            .files
            .last()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("<defaults>"));
        let mut config = loader::from_table(merged, &origin)?;

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Readiness wait for start requests.
    pub fn ready_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.bootstrap.recording.ready_timeout_ms)
    }

    /// Serialize config to TOML string. The client secret is redacted.
    pub fn to_toml(&self) -> String {
        // Build TOML manually for nicer formatting
        let mut output = String::new();
        let paths = &self.infra.paths;
        let cortex = &self.bootstrap.cortex;
        let recording = &self.bootstrap.recording;

        output.push_str("# emowrap configuration\n\n");

        output.push_str("[paths]\n");
        output.push_str(&format!("data_dir = {}\n", quoted(&paths.data_dir.to_string_lossy())));
        output.push_str(&format!("log_dir = {}\n", quoted(&paths.log_dir.to_string_lossy())));
        output.push_str(&format!(
            "export_dir = {}\n",
            quoted(&paths.export_dir.to_string_lossy())
        ));

        output.push_str("\n[bind]\n");
        output.push_str(&format!("host = {}\n", quoted(&self.infra.bind.host)));
        output.push_str(&format!("http_port = {}\n", self.infra.bind.http_port));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!(
            "otlp_endpoint = {}\n",
            quoted(&self.infra.telemetry.otlp_endpoint)
        ));
        output.push_str(&format!(
            "log_level = {}\n",
            quoted(&self.infra.telemetry.log_level)
        ));

        output.push_str("\n[cortex]\n");
        output.push_str(&format!("client_id = {}\n", quoted(&cortex.client_id)));
        if !cortex.client_secret.is_empty() {
            output.push_str("# client_secret is set (redacted)\n");
        }
        output.push_str(&format!("headset_id = {}\n", quoted(&cortex.headset_id)));
        output.push_str("backend = \"simulated\"\n");

        output.push_str("\n[cortex.simulated]\n");
        output.push_str(&format!(
            "headset_present = {}\n",
            cortex.simulated.headset_present
        ));
        output.push_str(&format!(
            "discovery_delay_ms = {}\n",
            cortex.simulated.discovery_delay_ms
        ));
        output.push_str(&format!(
            "post_processing_delay_ms = {}\n",
            cortex.simulated.post_processing_delay_ms
        ));
        output.push_str(&format!(
            "export_delay_ms = {}\n",
            cortex.simulated.export_delay_ms
        ));

        output.push_str("\n[recording]\n");
        output.push_str(&format!("ready_timeout_ms = {}\n", recording.ready_timeout_ms));
        output.push_str(&format!("record_title = {}\n", quoted(&recording.record_title)));
        output.push_str(&format!(
            "record_description = {}\n",
            quoted(&recording.record_description)
        ));
        output.push_str(&format!("export_format = {}\n", quoted(&recording.export_format)));
        output.push_str(&format!(
            "export_version = {}\n",
            quoted(&recording.export_version)
        ));
        let streams: Vec<String> = recording.stream_types.iter().map(|s| quoted(s)).collect();
        output.push_str(&format!("stream_types = [{}]\n", streams.join(", ")));

        output
    }
}

fn quoted(s: &str) -> String {
    toml::Value::String(s.to_string()).to_string()
}

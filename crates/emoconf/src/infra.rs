//! Infrastructure configuration - things that cannot change at runtime.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::loader::expand_path;

/// Filesystem paths for recording artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Where `{subject}_{run}_params.json` files are written.
    /// Default: ./data
    #[serde(default = "PathsConfig::default_data_dir")]
    pub data_dir: PathBuf,

    /// Root of the per-subject log tree (`<log_dir>/<subject>/<subject>_run<id>.txt`).
    /// Default: ./data_logs
    #[serde(default = "PathsConfig::default_log_dir")]
    pub log_dir: PathBuf,

    /// Folder handed to the SDK as the export destination.
    /// Default: ./exports
    #[serde(default = "PathsConfig::default_export_dir")]
    pub export_dir: PathBuf,
}

impl PathsConfig {
    fn default_data_dir() -> PathBuf {
        PathBuf::from("./data")
    }

    fn default_log_dir() -> PathBuf {
        PathBuf::from("./data_logs")
    }

    fn default_export_dir() -> PathBuf {
        PathBuf::from("./exports")
    }

    /// Expand `~/` and `$VAR/` prefixes in every path.
    pub(crate) fn expand(&mut self) {
        self.data_dir = expand_path(&self.data_dir.to_string_lossy());
        self.log_dir = expand_path(&self.log_dir.to_string_lossy());
        self.export_dir = expand_path(&self.export_dir.to_string_lossy());
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            log_dir: Self::default_log_dir(),
            export_dir: Self::default_export_dir(),
        }
    }
}

/// Network bind address for the HTTP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindConfig {
    /// Interface to listen on.
    /// Default: 127.0.0.1 (the stimulus frontend runs on the same machine)
    #[serde(default = "BindConfig::default_host")]
    pub host: String,

    /// HTTP port.
    /// Default: 8000
    #[serde(default = "BindConfig::default_http_port")]
    pub http_port: u16,
}

impl BindConfig {
    fn default_host() -> String {
        "127.0.0.1".to_string()
    }

    fn default_http_port() -> u16 {
        8000
    }

    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            http_port: Self::default_http_port(),
        }
    }
}

/// Telemetry and observability configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint for OpenTelemetry. Empty disables OTLP export
    /// and leaves only console logging.
    /// Default: "" (disabled)
    #[serde(default)]
    pub otlp_endpoint: String,

    /// Log level / filter directive (trace, debug, info, warn, error).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }

    pub fn otlp_enabled(&self) -> bool {
        !self.otlp_endpoint.trim().is_empty()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: String::new(),
            log_level: Self::default_log_level(),
        }
    }
}

/// Infrastructure configuration - cannot change at runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfraConfig {
    /// Filesystem paths.
    #[serde(default)]
    pub paths: PathsConfig,

    /// HTTP bind address.
    #[serde(default)]
    pub bind: BindConfig,

    /// Telemetry settings.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

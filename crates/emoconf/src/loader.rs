//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, EmoConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/emowrap/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("emowrap/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("emowrap.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a config file as a raw TOML table.
pub fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_table(&contents, path)
}

fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    contents
        .parse()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Deep-merge `overlay` into `base`. Nested tables merge key by key;
/// every other value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let toml::Value::Table(incoming) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                merge_tables(existing, incoming);
                continue;
            }
            base.insert(key, toml::Value::Table(incoming));
        } else {
            base.insert(key, value);
        }
    }
}

/// Turn a merged table into a typed config. Missing keys take defaults.
pub fn from_table(table: toml::Table, origin: &Path) -> Result<EmoConfig, ConfigError> {
    let mut config = toml::Value::Table(table)
        .try_into::<EmoConfig>()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
    config.infra.paths.expand();
    Ok(config)
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut EmoConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, |key| env::var(key).ok());
}

/// Same as [`apply_env_overrides`] with an injectable lookup, so tests do
/// not have to touch the process environment.
pub fn apply_overrides_from(
    config: &mut EmoConfig,
    sources: &mut ConfigSources,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let mut take = |key: &str| {
        let value = lookup(key);
        if value.is_some() {
            sources.env_overrides.push(key.to_string());
        }
        value
    };

    if let Some(v) = take("EMOWRAP_DATA_DIR") {
        config.infra.paths.data_dir = expand_path(&v);
    }
    if let Some(v) = take("EMOWRAP_LOG_DIR") {
        config.infra.paths.log_dir = expand_path(&v);
    }
    if let Some(v) = take("EMOWRAP_EXPORT_DIR") {
        config.infra.paths.export_dir = expand_path(&v);
    }

    if let Some(v) = take("EMOWRAP_HOST") {
        config.infra.bind.host = v;
    }
    if let Some(port) = take("EMOWRAP_HTTP_PORT").and_then(|v| v.parse::<u16>().ok()) {
        config.infra.bind.http_port = port;
    }

    if let Some(v) = take("EMOWRAP_OTLP_ENDPOINT") {
        config.infra.telemetry.otlp_endpoint = v;
    }
    // Standard OTEL variable wins over ours
    if let Some(v) = take("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.infra.telemetry.otlp_endpoint = v;
    }
    if let Some(v) = take("EMOWRAP_LOG_LEVEL") {
        config.infra.telemetry.log_level = v;
    }
    if let Some(v) = take("RUST_LOG") {
        config.infra.telemetry.log_level = v;
    }

    // Vendor-standard credential names
    if let Some(v) = take("EMOTIV_CLIENT_ID") {
        config.bootstrap.cortex.client_id = v;
    }
    if let Some(v) = take("EMOTIV_CLIENT_SECRET") {
        config.bootstrap.cortex.client_secret = v;
    }
    if let Some(v) = take("EMOWRAP_HEADSET_ID") {
        config.bootstrap.cortex.headset_id = v;
    }

    if let Some(ms) = take("EMOWRAP_READY_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
        config.bootstrap.recording.ready_timeout_ms = ms;
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            home.join(stripped)
        } else {
            PathBuf::from(path)
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                PathBuf::from(var_value).join(&stripped[slash_pos + 1..])
            } else {
                PathBuf::from(path)
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse(toml: &str) -> EmoConfig {
        let table = parse_table(toml, Path::new("test.toml")).unwrap();
        from_table(table, Path::new("test.toml")).unwrap()
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/test/path");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("test/path"));
    }

    #[test]
    fn test_expand_path_relative_untouched() {
        assert_eq!(expand_path("./data_logs"), PathBuf::from("./data_logs"));
    }

    #[test]
    fn test_discover_config_files() {
        let _files = discover_config_files();
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = parse(
            r#"
[paths]
data_dir = "/custom/data"
"#,
        );
        assert_eq!(config.infra.paths.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.infra.paths.log_dir, PathBuf::from("./data_logs"));
        assert_eq!(config.infra.bind.http_port, 8000);
    }

    #[test]
    fn test_parse_full_toml() {
        let config = parse(
            r#"
[paths]
data_dir = "/srv/eeg/data"
log_dir = "/srv/eeg/logs"

[bind]
host = "0.0.0.0"
http_port = 9000

[telemetry]
otlp_endpoint = "127.0.0.1:4317"
log_level = "debug"

[cortex]
client_id = "abc"
headset_id = "EPOCX-1234"

[cortex.simulated]
headset_present = false

[recording]
ready_timeout_ms = 1500
export_format = "EDF"
stream_types = ["EEG"]
"#,
        );

        assert_eq!(config.infra.paths.log_dir, PathBuf::from("/srv/eeg/logs"));
        assert_eq!(config.infra.bind.addr(), "0.0.0.0:9000");
        assert!(config.infra.telemetry.otlp_enabled());
        assert_eq!(config.bootstrap.cortex.wanted_headset(), Some("EPOCX-1234"));
        assert!(!config.bootstrap.cortex.simulated.headset_present);
        assert_eq!(config.bootstrap.cortex.simulated.discovery_delay_ms, 500);
        assert_eq!(config.bootstrap.recording.ready_timeout_ms, 1500);
        assert_eq!(config.bootstrap.recording.export_format, "EDF");
        assert_eq!(config.bootstrap.recording.export_version, "V2");
        assert_eq!(config.bootstrap.recording.stream_types, vec!["EEG"]);
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = parse_table("[paths\n", Path::new("broken.toml")).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_merge_tables_is_deep() {
        let mut base = parse_table(
            "[bind]\nhost = \"0.0.0.0\"\nhttp_port = 9000\n",
            Path::new("a.toml"),
        )
        .unwrap();
        let overlay = parse_table("[bind]\nhttp_port = 9100\n", Path::new("b.toml")).unwrap();

        merge_tables(&mut base, overlay);
        let config = from_table(base, Path::new("merged")).unwrap();

        assert_eq!(config.infra.bind.host, "0.0.0.0");
        assert_eq!(config.infra.bind.http_port, 9100);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("EMOWRAP_HTTP_PORT", "8123"),
            ("EMOTIV_CLIENT_SECRET", "s3cret"),
            ("EMOWRAP_READY_TIMEOUT_MS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = EmoConfig::default();
        let mut sources = ConfigSources::default();
        apply_overrides_from(&mut config, &mut sources, |k| {
            vars.get(k).map(|v| v.to_string())
        });

        assert_eq!(config.infra.bind.http_port, 8123);
        assert_eq!(config.bootstrap.cortex.client_secret, "s3cret");
        // Unparseable values leave the default alone
        assert_eq!(config.bootstrap.recording.ready_timeout_ms, 3000);
        assert!(sources.env_overrides.contains(&"EMOWRAP_HTTP_PORT".to_string()));
    }
}

//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Analysis subprocess settings.
    #[serde(default)]
    pub analysis: AnalysisSettings,

    /// Static asset settings.
    #[serde(default)]
    pub assets: AssetConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "switchboard_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Text-analysis subprocess configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisSettings {
    /// Whether chat messages are handed to the analysis script at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interpreter used to run the script.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Path to the analysis script.
    #[serde(default = "default_script")]
    pub script: String,

    /// Upper bound for one analysis run, in seconds.
    #[serde(default = "default_analysis_timeout_secs")]
    pub timeout_secs: u64,
}

/// Static asset configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetConfig {
    /// Directory with the demo pages, served as the router fallback.
    #[serde(default = "default_assets_dir")]
    pub dir: String,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_script() -> String {
    "ask_agent.py".to_string()
}

fn default_analysis_timeout_secs() -> u64 {
    120
}

fn default_assets_dir() -> String {
    "public".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interpreter: default_interpreter(),
            script: default_script(),
            timeout_secs: default_analysis_timeout_secs(),
        }
    }
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            dir: default_assets_dir(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `SWITCHBOARD_HOST` overrides `server.host`
/// - `SWITCHBOARD_PORT` overrides `server.port`
/// - `SWITCHBOARD_LOG_LEVEL` overrides `logging.level`
/// - `SWITCHBOARD_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `SWITCHBOARD_ANALYSIS_ENABLED` overrides `analysis.enabled`
/// - `SWITCHBOARD_ANALYSIS_SCRIPT` overrides `analysis.script`
/// - `SWITCHBOARD_ASSETS_DIR` overrides `assets.dir`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Ok(host) = std::env::var("SWITCHBOARD_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("SWITCHBOARD_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(level) = std::env::var("SWITCHBOARD_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("SWITCHBOARD_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(enabled) = std::env::var("SWITCHBOARD_ANALYSIS_ENABLED") {
        config.analysis.enabled = enabled == "true" || enabled == "1";
    }
    if let Ok(script) = std::env::var("SWITCHBOARD_ANALYSIS_SCRIPT") {
        config.analysis.script = script;
    }
    if let Ok(dir) = std::env::var("SWITCHBOARD_ASSETS_DIR") {
        config.assets.dir = dir;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_without_a_file() {
        let config = load_config(None).unwrap();
        assert_eq!(config.server.port, 3000);
        assert!(config.analysis.enabled);
        assert_eq!(config.assets.dir, "public");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(Some("does-not-exist.toml")).unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nport = 8080\n\n[analysis]\nenabled = false\nscript = \"agent/run.py\""
        )
        .unwrap();

        let config = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(!config.analysis.enabled);
        assert_eq!(config.analysis.script, "agent/run.py");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.analysis.timeout_secs, 120);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not toml at all [").unwrap();
        assert!(matches!(
            load_config(file.path().to_str()),
            Err(ConfigError::Parse(_))
        ));
    }
}

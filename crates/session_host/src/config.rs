//! Configuration management for the session host.
//!
//! Loads the TOML configuration file, applies command-line overrides and
//! validates the result before anything is started.

use crate::cli::CliArgs;
use serde::{Deserialize, Serialize};
use session_handling::{BackendSettings, SessionSettings};
use std::net::IpAddr;
use std::path::Path;
use tracing::info;

fn default_monitor_interval_secs() -> u64 {
    30
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Hosted session settings
    pub session: SessionSection,
    /// Endpoint and reservation policy of the in-process backend
    pub backend: BackendSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Settings for the hosted session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSection {
    /// Human-readable session name
    pub name: String,
    /// Maximum number of reserved players
    pub max_players: usize,
    /// Interval between roster statistics log lines, in seconds (0 disables)
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
    /// Session handler tunables
    #[serde(default)]
    pub handling: SessionSettings,
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            session: SessionSection {
                name: "default-session".to_string(),
                max_players: 16,
                monitor_interval_secs: default_monitor_interval_secs(),
                handling: SessionSettings::default(),
            },
            backend: BackendSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, writes the default configuration to that
    /// path and returns it.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Applies command-line overrides on top of the file values.
    pub fn apply_cli(&mut self, args: &CliArgs) {
        if let Some(port) = args.port {
            self.backend.port = port;
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.session.name.trim().is_empty() {
            return Err("Session name cannot be empty".to_string());
        }
        if self.session.max_players == 0 {
            return Err("session.max_players must be greater than 0".to_string());
        }

        if self.backend.port == 0 {
            return Err("backend.port must be between 1 and 65535".to_string());
        }
        let ip = self.backend.ip_address.trim();
        if ip.is_empty() && self.backend.dns_name.trim().is_empty() {
            return Err("backend needs an ip_address or a dns_name".to_string());
        }
        if !ip.is_empty() && ip.parse::<IpAddr>().is_err() {
            return Err(format!("Invalid backend ip_address: {ip}"));
        }

        if self.session.handling.notification_timeout_ms == 0 {
            return Err("session.handling.notification_timeout_ms must be greater than 0".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}

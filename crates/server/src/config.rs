use std::{fs, path::Path};

use anyhow::Context;
use fop::FopConfig;
use mqtt_bridge::BridgeConfig;
use serde::Deserialize;
use tracing::warn;

pub const SETTINGS_FILE: &str = "fop.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_addr: String,
    pub competition_path: String,
    /// Platforms to run. Empty means every platform named by a group.
    pub platforms: Vec<String>,
    pub log_filter: String,
    pub mqtt_enabled: bool,
    pub mqtt: BridgeConfig,
    pub fop: FopConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            competition_path: "./fixtures/demo_competition.json".into(),
            platforms: Vec::new(),
            log_filter: "info".into(),
            mqtt_enabled: false,
            mqtt: BridgeConfig::default(),
            fop: FopConfig::default(),
        }
    }
}

impl Settings {
    pub fn fop_config(&self) -> FopConfig {
        self.fop.clone()
    }
}

/// Reads `fop.toml` from the working directory, then applies environment
/// overrides. A missing file means defaults; an invalid one is reported and
/// ignored.
pub fn load_settings() -> Settings {
    let mut settings = match read_settings_file(Path::new(SETTINGS_FILE)) {
        Ok(Some(settings)) => settings,
        Ok(None) => Settings::default(),
        Err(err) => {
            warn!(error = %err, "ignoring settings file");
            Settings::default()
        }
    };
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings
}

pub fn read_settings_file(path: &Path) -> anyhow::Result<Option<Settings>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()))
        }
    };
    let settings = toml::from_str(&raw)
        .with_context(|| format!("invalid settings file '{}'", path.display()))?;
    Ok(Some(settings))
}

/// `APP__*` names win over the shorter `FOP_*` ones when both are set.
pub fn apply_env_overrides(settings: &mut Settings, env: impl Fn(&str) -> Option<String>) {
    let lookup = |short: &str, long: &str| env(long).or_else(|| env(short));

    if let Some(v) = lookup("FOP_BIND", "APP__BIND_ADDR") {
        settings.bind_addr = v;
    }
    if let Some(v) = lookup("FOP_COMPETITION", "APP__COMPETITION_PATH") {
        settings.competition_path = v;
    }
    if let Some(v) = lookup("FOP_PLATFORMS", "APP__PLATFORMS") {
        settings.platforms = v
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(v) = lookup("FOP_LOG", "APP__LOG_FILTER") {
        settings.log_filter = v;
    }

    if let Some(v) = lookup("FOP_MQTT_ENABLED", "APP__MQTT_ENABLED") {
        settings.mqtt_enabled = matches!(v.as_str(), "1" | "true" | "yes" | "on");
    }
    if let Some(v) = lookup("FOP_MQTT_HOST", "APP__MQTT_HOST") {
        settings.mqtt.host = v;
    }
    if let Some(v) = lookup("FOP_MQTT_PORT", "APP__MQTT_PORT") {
        if let Ok(parsed) = v.parse() {
            settings.mqtt.port = parsed;
        }
    }
    if let Some(v) = lookup("FOP_MQTT_PREFIX", "APP__MQTT_PREFIX") {
        settings.mqtt.prefix = v;
    }
    if let Some(v) = lookup("FOP_MQTT_CLIENT_ID", "APP__MQTT_CLIENT_ID") {
        settings.mqtt.client_id = v;
    }
    if let Some(v) = lookup("FOP_MQTT_RECONNECT_MS", "APP__MQTT_RECONNECT_DELAY_MS") {
        if let Ok(parsed) = v.parse() {
            settings.mqtt.reconnect_delay_ms = parsed;
        }
    }

    if let Some(v) = lookup("FOP_REVERSAL_WINDOW_MS", "APP__REVERSAL_WINDOW_MS") {
        if let Ok(parsed) = v.parse() {
            settings.fop.reversal_window_ms = parsed;
        }
    }
    if let Some(v) = lookup("FOP_JURY_SIZE", "APP__JURY_SIZE") {
        if let Ok(parsed) = v.parse() {
            settings.fop.jury_size = parsed;
        }
    }
    if let Some(v) = lookup("FOP_DECISION_VISIBLE_MS", "APP__DECISION_VISIBLE_MS") {
        if let Ok(parsed) = v.parse() {
            settings.fop.decision_visible_ms = parsed;
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;

use std::{collections::HashMap, fs, path::Path, time::Duration};

use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_SETTINGS_FILE: &str = "chat.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineSettings {
    pub relay_url: String,
    pub history_url: String,
    pub page_size: u32,
    pub typing_debounce_ms: u64,
    pub follow_threshold_px: f64,
    pub sentinel_threshold_px: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:8443/relay".into(),
            history_url: "http://127.0.0.1:8443/api".into(),
            page_size: 20,
            typing_debounce_ms: 2000,
            follow_threshold_px: 150.0,
            sentinel_threshold_px: 0.0,
        }
    }
}

impl EngineSettings {
    pub fn typing_debounce(&self) -> Duration {
        Duration::from_millis(self.typing_debounce_ms)
    }

    fn apply(&mut self, key: &str, value: &str) {
        match key {
            "relay_url" => self.relay_url = value.to_string(),
            "history_url" => self.history_url = value.to_string(),
            "page_size" => parse_into(key, value, &mut self.page_size),
            "typing_debounce_ms" => parse_into(key, value, &mut self.typing_debounce_ms),
            "follow_threshold_px" => parse_into(key, value, &mut self.follow_threshold_px),
            "sentinel_threshold_px" => parse_into(key, value, &mut self.sentinel_threshold_px),
            _ => {}
        }
    }
}

const KEYS: [&str; 6] = [
    "relay_url",
    "history_url",
    "page_size",
    "typing_debounce_ms",
    "follow_threshold_px",
    "sentinel_threshold_px",
];

fn parse_into<T: std::str::FromStr>(key: &str, value: &str, slot: &mut T) {
    match value.trim().parse::<T>() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(key, value, "config: ignoring unparseable value"),
    }
}

/// Defaults, then `chat.toml` (flat key/value), then `CHAT_*` and `APP__*`
/// environment variables, later sources winning.
pub fn load_settings() -> EngineSettings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> EngineSettings {
    let mut settings = EngineSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<HashMap<String, toml::Value>>(&raw) {
            Ok(file_cfg) => {
                for key in KEYS {
                    if let Some(value) = file_cfg.get(key) {
                        let text = match value {
                            toml::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        settings.apply(key, &text);
                    }
                }
            }
            Err(err) => warn!(path = %path.display(), "config: ignoring unreadable file: {err}"),
        }
    }

    for key in KEYS {
        let upper = key.to_ascii_uppercase();
        if let Some(value) = env(&format!("CHAT_{upper}")) {
            settings.apply(key, &value);
        }
        if let Some(value) = env(&format!("APP__{upper}")) {
            settings.apply(key, &value);
        }
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;

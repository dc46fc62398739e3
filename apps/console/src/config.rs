use std::{fs, str::FromStr, time::Duration};

use client_core::simulator::{
    SimulatorConfig, DEFAULT_ITEMS_PER_MINUTE, DEFAULT_MAX_STEP, DEFAULT_TICK_INTERVAL,
};
use serde::Deserialize;
use tracing::warn;

pub const CONFIG_FILE: &str = "labelctl.toml";
const STATE_DIR: &str = "labelops";
const STATE_FILE: &str = "state.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base_url: String,
    pub state_db_url: String,
    pub tick_interval_ms: u64,
    pub max_step: u8,
    pub items_per_minute: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8080".into(),
            state_db_url: default_state_db_url(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL.as_millis() as u64,
            max_step: DEFAULT_MAX_STEP,
            items_per_minute: DEFAULT_ITEMS_PER_MINUTE,
        }
    }
}

impl Settings {
    pub fn simulator_config(&self) -> SimulatorConfig {
        SimulatorConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
            max_step: self.max_step.max(1),
            items_per_minute: self.items_per_minute.max(1),
        }
    }
}

fn default_state_db_url() -> String {
    match dirs::data_dir() {
        Some(dir) => {
            let path = dir.join(STATE_DIR).join(STATE_FILE);
            format!("sqlite://{}", path.to_string_lossy().replace('\\', "/"))
        }
        None => "sqlite://./data/labelctl.db".into(),
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();
    if let Ok(raw) = fs::read_to_string(CONFIG_FILE) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_base_url: Option<String>,
    state_db_url: Option<String>,
    tick_interval_ms: Option<FileNumber>,
    max_step: Option<FileNumber>,
    items_per_minute: Option<FileNumber>,
}

/// Numbers may be written bare (`max_step = 5`) or quoted (`max_step = "5"`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FileNumber {
    Integer(i64),
    Text(String),
}

impl FileNumber {
    fn get<T>(&self, key: &str) -> Option<T>
    where
        T: TryFrom<i64> + FromStr,
    {
        let parsed = match self {
            Self::Integer(value) => T::try_from(*value).ok(),
            Self::Text(value) => value.trim().parse().ok(),
        };
        if parsed.is_none() {
            warn!(key, value = ?self, "ignoring out-of-range setting");
        }
        parsed
    }
}

/// Applies `labelctl.toml` contents. A file that is not valid TOML is
/// skipped as a whole; a single bad number only skips that key.
pub fn apply_file(settings: &mut Settings, raw: &str) {
    let file_cfg = match toml::from_str::<FileSettings>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(err) => {
            warn!(file = CONFIG_FILE, error = %err, "ignoring unreadable config file");
            return;
        }
    };
    if let Some(v) = file_cfg.api_base_url {
        settings.api_base_url = v;
    }
    if let Some(v) = file_cfg.state_db_url {
        settings.state_db_url = v;
    }
    if let Some(v) = file_cfg
        .tick_interval_ms
        .and_then(|v| v.get("tick_interval_ms"))
    {
        settings.tick_interval_ms = v;
    }
    if let Some(v) = file_cfg.max_step.and_then(|v| v.get("max_step")) {
        settings.max_step = v;
    }
    if let Some(v) = file_cfg
        .items_per_minute
        .and_then(|v| v.get("items_per_minute"))
    {
        settings.items_per_minute = v;
    }
}

pub fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("LABELOPS_API_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = lookup("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = lookup("APP__STATE_DB_URL") {
        settings.state_db_url = v;
    }

    if let Some(v) = lookup("APP__TICK_INTERVAL_MS").and_then(|v| v.parse().ok()) {
        settings.tick_interval_ms = v;
    }
    if let Some(v) = lookup("APP__MAX_STEP").and_then(|v| v.parse().ok()) {
        settings.max_step = v;
    }
    if let Some(v) = lookup("APP__ITEMS_PER_MINUTE").and_then(|v| v.parse().ok()) {
        settings.items_per_minute = v;
    }
}

/// Turns the configured state location into a sqlite URL. Bare paths, with
/// or without a `sqlite:` prefix, become `sqlite://` URLs with forward
/// slashes; URLs that already name a scheme pass through. `Storage::new`
/// creates the parent directory.
pub fn state_database_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return default_state_db_url();
    }
    if raw.contains("://") || raw.starts_with("sqlite::memory:") {
        return raw.to_string();
    }
    let path = raw.strip_prefix("sqlite:").unwrap_or(raw);
    format!("sqlite://{}", path.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;

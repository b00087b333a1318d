//! Desired configuration, its persistence, and agent settings.

use crate::errors::AutomationError;
use crate::field::{FieldSpec, FieldValue};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Desired state of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSetting {
    /// `false` leaves the host's own value untouched.
    pub enabled: bool,
    pub value: FieldValue,
}

/// Key to desired state, for every known field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DesiredConfig {
    fields: BTreeMap<String, FieldSetting>,
}

impl DesiredConfig {
    /// Every field enabled at its default value.
    pub fn template(fields: &[FieldSpec]) -> Self {
        let fields = fields
            .iter()
            .map(|spec| {
                (
                    spec.key.clone(),
                    FieldSetting {
                        enabled: true,
                        value: spec.default.clone(),
                    },
                )
            })
            .collect();
        Self { fields }
    }

    /// Overlay a persisted record onto the template.
    ///
    /// Unknown keys are dropped. A key whose record is missing or unusable
    /// keeps its template entry. A bare value (the shape used before
    /// per-field switches existed) counts as an enabled setting.
    pub fn merge_onto_template(fields: &[FieldSpec], raw: &Value) -> Self {
        let mut config = Self::template(fields);
        let Some(record) = raw.as_object() else {
            warn!("Stored configuration is not an object, using defaults");
            return config;
        };
        for (key, stored) in record {
            let Some(spec) = fields.iter().find(|f| &f.key == key) else {
                debug!(key = %key, "Ignoring unknown configuration key");
                continue;
            };
            let Some(slot) = config.fields.get_mut(key) else {
                continue;
            };
            let (enabled, value) = match stored {
                Value::Object(entry) => (
                    entry.get("enabled").and_then(Value::as_bool),
                    entry.get("value"),
                ),
                bare => (Some(true), Some(bare)),
            };
            if let Some(enabled) = enabled {
                slot.enabled = enabled;
            }
            let Some(value) = value else {
                continue;
            };
            match serde_json::from_value::<FieldValue>(value.clone()) {
                Ok(parsed) if spec.kind.accepts(&parsed) => slot.value = parsed,
                _ => warn!(key = %key, %value, "Stored value has the wrong type, keeping default"),
            }
        }
        config
    }

    pub fn get(&self, key: &str) -> Option<&FieldSetting> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: &str, setting: FieldSetting) {
        self.fields.insert(key.to_string(), setting);
    }

    /// The value to drive `key` to, or `None` when it is disabled or unknown.
    pub fn desired(&self, key: &str) -> Option<&FieldValue> {
        self.fields
            .get(key)
            .filter(|setting| setting.enabled)
            .map(|setting| &setting.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldSetting)> {
        self.fields.iter()
    }

    pub fn to_json(&self) -> Result<Value, AutomationError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Opaque persistence of the user's preferences.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// The stored record, `None` when nothing was ever saved.
    async fn get(&self) -> Result<Option<Value>, AutomationError>;

    async fn set(&self, value: Value) -> Result<(), AutomationError>;

    /// Load and merge onto the template of `fields`. An unreadable record
    /// falls back to the template; only storage failures are errors.
    async fn load(&self, fields: &[FieldSpec]) -> Result<DesiredConfig, AutomationError> {
        match self.get().await {
            Ok(Some(raw)) => Ok(DesiredConfig::merge_onto_template(fields, &raw)),
            Ok(None) => Ok(DesiredConfig::template(fields)),
            Err(AutomationError::Serialization(e)) => {
                warn!(error = %e, "Stored configuration is corrupt, using defaults");
                Ok(DesiredConfig::template(fields))
            }
            Err(e) => Err(e),
        }
    }

    async fn save(&self, config: &DesiredConfig) -> Result<(), AutomationError> {
        self.set(config.to_json()?).await
    }
}

#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    record: Mutex<Option<Value>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: Value) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self) -> Result<Option<Value>, AutomationError> {
        Ok(self
            .record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn set(&self, value: Value) -> Result<(), AutomationError> {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
        Ok(())
    }
}

/// A JSON document on disk, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "config.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ConfigStore for JsonFileStore {
    async fn get(&self) -> Result<Option<Value>, AutomationError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, value: Value) -> Result<(), AutomationError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let bytes = serde_json::to_vec_pretty(&value)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, bytes).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        debug!(path = %self.path.display(), "Configuration saved");
        Ok(())
    }
}

pub const DEFAULT_PAGE_PREFIX: &str = "https://aistudio.google.com/prompts/";

/// Execution parameters of the agent. Every field has a default; durations
/// are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub page_load_timeout_ms: u64,
    pub page_poll_interval_ms: u64,
    pub initial_delay_ms: u64,
    pub panel_open_timeout_ms: u64,
    pub option_panel_timeout_ms: u64,
    pub wait_poll_interval_ms: u64,
    pub settle_delay_ms: u64,
    pub focus_restore_delay_ms: u64,
    pub navigation_poll_interval_ms: u64,
    pub close_panel_after_run: bool,
    pub page_url_prefix: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            retry_delay_ms: 2000,
            page_load_timeout_ms: 60_000,
            page_poll_interval_ms: 500,
            initial_delay_ms: 1000,
            panel_open_timeout_ms: 3000,
            option_panel_timeout_ms: 2000,
            wait_poll_interval_ms: 50,
            settle_delay_ms: 100,
            focus_restore_delay_ms: 100,
            navigation_poll_interval_ms: 500,
            close_panel_after_run: false,
            page_url_prefix: DEFAULT_PAGE_PREFIX.to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, AutomationError> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| AutomationError::Config(format!("{name}: cannot parse '{raw}'"))),
    }
}

impl AgentSettings {
    /// Defaults overridden by `AUTOSET_*` environment variables.
    pub fn from_env() -> Result<Self, AutomationError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`AgentSettings::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AutomationError> {
        let mut settings = Self::default();
        if let Some(v) = env_parse(&lookup, "AUTOSET_MAX_ATTEMPTS")? {
            settings.max_attempts = v;
        }
        if let Some(v) = env_parse(&lookup, "AUTOSET_RETRY_DELAY_MS")? {
            settings.retry_delay_ms = v;
        }
        if let Some(v) = env_parse(&lookup, "AUTOSET_PAGE_LOAD_TIMEOUT_MS")? {
            settings.page_load_timeout_ms = v;
        }
        if let Some(v) = env_parse(&lookup, "AUTOSET_INITIAL_DELAY_MS")? {
            settings.initial_delay_ms = v;
        }
        if let Some(v) = env_parse(&lookup, "AUTOSET_CLOSE_PANEL_AFTER_RUN")? {
            settings.close_panel_after_run = v;
        }
        if let Some(prefix) = lookup("AUTOSET_PAGE_URL_PREFIX") {
            settings.page_url_prefix = prefix;
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), AutomationError> {
        if self.max_attempts == 0 {
            return Err(AutomationError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("page_poll_interval_ms", self.page_poll_interval_ms),
            ("wait_poll_interval_ms", self.wait_poll_interval_ms),
            ("navigation_poll_interval_ms", self.navigation_poll_interval_ms),
        ] {
            if value == 0 {
                return Err(AutomationError::Config(format!("{name} must be positive")));
            }
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_millis(self.page_load_timeout_ms)
    }

    pub fn page_poll_interval(&self) -> Duration {
        Duration::from_millis(self.page_poll_interval_ms)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn panel_open_timeout(&self) -> Duration {
        Duration::from_millis(self.panel_open_timeout_ms)
    }

    pub fn option_panel_timeout(&self) -> Duration {
        Duration::from_millis(self.option_panel_timeout_ms)
    }

    pub fn wait_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wait_poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn focus_restore_delay(&self) -> Duration {
        Duration::from_millis(self.focus_restore_delay_ms)
    }

    pub fn navigation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.navigation_poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn missing_keys_take_template_defaults() {
        let fields = presets::catalogue();
        let config = DesiredConfig::merge_onto_template(
            &fields,
            &json!({ "temperature": { "enabled": true, "value": 1.2 } }),
        );
        assert_eq!(config.desired("temperature"), Some(&FieldValue::Number(1.2)));
        assert_eq!(config.desired("topP"), Some(&FieldValue::Number(0.0)));
        assert_eq!(
            config.desired("mediaResolution"),
            Some(&FieldValue::Choice("Low".into()))
        );
    }

    #[test]
    fn legacy_bare_values_are_enabled_settings() {
        let fields = presets::catalogue();
        let config = DesiredConfig::merge_onto_template(
            &fields,
            &json!({ "temperature": 0.3, "mediaResolution": "High", "bogus": 1 }),
        );
        assert_eq!(config.desired("temperature"), Some(&FieldValue::Number(0.3)));
        assert_eq!(
            config.desired("mediaResolution"),
            Some(&FieldValue::Choice("High".into()))
        );
        assert!(config.get("bogus").is_none());
    }

    #[test]
    fn wrong_types_and_disabled_entries() {
        let fields = presets::catalogue();
        let config = DesiredConfig::merge_onto_template(
            &fields,
            &json!({
                "temperature": { "enabled": true, "value": "hot" },
                "topP": { "enabled": false, "value": 0.5 },
            }),
        );
        assert_eq!(config.desired("temperature"), Some(&FieldValue::Number(0.7)));
        assert_eq!(config.desired("topP"), None);
        assert_eq!(config.get("topP").map(|s| s.value.clone()), Some(FieldValue::Number(0.5)));

        let fallback = DesiredConfig::merge_onto_template(&fields, &json!([1, 2]));
        assert_eq!(fallback, DesiredConfig::template(&fields));
    }

    #[tokio::test]
    async fn file_store_round_trips_and_tolerates_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("autoset.json"));
        let fields = presets::catalogue();

        assert_eq!(store.load(&fields).await.unwrap(), DesiredConfig::template(&fields));

        let mut config = DesiredConfig::template(&fields);
        config.set(
            "temperature",
            FieldSetting {
                enabled: true,
                value: FieldValue::Number(1.5),
            },
        );
        store.save(&config).await.unwrap();
        assert_eq!(store.load(&fields).await.unwrap(), config);
        assert!(!store.temp_path().exists());

        tokio::fs::write(store.path(), b"{not json").await.unwrap();
        assert_eq!(store.load(&fields).await.unwrap(), DesiredConfig::template(&fields));
    }

    #[test]
    fn settings_read_overrides_and_validate() {
        let vars: HashMap<&str, &str> = [
            ("AUTOSET_MAX_ATTEMPTS", "3"),
            ("AUTOSET_RETRY_DELAY_MS", "250"),
            ("AUTOSET_CLOSE_PANEL_AFTER_RUN", "true"),
        ]
        .into_iter()
        .collect();
        let settings =
            AgentSettings::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.retry_delay(), Duration::from_millis(250));
        assert!(settings.close_panel_after_run);
        assert_eq!(settings.page_load_timeout(), Duration::from_secs(60));

        let zero = AgentSettings::from_lookup(|name| {
            (name == "AUTOSET_MAX_ATTEMPTS").then(|| "0".to_string())
        });
        assert!(matches!(zero, Err(AutomationError::Config(_))));

        let garbage = AgentSettings::from_lookup(|name| {
            (name == "AUTOSET_RETRY_DELAY_MS").then(|| "soon".to_string())
        });
        assert!(matches!(garbage, Err(AutomationError::Config(_))));
    }
}

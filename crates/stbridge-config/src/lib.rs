//! Configuration for the stbridge binary.
//!
//! TOML file + `STBRIDGE_` environment overrides via figment, secret
//! resolution (plaintext, then system keyring), translation to
//! `stbridge_core::BridgeConfig`, and the on-disk token store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stbridge_api::{CredentialSet, RetryPolicy, TlsMode};
use stbridge_core::{ApiConfig, BridgeConfig, DeviceConfig, DiscoveryConfig, Intervals};

mod credentials;

pub use credentials::FileCredentialStore;

/// Service name for keyring entries.
pub const KEYRING_SERVICE: &str = "stbridge";

const REDACTED: &str = "********";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Root of every state and command topic.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    #[serde(default)]
    pub mqtt: MqttSettings,

    #[serde(default)]
    pub smartthings: SmartThingsSettings,

    #[serde(default)]
    pub home_assistant: HomeAssistantSettings,

    #[serde(default)]
    pub intervals: IntervalSettings,

    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            mqtt: MqttSettings::default(),
            smartthings: SmartThingsSettings::default(),
            home_assistant: HomeAssistantSettings::default(),
            intervals: IntervalSettings::default(),
            devices: Vec::new(),
        }
    }
}

fn default_app_name() -> String {
    "stac2mqtt".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MqttSettings {
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Client identifier; defaults to the app name.
    pub client_id: Option<String>,

    pub username: Option<String>,

    /// Plaintext password (prefer keyring).
    pub password: Option<String>,

    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: None,
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive(),
        }
    }
}

fn default_mqtt_host() -> String {
    "localhost".into()
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_keep_alive() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmartThingsSettings {
    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Seed values used until the token file exists.
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    /// Plaintext client secret (prefer keyring).
    pub client_secret: Option<String>,

    /// Token file; defaults to `tokens.json` next to the config file.
    pub token_file: Option<PathBuf>,

    /// Additional CA certificate (PEM).
    pub ca_cert: Option<PathBuf>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for SmartThingsSettings {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token_url: default_token_url(),
            access_token: None,
            refresh_token: None,
            client_id: None,
            client_secret: None,
            token_file: None,
            ca_cert: None,
            timeout_secs: default_timeout(),
        }
    }
}

fn default_api_base() -> String {
    stbridge_api::DEFAULT_API_BASE.into()
}
fn default_token_url() -> String {
    stbridge_api::DEFAULT_TOKEN_URL.into()
}
fn default_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HomeAssistantSettings {
    #[serde(default = "default_true")]
    pub discovery_enabled: bool,

    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,
}

impl Default for HomeAssistantSettings {
    fn default() -> Self {
        Self {
            discovery_enabled: true,
            discovery_prefix: default_discovery_prefix(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_discovery_prefix() -> String {
    "homeassistant".into()
}

/// Timing knobs, all in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IntervalSettings {
    pub settle_delay_ms: u64,
    pub update_interval_ms: u64,
    pub sensing_delay_ms: u64,
    pub reread_short_ms: u64,
    pub reread_long_ms: u64,
    pub error_retry_delay_ms: u64,
    pub conflict_base_delay_ms: u64,
    pub conflict_max_retries: u32,
    pub trigger_sensing: bool,
}

impl Default for IntervalSettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: 10_000,
            update_interval_ms: 600_000,
            sensing_delay_ms: 5_000,
            reread_short_ms: 500,
            reread_long_ms: 2_000,
            error_retry_delay_ms: 10_000,
            conflict_base_delay_ms: 2_000,
            conflict_max_retries: 3,
            trigger_sensing: true,
        }
    }
}

/// One `[[devices]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DeviceEntry {
    pub id: String,
    pub name: Option<String>,
    pub area: Option<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "stbridge", "stbridge").map_or_else(
        || PathBuf::from("stbridge.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load from `path` (must exist) merged with `STBRIDGE_` env overrides.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    figment_for(path)
}

fn figment_for(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("STBRIDGE_").split("__"))
        .extract()?;
    Ok(config)
}

/// Render a config as TOML, e.g. for a starter file.
pub fn to_toml(config: &Config) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(config)?)
}

// ── Translation ─────────────────────────────────────────────────────

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

fn parse_url(field: &str, raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse()
        .map_err(|e| invalid(field, format!("invalid URL {raw:?}: {e}")))
}

impl Config {
    /// Build the runtime bridge configuration.
    pub fn to_bridge_config(&self, app_version: &str) -> Result<BridgeConfig, ConfigError> {
        if self.devices.is_empty() {
            return Err(invalid("devices", "at least one device is required"));
        }
        let iv = &self.intervals;
        if iv.update_interval_ms == 0 {
            return Err(invalid("intervals.update_interval_ms", "must be greater than zero"));
        }

        let st = &self.smartthings;
        let api = ApiConfig {
            api_base: parse_url("smartthings.api_base", &st.api_base)?,
            token_url: parse_url("smartthings.token_url", &st.token_url)?,
            tls: st
                .ca_cert
                .clone()
                .map_or(TlsMode::System, TlsMode::CustomCa),
            timeout: Duration::from_secs(st.timeout_secs),
            retry: RetryPolicy {
                max_retries: iv.conflict_max_retries,
                base_delay: millis(iv.conflict_base_delay_ms),
            },
        };

        let config = BridgeConfig {
            app_name: self.app_name.clone(),
            app_version: app_version.into(),
            api,
            intervals: Intervals {
                settle_delay: millis(iv.settle_delay_ms),
                update_interval: millis(iv.update_interval_ms),
                sensing_delay: millis(iv.sensing_delay_ms),
                reread_short: millis(iv.reread_short_ms),
                reread_long: millis(iv.reread_long_ms),
                error_retry_delay: millis(iv.error_retry_delay_ms),
            },
            trigger_sensing: iv.trigger_sensing,
            discovery: DiscoveryConfig {
                enabled: self.home_assistant.discovery_enabled,
                prefix: self.home_assistant.discovery_prefix.clone(),
            },
            devices: self
                .devices
                .iter()
                .map(|d| DeviceConfig {
                    device_id: d.id.clone(),
                    name: d.name.clone(),
                    area: d.area.clone(),
                })
                .collect(),
        };
        config
            .validate()
            .map_err(|e| invalid("config", e.to_string()))?;
        Ok(config)
    }

    /// Token file location for a config loaded from `config_file`.
    pub fn token_file(&self, config_file: &Path) -> PathBuf {
        self.smartthings.token_file.clone().unwrap_or_else(|| {
            config_file
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("tokens.json")
        })
    }

    /// Credentials from the config file, used until a token file exists.
    pub fn seed_credentials(&self) -> CredentialSet {
        let st = &self.smartthings;
        CredentialSet {
            access_token: st.access_token.clone().map(SecretString::from),
            refresh_token: st.refresh_token.clone().map(SecretString::from),
            client_id: st.client_id.clone(),
            client_secret: resolve_client_secret(st),
            last_updated: None,
        }
    }

    /// MQTT password: plaintext, then keyring under `mqtt/{username}`.
    pub fn mqtt_password(&self) -> Option<SecretString> {
        if let Some(ref pw) = self.mqtt.password {
            return Some(SecretString::from(pw.clone()));
        }
        let username = self.mqtt.username.as_deref()?;
        keyring_secret(&format!("mqtt/{username}"))
    }

    /// Copy with every plaintext secret masked, for display.
    pub fn redacted(&self) -> Self {
        let mask = |v: Option<&String>| v.map(|_| REDACTED.to_owned());
        let mut copy = self.clone();
        copy.mqtt.password = mask(self.mqtt.password.as_ref());
        copy.smartthings.access_token = mask(self.smartthings.access_token.as_ref());
        copy.smartthings.refresh_token = mask(self.smartthings.refresh_token.as_ref());
        copy.smartthings.client_secret = mask(self.smartthings.client_secret.as_ref());
        copy
    }
}

// ── Secret resolution ───────────────────────────────────────────────

/// Client secret: plaintext, then keyring under `{client_id}/client-secret`.
pub fn resolve_client_secret(st: &SmartThingsSettings) -> Option<SecretString> {
    if let Some(ref secret) = st.client_secret {
        return Some(SecretString::from(secret.clone()));
    }
    let client_id = st.client_id.as_deref()?;
    keyring_secret(&format!("{client_id}/client-secret"))
}

fn keyring_secret(user: &str) -> Option<SecretString> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, user).ok()?;
    match entry.get_password() {
        Ok(secret) => Some(SecretString::from(secret)),
        Err(e) => {
            tracing::debug!(entry = user, error = %e, "no keyring secret");
            None
        }
    }
}

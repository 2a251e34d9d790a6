// ── Runtime bridge configuration ──
//
// These types describe *what* to bridge and how fast. They never touch
// disk: the binary builds a `BridgeConfig` from `stbridge-config` and
// hands it in.

use std::time::Duration;

use stbridge_api::{DEFAULT_API_BASE, DEFAULT_TOKEN_URL, RetryPolicy, TlsMode};
use url::Url;

use crate::error::CoreError;
use crate::topics::TopicScheme;

/// Vendor API connection settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Device API root, e.g. `https://api.smartthings.com/v1/devices`.
    pub api_base: Url,
    /// OAuth token endpoint used by the refresh protocol.
    pub token_url: Url,
    pub tls: TlsMode,
    /// Per-request timeout. In-flight calls are never cancelled early.
    pub timeout: Duration,
    /// Backoff for HTTP 409.
    pub retry: RetryPolicy,
}

impl ApiConfig {
    /// Defaults pointing at the public vendor endpoints.
    pub fn vendor_defaults() -> Result<Self, CoreError> {
        Ok(Self {
            api_base: parse_url("api_base", DEFAULT_API_BASE)?,
            token_url: parse_url("token_url", DEFAULT_TOKEN_URL)?,
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        })
    }
}

fn parse_url(field: &str, raw: &str) -> Result<Url, CoreError> {
    Url::parse(raw).map_err(|e| CoreError::Config {
        message: format!("{field}: {e}"),
    })
}

/// Timing of the per-device loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    /// Wait after registration before the first read or write.
    pub settle_delay: Duration,
    /// Period of the status poll.
    pub update_interval: Duration,
    /// Wait between the sensing trigger and the status read.
    pub sensing_delay: Duration,
    /// First re-read after a command.
    pub reread_short: Duration,
    /// Second re-read after a command.
    pub reread_long: Duration,
    /// Wait before retrying a failed registration.
    pub error_retry_delay: Duration,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(10),
            update_interval: Duration::from_secs(600),
            sensing_delay: Duration::from_secs(5),
            reread_short: Duration::from_millis(500),
            reread_long: Duration::from_secs(2),
            error_retry_delay: Duration::from_secs(10),
        }
    }
}

/// One managed device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub device_id: String,
    /// Display name for discovery. Falls back to the device id.
    pub name: Option<String>,
    /// Suggested area for discovery.
    pub area: Option<String>,
}

impl DeviceConfig {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            name: None,
            area: None,
        }
    }
}

/// Home Assistant style discovery settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    /// Topic prefix, usually `homeassistant`.
    pub prefix: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: "homeassistant".into(),
        }
    }
}

/// Everything the [`Bridge`](crate::Bridge) needs at runtime.
///
/// Built by the binary, passed to the bridge -- core never reads config files.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Root of every state and command topic.
    pub app_name: String,
    /// Reported as `sw_version` in discovery payloads.
    pub app_version: String,
    pub api: ApiConfig,
    pub intervals: Intervals,
    /// Send `triggerManualSensing` before each periodic read.
    pub trigger_sensing: bool,
    pub discovery: DiscoveryConfig,
    pub devices: Vec<DeviceConfig>,
}

impl BridgeConfig {
    /// A config with vendor defaults and no devices.
    pub fn new(app_name: impl Into<String>) -> Result<Self, CoreError> {
        Ok(Self {
            app_name: app_name.into(),
            app_version: env!("CARGO_PKG_VERSION").into(),
            api: ApiConfig::vendor_defaults()?,
            intervals: Intervals::default(),
            trigger_sensing: true,
            discovery: DiscoveryConfig::default(),
            devices: Vec::new(),
        })
    }

    pub fn topics(&self) -> TopicScheme {
        TopicScheme::new(&self.app_name, &self.discovery.prefix)
    }

    /// Reject values the bridge cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.app_name.trim().is_empty() || self.app_name.contains(['/', '+', '#']) {
            return Err(CoreError::Config {
                message: format!("app_name {:?} is not a valid topic segment", self.app_name),
            });
        }
        if self.intervals.update_interval.is_zero() {
            return Err(CoreError::Config {
                message: "update_interval must be greater than zero".into(),
            });
        }
        let mut seen = std::collections::HashSet::new();
        for device in &self.devices {
            if device.device_id.trim().is_empty() {
                return Err(CoreError::Config {
                    message: "device_id must not be empty".into(),
                });
            }
            if !seen.insert(device.device_id.as_str()) {
                return Err(CoreError::Config {
                    message: format!("device {} is listed twice", device.device_id),
                });
            }
        }
        Ok(())
    }
}

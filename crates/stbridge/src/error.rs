//! Binary error type with miette diagnostics and process exit codes.

use miette::Diagnostic;
use thiserror::Error;

use stbridge_config::ConfigError;
use stbridge_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONFIG: i32 = 4;
    pub const PROBE: i32 = 5;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum BridgeError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file not found")]
    #[diagnostic(
        code(stbridge::no_config),
        help(
            "Expected at: {path}\n\
             Pass --config <FILE> or set STBRIDGE_CONFIG."
        )
    )]
    NoConfig { path: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(stbridge::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(stbridge::config))]
    Config(Box<figment::Error>),

    // ── SmartThings ──────────────────────────────────────────────────
    #[error("SmartThings authentication failed: {message}")]
    #[diagnostic(
        code(stbridge::auth_failed),
        help(
            "Check refresh_token, client_id and client_secret under [smartthings].\n\
             A stale token file can be deleted to reseed it from the config."
        )
    )]
    AuthFailed { message: String },

    #[error("Could not reach {target}: {reason}")]
    #[diagnostic(code(stbridge::connection))]
    Connection { target: String, reason: String },

    #[error("{failed} of {total} devices failed the probe")]
    #[diagnostic(code(stbridge::probe_failed))]
    ProbeFailed { failed: usize, total: usize },

    #[error(transparent)]
    #[diagnostic(code(stbridge::core))]
    Core(CoreError),

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoConfig { .. } | Self::Config(_) => exit_code::CONFIG,
            Self::Validation { .. } => exit_code::USAGE,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::Connection { .. } => exit_code::CONNECTION,
            Self::ProbeFailed { .. } => exit_code::PROBE,
            Self::Core(_) | Self::Io(_) => exit_code::GENERAL,
        }
    }
}

impl From<ConfigError> for BridgeError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound { path } => Self::NoConfig {
                path: path.display().to_string(),
            },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::Figment(err) => Self::Config(err),
            ConfigError::Serialization(err) => Self::Validation {
                field: "config".into(),
                reason: err.to_string(),
            },
        }
    }
}

impl From<CoreError> for BridgeError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AuthenticationFailed { message } => Self::AuthFailed { message },
            CoreError::Network { reason } => Self::Connection {
                target: "SmartThings".into(),
                reason,
            },
            CoreError::Transport(err) => Self::Connection {
                target: "MQTT broker".into(),
                reason: err.message,
            },
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
            other => Self::Core(other),
        }
    }
}

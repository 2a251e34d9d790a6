// ── Core error types ──
//
// Errors surfaced by the synchronizer and the bridge facade. Consumers
// never see HTTP status codes or reqwest errors directly; the
// `From<stbridge_api::Error>` impl maps them into domain variants.

use thiserror::Error;

use crate::transport::TransportError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Vendor API ───────────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Device still busy after {attempts} attempts")]
    DeviceBusy { attempts: u32 },

    #[error("Network error: {reason}")]
    Network { reason: String },

    #[error("Unexpected payload from vendor API: {message}")]
    Decode { message: String },

    // ── Translation ──────────────────────────────────────────────────
    #[error("Status snapshot is missing `{path}`")]
    MissingAttribute { path: String },

    #[error("No driver recognizes device {device_id}")]
    UnsupportedDevice { device_id: String },

    #[error("Invalid {setting} value {value:?}: {reason}")]
    InvalidCommand {
        setting: String,
        value: String,
        reason: String,
    },

    // ── Outer collaborators ──────────────────────────────────────────
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Bridge is shutting down")]
    ShuttingDown,
}

impl CoreError {
    /// Whether a later attempt at the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DeviceBusy { .. } | Self::Network { .. } | Self::Transport(_)
        )
    }
}

// ── Conversion from API errors ───────────────────────────────────────

impl From<stbridge_api::Error> for CoreError {
    fn from(err: stbridge_api::Error) -> Self {
        use stbridge_api::Error as Api;

        match err {
            Api::Authentication { message } => CoreError::AuthenticationFailed { message },
            Api::CredentialStore(message) => CoreError::AuthenticationFailed {
                message: format!("credential store: {message}"),
            },
            Api::ConflictExhausted { attempts } => CoreError::DeviceBusy { attempts },
            Api::Transport(ref e) => CoreError::Network {
                reason: if e.is_timeout() {
                    format!("request timed out: {e}")
                } else {
                    e.to_string()
                },
            },
            Api::Api { status, message } => CoreError::Network {
                reason: format!("HTTP {status}: {message}"),
            },
            Api::Deserialization { message, body: _ } => CoreError::Decode { message },
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::Tls(message) => CoreError::Config {
                message: format!("TLS setup failed: {message}"),
            },
        }
    }
}

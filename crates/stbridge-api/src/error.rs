use thiserror::Error;

/// Top-level error type for the `stbridge-api` crate.
///
/// Covers every failure mode of the vendor API surface: authentication,
/// device conflicts, transport, and payload decoding.
/// `stbridge-core` maps these into device-level diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Credentials rejected and not recoverable by a single refresh,
    /// or the refresh itself failed.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Conflict ────────────────────────────────────────────────────
    /// The device kept answering HTTP 409 until the retry budget ran out.
    #[error("Device busy: still conflicting after {attempts} attempts")]
    ConflictExhausted { attempts: u32 },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or HTTP client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Non-success HTTP status that is neither 401 nor 409.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Credentials ─────────────────────────────────────────────────
    /// The credential store could not be read or written.
    #[error("Credential store error: {0}")]
    CredentialStore(String),
}

impl Error {
    /// Returns `true` if this error means the credentials are unusable.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if a later attempt at the same request may succeed:
    /// transport failures, 5xx/429 responses and exhausted conflicts.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::ConflictExhausted { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if the response body could not be decoded.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Deserialization { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_side_failures_are_transient() {
        let unavailable = Error::Api {
            status: 503,
            message: "maintenance".into(),
        };
        let throttled = Error::Api {
            status: 429,
            message: "slow down".into(),
        };
        assert!(unavailable.is_transient());
        assert!(throttled.is_transient());
        assert!(Error::ConflictExhausted { attempts: 4 }.is_transient());
    }

    #[test]
    fn client_and_credential_failures_are_not_transient() {
        let not_found = Error::Api {
            status: 404,
            message: "no such device".into(),
        };
        let auth = Error::Authentication {
            message: "revoked".into(),
        };
        let decode = Error::Deserialization {
            message: "eof".into(),
            body: "{".into(),
        };
        assert!(!not_found.is_transient());
        assert!(!auth.is_transient());
        assert!(auth.is_auth());
        assert!(!decode.is_transient());
        assert!(decode.is_decode());
    }
}

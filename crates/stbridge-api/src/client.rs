// Device status/command HTTP client
//
// Wraps `reqwest::Client` with bearer authorization, the
// 401 → refresh → retry-once protocol, and exponential backoff on 409.
//
// Base path: {api_base}/{device_id}/...
// Auth: `Authorization: Bearer {access_token}`

use std::time::Duration;

use reqwest::StatusCode;
use secrecy::ExposeSecret;
use tracing::{debug, warn};
use url::Url;

use crate::auth::TokenManager;
use crate::command::CommandBatch;
use crate::error::Error;
use crate::snapshot::Snapshot;

/// Default vendor device API root.
pub const DEFAULT_API_BASE: &str = "https://api.smartthings.com/v1/devices";

/// Default OAuth token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://auth-global.api.smartthings.com/oauth/token";

/// Truncate a response body for log and error messages.
pub(crate) fn preview(body: &str) -> String {
    body.chars().take(200).collect()
}

// ── Retry policy ─────────────────────────────────────────────────────

/// Backoff applied when the vendor answers HTTP 409 (device busy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): `base_delay * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

// ── Client ───────────────────────────────────────────────────────────

/// Async client for the vendor device API.
///
/// Cheap to clone: the HTTP pool and the token manager are shared.
#[derive(Clone)]
pub struct DeviceClient {
    http: reqwest::Client,
    base_url: Url,
    tokens: TokenManager,
    retry: RetryPolicy,
}

impl DeviceClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        tokens: TokenManager,
        retry: RetryPolicy,
    ) -> Result<Self, Error> {
        let base_url = Self::normalize_base_url(base_url)?;
        Ok(Self {
            http,
            base_url,
            tokens,
            retry,
        })
    }

    /// Ensure the base URL ends with `/` so relative joins append.
    fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{path}/"));
        Ok(url)
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    fn device_url(&self, device_id: &str, suffix: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(&format!("{device_id}/{suffix}"))?)
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Read the full attribute tree of the device's `main` component.
    pub async fn read_status(&self, device_id: &str) -> Result<Snapshot, Error> {
        let url = self.device_url(device_id, "components/main/status")?;
        debug!(device_id, "GET {url}");

        let resp = self.authorized(|| self.http.get(url.clone())).await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }
        Snapshot::parse(&body)
    }

    /// Send a command batch, backing off while the device reports 409.
    pub async fn send_command(&self, device_id: &str, batch: &CommandBatch) -> Result<(), Error> {
        let url = self.device_url(device_id, "commands")?;
        let mut attempt: u32 = 0;

        loop {
            debug!(device_id, attempt, "POST {url}");
            let resp = self
                .authorized(|| self.http.post(url.clone()).json(batch))
                .await?;
            let status = resp.status();

            if status == StatusCode::CONFLICT {
                if attempt >= self.retry.max_retries {
                    let attempts = attempt + 1;
                    warn!(device_id, attempts, "device still busy, giving up on command");
                    return Err(Error::ConflictExhausted { attempts });
                }
                let delay = self.retry.delay_for(attempt);
                warn!(device_id, attempt, ?delay, "device busy (HTTP 409), backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            let body = resp.text().await?;
            if !status.is_success() {
                return Err(api_error(status, &body));
            }
            if !body.trim().is_empty() {
                serde_json::from_str::<serde_json::Value>(&body).map_err(|e| {
                    Error::Deserialization {
                        message: format!("invalid command acknowledgement: {e}"),
                        body: body.clone(),
                    }
                })?;
            }
            debug!(device_id, attempts = attempt + 1, "command accepted");
            return Ok(());
        }
    }

    // ── Authorization ────────────────────────────────────────────────

    /// Send the request built by `build` with the current bearer token.
    ///
    /// On 401, runs the refresh protocol and retries exactly once; a second
    /// 401 is terminal.
    async fn authorized<F>(&self, build: F) -> Result<reqwest::Response, Error>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let lease = self.tokens.lease();
        let resp = with_bearer(build(), lease.token.as_ref()).send().await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        debug!(generation = lease.generation, "access token rejected, refreshing");
        self.tokens.refresh(lease.generation).await?;

        let retry = self.tokens.lease();
        let resp = with_bearer(build(), retry.token.as_ref()).send().await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            warn!("access token rejected again after refresh");
            return Err(Error::Authentication {
                message: "access token rejected after refresh".into(),
            });
        }
        Ok(resp)
    }
}

fn with_bearer(
    builder: reqwest::RequestBuilder,
    token: Option<&secrecy::SecretString>,
) -> reqwest::RequestBuilder {
    match token {
        Some(token) => builder.bearer_auth(token.expose_secret()),
        None => builder,
    }
}

fn api_error(status: StatusCode, body: &str) -> Error {
    Error::Api {
        status: status.as_u16(),
        message: if body.is_empty() {
            status.to_string()
        } else {
            preview(body)
        },
    }
}

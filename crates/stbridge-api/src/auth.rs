// OAuth token management
//
// Holds the process-wide credential set and owns the refresh protocol.
// Refreshes are single-flight: the first caller that observes a rejected
// token creates a shared refresh future, every concurrent caller awaits
// that same future instead of issuing its own token request.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::Error;

// ── Credential set ──────────────────────────────────────────────────

/// OAuth credentials shared by every device.
///
/// A refresh needs `refresh_token`, `client_id` and `client_secret`;
/// `access_token` may be stale or absent.
#[derive(Debug, Clone, Default)]
pub struct CredentialSet {
    pub access_token: Option<SecretString>,
    pub refresh_token: Option<SecretString>,
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl CredentialSet {
    /// Returns `true` if every field the refresh protocol needs is present
    /// and non-empty.
    pub fn can_refresh(&self) -> bool {
        non_empty_secret(self.refresh_token.as_ref()).is_some()
            && self.client_id.as_deref().is_some_and(|id| !id.is_empty())
            && non_empty_secret(self.client_secret.as_ref()).is_some()
    }
}

fn non_empty_secret(secret: Option<&SecretString>) -> Option<&str> {
    secret
        .map(|s| s.expose_secret())
        .filter(|s| !s.is_empty())
}

// ── Credential store ────────────────────────────────────────────────

/// Durable holder for the [`CredentialSet`].
///
/// Loaded once at startup, saved after every successful refresh. `save`
/// runs on the blocking thread pool and may do synchronous I/O.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<CredentialSet, Error>;
    fn save(&self, credentials: &CredentialSet) -> Result<(), Error>;
}

/// Non-durable store, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    current: ArcSwap<CredentialSet>,
}

impl MemoryCredentialStore {
    pub fn new(credentials: CredentialSet) -> Self {
        Self {
            current: ArcSwap::from_pointee(credentials),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<CredentialSet, Error> {
        Ok(CredentialSet::clone(&self.current.load()))
    }

    fn save(&self, credentials: &CredentialSet) -> Result<(), Error> {
        self.current.store(Arc::new(credentials.clone()));
        Ok(())
    }
}

// ── Token manager ───────────────────────────────────────────────────

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// The access token a request was sent with, tagged with the credential
/// generation it came from.
///
/// Pass the generation back to [`TokenManager::refresh`] when the token is
/// rejected so a token that was already replaced is not refreshed twice.
#[derive(Debug, Clone)]
pub struct TokenLease {
    pub token: Option<SecretString>,
    pub generation: u64,
}

type RefreshFuture = Shared<BoxFuture<'static, Result<(), Arc<Error>>>>;

/// Process-wide owner of the credential set and the refresh protocol.
///
/// Cheaply cloneable via `Arc<TokenInner>`.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    http: reqwest::Client,
    token_url: Url,
    credentials: ArcSwap<CredentialSet>,
    /// Bumped every time the credential set is replaced.
    generation: AtomicU64,
    store: Arc<dyn CredentialStore>,
    in_flight: Mutex<Option<RefreshFuture>>,
}

impl TokenManager {
    /// Load credentials from `store` and build a manager around them.
    pub fn from_store(
        http: reqwest::Client,
        token_url: Url,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, Error> {
        let credentials = store.load()?;
        if !credentials.can_refresh() {
            warn!("credential set is incomplete; token refresh will fail until it is fixed");
        }
        Ok(Self::new(http, token_url, credentials, store))
    }

    pub fn new(
        http: reqwest::Client,
        token_url: Url,
        credentials: CredentialSet,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                http,
                token_url,
                credentials: ArcSwap::from_pointee(credentials),
                generation: AtomicU64::new(0),
                store,
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// The access token to attach to the next request.
    pub fn lease(&self) -> TokenLease {
        let generation = self.inner.generation.load(Ordering::Acquire);
        let token = self.inner.credentials.load().access_token.clone();
        TokenLease { token, generation }
    }

    /// Snapshot of the current credential set.
    pub fn credentials(&self) -> Arc<CredentialSet> {
        self.inner.credentials.load_full()
    }

    /// How many times the credential set has been replaced.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Refresh the access token after a request made with `stale_generation`
    /// was rejected.
    ///
    /// Returns immediately if the credentials have moved past that
    /// generation. Otherwise joins the in-flight refresh, starting one if
    /// none exists. Any failure is reported as [`Error::Authentication`].
    pub async fn refresh(&self, stale_generation: u64) -> Result<(), Error> {
        let refresh = {
            let mut slot = self.inner.in_flight.lock().await;
            if self.generation() != stale_generation {
                debug!("access token already refreshed by another caller");
                return Ok(());
            }
            if let Some(existing) = slot.as_ref() {
                debug!("joining in-flight token refresh");
                existing.clone()
            } else {
                let fresh = Self::run_refresh(Arc::clone(&self.inner)).boxed().shared();
                *slot = Some(fresh.clone());
                fresh
            }
        };

        refresh.await.map_err(|e| match &*e {
            Error::Authentication { message } => Error::Authentication {
                message: message.clone(),
            },
            other => Error::Authentication {
                message: format!("token refresh failed: {other}"),
            },
        })
    }

    async fn run_refresh(inner: Arc<TokenInner>) -> Result<(), Arc<Error>> {
        let result = inner.request_tokens().await;
        // Clear after the generation bump so late callers skip straight to a retry.
        *inner.in_flight.lock().await = None;
        result.map_err(|e| {
            warn!(error = %e, "token refresh failed");
            Arc::new(e)
        })
    }
}

impl TokenInner {
    async fn request_tokens(&self) -> Result<(), Error> {
        let current = self.credentials.load_full();

        let refresh_token = non_empty_secret(current.refresh_token.as_ref()).ok_or_else(|| {
            Error::Authentication {
                message: "no refresh token configured".into(),
            }
        })?;
        let client_id = current
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Authentication {
                message: "no client id configured".into(),
            })?;
        let client_secret = non_empty_secret(current.client_secret.as_ref()).ok_or_else(|| {
            Error::Authentication {
                message: "no client secret configured".into(),
            }
        })?;

        info!(url = %self.token_url, "refreshing access token");

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
        ];
        let resp = self
            .http
            .post(self.token_url.clone())
            .basic_auth(client_id, Some(client_secret))
            .form(&form)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(Error::Authentication {
                message: format!(
                    "token endpoint returned HTTP {status}: {}",
                    crate::client::preview(&body)
                ),
            });
        }

        let tokens: TokenResponse =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: format!("invalid token response: {e}"),
                body: body.clone(),
            })?;

        let mut next = CredentialSet::clone(&current);
        next.access_token = Some(SecretString::from(tokens.access_token));
        if let Some(rotated) = tokens.refresh_token {
            next.refresh_token = Some(SecretString::from(rotated));
        }
        next.last_updated = Some(Utc::now());

        // Stores may hit disk or the OS keyring.
        let store = Arc::clone(&self.store);
        let persisted = next.clone();
        match tokio::task::spawn_blocking(move || store.save(&persisted)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "failed to persist refreshed tokens"),
            Err(e) => warn!(error = %e, "token persistence task did not complete"),
        }

        self.credentials.store(Arc::new(next));
        self.generation.fetch_add(1, Ordering::AcqRel);
        info!("access token refreshed");
        Ok(())
    }
}

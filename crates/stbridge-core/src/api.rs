// ── Vendor API seam ──
//
// Sessions talk to the vendor through `DeviceApi` so the synchronizer can
// be driven by an in-memory fake. `DeviceClient` is the real implementation.

use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use stbridge_api::{
    CommandBatch, CredentialStore, DeviceClient, Error, Snapshot, TokenManager, TransportConfig,
};

use crate::config::ApiConfig;
use crate::error::CoreError;

pub trait DeviceApi: Send + Sync {
    fn read_status<'a>(&'a self, device_id: &'a str) -> BoxFuture<'a, Result<Snapshot, Error>>;

    fn send_command<'a>(
        &'a self,
        device_id: &'a str,
        batch: &'a CommandBatch,
    ) -> BoxFuture<'a, Result<(), Error>>;
}

impl DeviceApi for DeviceClient {
    fn read_status<'a>(&'a self, device_id: &'a str) -> BoxFuture<'a, Result<Snapshot, Error>> {
        DeviceClient::read_status(self, device_id).boxed()
    }

    fn send_command<'a>(
        &'a self,
        device_id: &'a str,
        batch: &'a CommandBatch,
    ) -> BoxFuture<'a, Result<(), Error>> {
        DeviceClient::send_command(self, device_id, batch).boxed()
    }
}

/// Build the vendor client from `config`, loading credentials from `store`.
pub fn build_client(
    config: &ApiConfig,
    store: Arc<dyn CredentialStore>,
) -> Result<DeviceClient, CoreError> {
    let http = TransportConfig {
        tls: config.tls.clone(),
        ..TransportConfig::default()
    }
    .with_timeout(config.timeout)
    .build_client()?;

    let tokens = TokenManager::from_store(http.clone(), config.token_url.clone(), store)?;
    Ok(DeviceClient::new(
        http,
        config.api_base.as_str(),
        tokens,
        config.retry,
    )?)
}

// stbridge-api: Async Rust client for the SmartThings device API
//
// Status reads, command batches, and the OAuth refresh protocol.

pub mod auth;
pub mod client;
pub mod command;
pub mod error;
pub mod snapshot;
pub mod transport;

pub use auth::{CredentialSet, CredentialStore, MemoryCredentialStore, TokenLease, TokenManager};
pub use client::{DEFAULT_API_BASE, DEFAULT_TOKEN_URL, DeviceClient, RetryPolicy};
pub use command::{Command, CommandBatch};
pub use error::Error;
pub use snapshot::Snapshot;
pub use transport::{TlsMode, TransportConfig};

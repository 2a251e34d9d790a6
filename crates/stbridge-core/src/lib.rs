//! Device synchronization between the SmartThings API and a pub/sub bus.
//!
//! - **[`Bridge`]**: registers configured devices, announces them for
//!   discovery, subscribes their command topics and routes inbound
//!   messages. [`Bridge::connect`] builds the vendor client from a
//!   [`BridgeConfig`] and a credential store.
//!
//! - **[`DeviceSession`]**: one per device. Settles, polls on an interval,
//!   serializes command batches behind a per-device lock and re-reads state
//!   shortly after every command.
//!
//! - **[`translate`]**: pure mapping between the vendor attribute tree and
//!   [`CanonicalFields`], and from `/set` payloads to command batches.
//!
//! - **Seams**: [`DeviceApi`] (implemented by `stbridge_api::DeviceClient`)
//!   and [`Transport`] (implemented by the binary's MQTT adapter).

pub mod api;
pub mod bridge;
pub mod config;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod model;
pub mod session;
pub mod topics;
pub mod translate;
pub mod transport;

// ── Primary re-exports ──────────────────────────────────────────────
pub use api::{DeviceApi, build_client};
pub use bridge::{Bridge, Probe, probe};
pub use config::{ApiConfig, BridgeConfig, DeviceConfig, DiscoveryConfig, Intervals};
pub use driver::{DriverEntry, DriverRegistry};
pub use error::CoreError;
pub use model::{CanonicalFields, DeviceProfile, SyncState};
pub use session::{DeviceSession, SessionContext};
pub use topics::{Setting, StateTopic, TopicScheme};
pub use transport::{INBOUND_CHANNEL_SIZE, InboundMessage, Transport, TransportError};

//! Background OBD-II poller and oneM2M/MQTT telemetry bridge.
//!
//! This crate wires the ELM327 session from `obdlink-core` to a
//! resource-oriented oneM2M platform reached over MQTT:
//!
//! - Polls the configured PIDs on a schedule and decodes each response
//! - Provisions the device's identity resource, containers, and
//!   subscriptions on first run (idempotently)
//! - Publishes each decoded snapshot as a content instance
//! - Forwards unsolicited platform notifications to a log sink
//!
//! # Configuration
//!
//! The bridge reads a TOML file (see [`config::Config`]):
//!
//! ```toml
//! [device]
//! address = "192.168.0.10:35000"
//! poll_interval = 5
//! pids = ["010C", "010D"]
//!
//! [mqtt]
//! broker = "mqtt://broker.example.com:1883"
//!
//! [platform]
//! device_id = "MyObdDevice-001"
//! app_id = "vn.obd.bridge"
//! access_token = "..."
//! ```

pub mod config;
pub mod correlation;
pub mod error;
pub mod poller;
pub mod provision;
pub mod publish;
pub mod state;
pub mod store;

pub use config::{Config, ConfigError};
pub use correlation::{CloudLink, PendingTable, Requester};
pub use error::{BridgeError, Result};
pub use poller::Poller;
pub use provision::Provisioner;
pub use publish::TelemetryPublisher;
pub use state::{BridgeState, Status};
pub use store::SessionStore;

//! Error types for obdlink-bridge.

use thiserror::Error;

/// Errors that can occur while bridging telemetry to the platform.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BridgeError {
    /// MQTT client request failed (publish/subscribe/disconnect).
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Broker URL could not be parsed.
    #[error("invalid broker URL: {0}")]
    InvalidBroker(String),

    /// Payload (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Session store read/write failed.
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    /// The provisioning flow failed at a fatal step.
    #[error("provisioning failed: {0}")]
    Provisioning(String),

    /// Adapter session error.
    #[error(transparent)]
    Session(#[from] obdlink_core::Error),
}

impl BridgeError {
    /// Create a provisioning failure with context.
    pub fn provisioning(message: impl Into<String>) -> Self {
        Self::Provisioning(message.into())
    }
}

/// Result type alias using obdlink-bridge's error type.
pub type Result<T> = std::result::Result<T, BridgeError>;

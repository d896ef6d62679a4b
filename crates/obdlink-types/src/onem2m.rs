//! oneM2M wire model for the MQTT request/response binding.
//!
//! Request primitives are serialized with the short oneM2M member names
//! (`fr`, `op`, `ty`, `rqi`, `to`, `tkns`, `pc`). Inbound broker payloads
//! are classified exactly once at the transport boundary into the
//! [`Inbound`] tagged variant; the rest of the system never probes loose
//! JSON documents.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// oneM2M operation codes carried in the `op` member.
pub mod op {
    /// Create a resource.
    pub const CREATE: u8 = 1;
    /// Retrieve a resource.
    pub const RETRIEVE: u8 = 2;
}

/// oneM2M resource type codes carried in the `ty` member.
pub mod ty {
    /// Application Entity (the device's identity resource).
    pub const APPLICATION_ENTITY: u8 = 2;
    /// Container.
    pub const CONTAINER: u8 = 3;
    /// Content instance (one telemetry sample).
    pub const CONTENT_INSTANCE: u8 = 4;
    /// Subscription.
    pub const SUBSCRIPTION: u8 = 23;
}

/// oneM2M response status codes carried in the `rsc` member.
pub mod rsc {
    /// Retrieve succeeded.
    pub const OK: u32 = 2000;
    /// Create succeeded.
    pub const CREATED: u32 = 2001;
    /// Resource already exists.
    pub const CONFLICT: u32 = 4105;
}

/// An outbound oneM2M request primitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPrimitive {
    /// Originator identity (device id, or AE-ID once registered).
    pub fr: String,
    /// Operation code, see [`op`].
    pub op: u8,
    /// Resource type code, see [`ty`]. Absent on retrieve.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ty: Option<u8>,
    /// Correlation id. Stamped by the correlation layer at send time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rqi: Option<String>,
    /// Target resource path, e.g. `"/in-cse/in-name/<ae-id>"`.
    pub to: String,
    /// Authorization token array.
    pub tkns: Vec<String>,
    /// Primitive content (the resource representation to create).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pc: Option<Value>,
}

impl RequestPrimitive {
    fn base(fr: &str, operation: u8, resource_ty: Option<u8>, to: String, token: &str) -> Self {
        Self {
            fr: fr.to_string(),
            op: operation,
            ty: resource_ty,
            rqi: None,
            to,
            tkns: vec![token.to_string()],
            pc: None,
        }
    }
}

/// Build an AE (identity resource) creation request.
///
/// The point of access is the device's own MQTT client id so the platform
/// can push notifications back over the broker.
pub fn ae_create(device_id: &str, app_id: &str, token: &str, to: String) -> RequestPrimitive {
    let mut request =
        RequestPrimitive::base(device_id, op::CREATE, Some(ty::APPLICATION_ENTITY), to, token);
    request.pc = Some(json!({
        "m2m:ae": {
            "api": app_id,
            "rr": true,
            "poa": [format!("mqtt://{device_id}")],
            "rn": device_id,
            "srv": ["3"],
        }
    }));
    request
}

/// Build an AE retrieve request (used after a create conflict).
pub fn ae_retrieve(device_id: &str, token: &str, to: String) -> RequestPrimitive {
    RequestPrimitive::base(device_id, op::RETRIEVE, None, to, token)
}

/// Build a container creation request under the given target.
pub fn container_create(
    originator: &str,
    token: &str,
    to: String,
    resource_name: &str,
) -> RequestPrimitive {
    let mut request = RequestPrimitive::base(originator, op::CREATE, Some(ty::CONTAINER), to, token);
    request.pc = Some(json!({ "m2m:cnt": { "rn": resource_name } }));
    request
}

/// Build a subscription creation request on a container.
///
/// `notify_uri` is where the platform pushes change notifications,
/// conventionally `"/<cse-id>/<ae-id>"`.
pub fn subscription_create(
    originator: &str,
    token: &str,
    to: String,
    container_name: &str,
    notify_uri: &str,
) -> RequestPrimitive {
    let mut request =
        RequestPrimitive::base(originator, op::CREATE, Some(ty::SUBSCRIPTION), to, token);
    request.pc = Some(json!({
        "m2m:sub": {
            "rn": format!("sub_{container_name}"),
            "nu": [notify_uri],
            "nct": 1,
        }
    }));
    request
}

/// Build a content-instance creation request (one telemetry sample).
pub fn content_instance(
    originator: &str,
    token: &str,
    to: String,
    content: String,
) -> RequestPrimitive {
    let mut request =
        RequestPrimitive::base(originator, op::CREATE, Some(ty::CONTENT_INSTANCE), to, token);
    request.pc = Some(json!({
        "m2m:cin": {
            "cnf": "text/plain:0",
            "con": content,
        }
    }));
    request
}

/// An inbound oneM2M response primitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsePrimitive {
    /// Correlation id echoed from the request.
    pub rqi: String,
    /// Result status code, see [`rsc`].
    pub rsc: u32,
    /// Primitive content (the created/retrieved resource), if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pc: Option<Value>,
}

impl ResponsePrimitive {
    /// Whether the request created a resource.
    pub fn is_created(&self) -> bool {
        self.rsc == rsc::CREATED
    }

    /// Whether a retrieve succeeded.
    pub fn is_retrieved(&self) -> bool {
        self.rsc == rsc::OK
    }

    /// Whether the resource already existed.
    pub fn is_conflict(&self) -> bool {
        self.rsc == rsc::CONFLICT
    }

    /// Extract the AE-ID from an AE create/retrieve response.
    pub fn ae_id(&self) -> Option<String> {
        self.pc
            .as_ref()?
            .get("m2m:ae")?
            .get("aei")?
            .as_str()
            .map(str::to_string)
    }
}

/// An inbound broker message, classified once at the transport boundary.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// A response to a correlated request.
    Response(ResponsePrimitive),
    /// An unsolicited platform notification carrying the innermost raw
    /// content string originally published to a watched container.
    Notification {
        /// The raw content string.
        content: String,
    },
    /// Anything that is neither; logged and dropped by the caller.
    Malformed,
}

impl Inbound {
    /// Classify a raw broker payload.
    ///
    /// Notification envelopes are recognized first (they may also carry a
    /// request id of their own, which must not be mistaken for a
    /// correlation match).
    pub fn classify(payload: &[u8]) -> Inbound {
        let Ok(value) = serde_json::from_slice::<Value>(payload) else {
            return Inbound::Malformed;
        };

        if let Some(content) = notification_content(&value) {
            return Inbound::Notification { content };
        }

        match serde_json::from_value::<ResponsePrimitive>(value) {
            Ok(response) => Inbound::Response(response),
            Err(_) => Inbound::Malformed,
        }
    }
}

/// Probe the `pc."m2m:sgn".nev.rep."m2m:cin".con` notification envelope.
fn notification_content(value: &Value) -> Option<String> {
    value
        .get("pc")?
        .get("m2m:sgn")?
        .get("nev")?
        .get("rep")?
        .get("m2m:cin")?
        .get("con")?
        .as_str()
        .map(str::to_string)
}

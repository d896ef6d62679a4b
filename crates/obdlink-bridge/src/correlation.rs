//! Correlated request/response layer over MQTT.
//!
//! The oneM2M MQTT binding is asynchronous: a request is published to the
//! platform's request topic and its response arrives later, out of order,
//! on the device's response topic. This module owns the broker connection
//! and matches every inbound response to its waiter by correlation id
//! (`rqi`); unsolicited notifications are forwarded to a separate sink.
//!
//! # Topics
//!
//! - Requests go to `/oneM2M/req/<device-id>/<cse-id>/json`
//! - Responses arrive on `/oneM2M/resp/<device-id>/#`, subscribed on every
//!   ConnAck so the subscription is re-established after an automatic
//!   reconnect. A watch flag tracks whether the subscription is currently
//!   established; [`Requester::request`] waits on that flag before
//!   publishing, so no request can hit the wire while the device is not
//!   listening for its response.
//!
//! # Reconnection
//!
//! Connection errors are logged and retried by the event-loop task.
//! Waiters pending across a reconnect are not failed eagerly; each relies
//! on its own timeout, which also removes it from the table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use obdlink_types::onem2m::{Inbound, RequestPrimitive, ResponsePrimitive};

use crate::config::{MqttConfig, PlatformConfig};
use crate::error::{BridgeError, Result};

/// Protocol root segment of every oneM2M topic.
const TOPIC_ROOT: &str = "oneM2M";

/// Capacity of the rumqttc request channel.
const CLIENT_CHANNEL_CAPACITY: usize = 100;

/// Capacity of the notification sink channel.
const NOTIFICATION_CHANNEL_CAPACITY: usize = 32;

/// The seam through which provisioning and publishing issue requests.
///
/// `Ok(None)` means the request timed out; transport-level failures are
/// errors. Tests substitute scripted implementations.
#[async_trait]
pub trait Requester: Send + Sync {
    /// Issue a correlated request and await its response or timeout.
    async fn request(&self, request: RequestPrimitive) -> Result<Option<ResponsePrimitive>>;
}

/// Table of in-flight correlation ids to single-resolution waiters.
///
/// The only structure mutated from two directions: request issuance
/// registers, the inbound listener resolves.
#[derive(Default)]
pub struct PendingTable {
    inner: Mutex<HashMap<String, oneshot::Sender<ResponsePrimitive>>>,
}

impl PendingTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<ResponsePrimitive>>> {
        // The critical sections never panic; recover from poisoning anyway.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a waiter for a correlation id.
    ///
    /// Callers must generate fresh ids; a collision replaces (and thereby
    /// abandons) the earlier waiter.
    pub fn register(&self, rqi: &str) -> oneshot::Receiver<ResponsePrimitive> {
        let (tx, rx) = oneshot::channel();
        self.table().insert(rqi.to_string(), tx);
        rx
    }

    /// Resolve and remove the waiter for `rqi`, if one is registered.
    ///
    /// Returns `false` for unknown ids (late or unsolicited responses),
    /// which affect no waiter.
    pub fn resolve(&self, rqi: &str, response: ResponsePrimitive) -> bool {
        match self.table().remove(rqi) {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Drop the waiter for `rqi` (timeout path).
    pub fn remove(&self, rqi: &str) {
        self.table().remove(rqi);
    }

    /// Number of in-flight requests.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    /// Whether no requests are in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The MQTT connection to the oneM2M platform.
pub struct CloudLink {
    client: AsyncClient,
    pending: Arc<PendingTable>,
    request_topic: String,
    timeout: Duration,
    cancel: CancellationToken,
    subscribed: watch::Receiver<bool>,
}

impl CloudLink {
    /// Connect to the broker and start the inbound listener task.
    ///
    /// Returns the link and the receiver for unsolicited notification
    /// content. The listener subscribes to the device's response topic on
    /// every ConnAck and raises the subscription flag that gates
    /// [`Requester::request`], so requests cannot be published before the
    /// device is listening for their responses.
    pub fn connect(
        mqtt: &MqttConfig,
        platform: &PlatformConfig,
    ) -> Result<(Self, mpsc::Receiver<String>)> {
        let (host, port, use_tls) = parse_broker_url(&mqtt.broker)?;

        // The client id doubles as the AE's point of access.
        let client_id = format!("mqtt://{}", platform.device_id);
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(mqtt.keep_alive));
        options.set_credentials(&platform.device_id, &platform.access_token);
        if use_tls {
            options.set_transport(rumqttc::Transport::tls_with_default_config());
        }

        let (client, event_loop) = AsyncClient::new(options, CLIENT_CHANNEL_CAPACITY);
        let pending = Arc::new(PendingTable::new());
        let (notify_tx, notify_rx) = mpsc::channel(NOTIFICATION_CHANNEL_CAPACITY);
        let (subscribed_tx, subscribed_rx) = watch::channel(false);
        let cancel = CancellationToken::new();

        let response_topic = format!("/{TOPIC_ROOT}/resp/{}/#", platform.device_id);
        let request_topic = format!("/{TOPIC_ROOT}/req/{}/{}/json", platform.device_id, platform.cse_id);

        info!(broker = %mqtt.broker, response_topic, "starting MQTT link");
        tokio::spawn(run_event_loop(
            event_loop,
            client.clone(),
            Arc::clone(&pending),
            response_topic,
            notify_tx,
            subscribed_tx,
            cancel.clone(),
        ));

        Ok((
            Self {
                client,
                pending,
                request_topic,
                timeout: platform.request_timeout(),
                cancel,
                subscribed: subscribed_rx,
            },
            notify_rx,
        ))
    }

    /// Disconnect from the broker and stop the listener.
    ///
    /// Waiters still pending are abandoned; their timeouts fire normally.
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "error disconnecting MQTT client");
        }
        self.cancel.cancel();
        info!(abandoned = self.in_flight(), "MQTT link stopped");
    }

    /// Number of requests currently awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl Requester for CloudLink {
    async fn request(&self, mut request: RequestPrimitive) -> Result<Option<ResponsePrimitive>> {
        // Hold the request until the response subscription is established;
        // publishing earlier would race the response against the SUBSCRIBE.
        let mut subscribed = self.subscribed.clone();
        match tokio::time::timeout(self.timeout, subscribed.wait_for(|ready| *ready)).await {
            Ok(Ok(_)) => {}
            Ok(Err(_)) | Err(_) => {
                warn!(timeout = ?self.timeout, "response subscription not established, dropping request");
                return Ok(None);
            }
        }

        let rqi = next_request_id();
        request.rqi = Some(rqi.clone());

        let receiver = self.pending.register(&rqi);
        let payload = serde_json::to_vec(&request)?;

        if let Err(e) = self
            .client
            .publish(&self.request_topic, QoS::AtLeastOnce, false, payload)
            .await
        {
            self.pending.remove(&rqi);
            return Err(BridgeError::Mqtt(e));
        }
        debug!(rqi, op = request.op, to = %request.to, "request published");

        match tokio::time::timeout(self.timeout, receiver).await {
            Ok(Ok(response)) => {
                debug!(rqi, rsc = response.rsc, "response received");
                Ok(Some(response))
            }
            Ok(Err(_)) => {
                // Waiter dropped without resolution (listener stopped).
                self.pending.remove(&rqi);
                Ok(None)
            }
            Err(_) => {
                warn!(rqi, timeout = ?self.timeout, "request timed out");
                self.pending.remove(&rqi);
                Ok(None)
            }
        }
    }
}

/// Drive the rumqttc event loop: subscribe on ConnAck, classify publishes,
/// and track subscription state in the watch flag that gates publishing.
async fn run_event_loop(
    mut event_loop: EventLoop,
    client: AsyncClient,
    pending: Arc<PendingTable>,
    response_topic: String,
    notify_tx: mpsc::Sender<String>,
    subscribed_tx: watch::Sender<bool>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = event_loop.poll() => event,
        };
        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!(?ack, "MQTT connected, subscribing to response topic");
                match client.subscribe(&response_topic, QoS::AtLeastOnce).await {
                    Ok(()) => {
                        let _ = subscribed_tx.send(true);
                    }
                    Err(e) => warn!(error = %e, "failed to subscribe to response topic"),
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                handle_publish(&pending, &notify_tx, &publish.topic, &publish.payload);
            }
            Ok(_) => {}
            Err(e) => {
                // The subscription dies with the connection; lower the flag
                // so new requests wait for the post-reconnect SUBSCRIBE.
                let _ = subscribed_tx.send(false);
                warn!(error = %e, "MQTT connection error, reconnecting");
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
    debug!("MQTT listener stopped");
}

/// Route one inbound message: resolve a waiter or forward a notification.
fn handle_publish(
    pending: &PendingTable,
    notify_tx: &mpsc::Sender<String>,
    topic: &str,
    payload: &[u8],
) {
    match Inbound::classify(payload) {
        Inbound::Response(response) => {
            let rqi = response.rqi.clone();
            if !pending.resolve(&rqi, response) {
                debug!(rqi, topic, "response with no pending waiter, dropped");
            }
        }
        Inbound::Notification { content } => {
            debug!(topic, "notification received");
            if notify_tx.try_send(content).is_err() {
                warn!(topic, "notification sink full or closed, dropped");
            }
        }
        Inbound::Malformed => {
            warn!(topic, "malformed inbound payload, dropped");
        }
    }
}

/// Generate a fresh correlation id.
///
/// Millisecond timestamp plus a random suffix makes collisions among
/// in-flight requests practically impossible.
fn next_request_id() -> String {
    let millis = time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    format!("req_{millis}_{:04x}", rand::random::<u16>())
}

/// Parse an MQTT broker URL into (host, port, use_tls).
fn parse_broker_url(url: &str) -> Result<(String, u16, bool)> {
    let (use_tls, rest) = if let Some(stripped) = url.strip_prefix("mqtt://") {
        (false, stripped)
    } else if let Some(stripped) = url.strip_prefix("mqtts://") {
        (true, stripped)
    } else {
        return Err(BridgeError::InvalidBroker(format!(
            "'{url}' must start with mqtt:// or mqtts://"
        )));
    };

    let default_port = if use_tls { 8883 } else { 1883 };
    let (host, port) = if let Some((h, p)) = rest.rsplit_once(':') {
        let port = p
            .parse::<u16>()
            .map_err(|_| BridgeError::InvalidBroker(format!("invalid port '{p}'")))?;
        (h.to_string(), port)
    } else {
        (rest.to_string(), default_port)
    };

    if host.is_empty() {
        return Err(BridgeError::InvalidBroker("host cannot be empty".into()));
    }

    Ok((host, port, use_tls))
}

#[cfg(test)]
mod tests {
    use super::*;
    use obdlink_types::onem2m::rsc;

    fn response(rqi: &str, code: u32) -> ResponsePrimitive {
        ResponsePrimitive {
            rqi: rqi.to_string(),
            rsc: code,
            pc: None,
        }
    }

    #[tokio::test]
    async fn test_resolve_matches_exactly_one_waiter() {
        let table = PendingTable::new();
        let rx_a = table.register("req_a");
        let rx_b = table.register("req_b");
        assert_eq!(table.len(), 2);

        assert!(table.resolve("req_a", response("req_a", rsc::CREATED)));

        let resolved = rx_a.await.unwrap();
        assert_eq!(resolved.rqi, "req_a");
        assert_eq!(table.len(), 1);

        // The other waiter is untouched and still pending.
        assert!(table.resolve("req_b", response("req_b", rsc::OK)));
        assert!(rx_b.await.unwrap().is_retrieved());
    }

    #[tokio::test]
    async fn test_unknown_id_affects_no_waiter() {
        let table = PendingTable::new();
        let _rx = table.register("req_known");

        assert!(!table.resolve("req_unknown", response("req_unknown", rsc::CREATED)));
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_late_arrival_after_removal_is_a_noop() {
        let table = PendingTable::new();
        let rx = table.register("req_slow");

        // Timeout path: the waiter is removed before any response arrives.
        table.remove("req_slow");
        assert!(table.is_empty());

        // The late response resolves nothing...
        assert!(!table.resolve("req_slow", response("req_slow", rsc::CREATED)));
        // ...and the abandoned receiver observes a closed channel.
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_inbound_routing() {
        let table = PendingTable::new();
        let rx = table.register("req_1");
        let (notify_tx, mut notify_rx) = mpsc::channel(4);

        handle_publish(
            &table,
            &notify_tx,
            "/oneM2M/resp/dev/json",
            br#"{"rqi":"req_1","rsc":2001}"#,
        );
        assert!(rx.await.unwrap().is_created());

        handle_publish(
            &table,
            &notify_tx,
            "/oneM2M/resp/dev/json",
            br#"{"pc":{"m2m:sgn":{"nev":{"rep":{"m2m:cin":{"con":"loopback"}}}}}}"#,
        );
        assert_eq!(notify_rx.recv().await.unwrap(), "loopback");

        // Malformed payloads are dropped without effect.
        handle_publish(&table, &notify_tx, "/oneM2M/resp/dev/json", b"garbage");
        assert!(table.is_empty());
    }

    #[test]
    fn test_request_ids_are_fresh() {
        let a = next_request_id();
        let b = next_request_id();
        assert!(a.starts_with("req_"));
        assert_ne!(a, b);
    }

    /// Build a link whose event loop is never polled. The rumqttc request
    /// channel still accepts publishes, so the correlated-request path runs
    /// exactly as in production up to the point a broker would answer.
    fn unconnected_link(
        subscribed: bool,
        timeout: Duration,
    ) -> (CloudLink, EventLoop, watch::Sender<bool>) {
        let options = MqttOptions::new("test", "127.0.0.1", 1);
        let (client, event_loop) = AsyncClient::new(options, 10);
        let (subscribed_tx, subscribed_rx) = watch::channel(subscribed);
        let link = CloudLink {
            client,
            pending: Arc::new(PendingTable::new()),
            request_topic: "/oneM2M/req/dev/in-cse/json".to_string(),
            timeout,
            cancel: CancellationToken::new(),
            subscribed: subscribed_rx,
        };
        (link, event_loop, subscribed_tx)
    }

    fn retrieve_request() -> RequestPrimitive {
        obdlink_types::onem2m::ae_retrieve("dev", "tok", "/in-cse/in-name/dev".to_string())
    }

    #[tokio::test]
    async fn test_unanswered_request_times_out_and_removes_its_waiter() {
        let (link, _event_loop, _subscribed_tx) =
            unconnected_link(true, Duration::from_millis(100));

        let response = link.request(retrieve_request()).await.unwrap();
        assert!(response.is_none());
        // The timed-out waiter must not linger in the table.
        assert_eq!(link.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_request_is_held_until_subscribed() {
        let (link, _event_loop, subscribed_tx) =
            unconnected_link(false, Duration::from_millis(300));
        let link = Arc::new(link);

        let handle = {
            let link = Arc::clone(&link);
            tokio::spawn(async move { link.request(retrieve_request()).await })
        };

        // Gated: nothing registered, nothing published.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(link.in_flight(), 0);

        // Raising the flag releases the request onto the wire.
        subscribed_tx.send(true).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(link.in_flight(), 1);

        // No broker answers, so it still resolves as a timeout.
        assert!(handle.await.unwrap().unwrap().is_none());
        assert_eq!(link.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_request_without_subscription_is_dropped() {
        let (link, _event_loop, _subscribed_tx) =
            unconnected_link(false, Duration::from_millis(100));

        // The flag never rises; the request resolves like a timeout and
        // never registers a waiter.
        let response = link.request(retrieve_request()).await.unwrap();
        assert!(response.is_none());
        assert_eq!(link.in_flight(), 0);
    }

    #[test]
    fn test_parse_broker_url() {
        let (host, port, tls) = parse_broker_url("mqtt://localhost:1883").unwrap();
        assert_eq!((host.as_str(), port, tls), ("localhost", 1883, false));

        let (host, port, tls) = parse_broker_url("mqtts://broker.example.com").unwrap();
        assert_eq!((host.as_str(), port, tls), ("broker.example.com", 8883, true));

        assert!(parse_broker_url("tcp://localhost:1883").is_err());
        assert!(parse_broker_url("mqtt://:1883").is_err());
        assert!(parse_broker_url("mqtt://host:notaport").is_err());
    }
}

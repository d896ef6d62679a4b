//! Telemetry publishing.
//!
//! Each captured snapshot becomes one content instance in the device's
//! `cnt_telemetry` container. Publishing is strictly best-effort: a
//! rejected or timed-out upload is logged and the snapshot dropped, and
//! the poller keeps its cadence regardless. Snapshots captured before
//! provisioning completes are discarded rather than queued.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use obdlink_types::onem2m::content_instance;
use obdlink_types::pid::Snapshot;

use crate::config::PlatformConfig;
use crate::correlation::Requester;
use crate::store::SessionStore;

/// Uploads snapshots to the platform's telemetry container.
pub struct TelemetryPublisher {
    requester: Arc<dyn Requester>,
    store: Arc<Mutex<SessionStore>>,
    platform: PlatformConfig,
}

impl TelemetryPublisher {
    /// Create a publisher over the given request seam and session store.
    pub fn new(
        requester: Arc<dyn Requester>,
        store: Arc<Mutex<SessionStore>>,
        platform: PlatformConfig,
    ) -> Self {
        Self {
            requester,
            store,
            platform,
        }
    }

    /// Upload one snapshot. Failures are logged, never propagated.
    pub async fn publish(&self, snapshot: &Snapshot) {
        let ae_id = {
            let store = self.store.lock().await;
            match store.ae_id() {
                Some(ae_id) if store.is_setup_complete() => ae_id.to_string(),
                _ => {
                    debug!("platform not provisioned yet, dropping snapshot");
                    return;
                }
            }
        };

        let content = match serde_json::to_string(&snapshot.value_map()) {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "failed to encode snapshot, dropping");
                return;
            }
        };

        let to = format!("{}/{ae_id}/cnt_telemetry", self.platform.cse_base());
        let request = content_instance(&ae_id, &self.platform.access_token, to, content);

        match self.requester.request(request).await {
            Ok(Some(r)) if r.is_created() => {
                debug!(captured_at = %snapshot.captured_at, "telemetry published")
            }
            Ok(Some(r)) => warn!(rsc = r.rsc, "telemetry rejected, dropping snapshot"),
            Ok(None) => warn!("telemetry upload timed out, dropping snapshot"),
            Err(e) => warn!(error = %e, "telemetry upload failed, dropping snapshot"),
        }
    }

    /// Consume snapshots from the poller until the channel closes or the
    /// token is cancelled.
    pub async fn run(&self, mut snapshots: mpsc::Receiver<Snapshot>, cancel: CancellationToken) {
        loop {
            let snapshot = tokio::select! {
                _ = cancel.cancelled() => break,
                snapshot = snapshots.recv() => match snapshot {
                    Some(snapshot) => snapshot,
                    None => break,
                },
            };
            self.publish(&snapshot).await;
        }
        info!("telemetry publisher stopped");
    }
}

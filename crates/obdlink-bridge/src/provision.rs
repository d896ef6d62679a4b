//! One-time platform provisioning.
//!
//! Before the bridge may publish telemetry, the platform must hold the
//! device's resource tree: an AE registration, four containers, and
//! subscriptions on the containers the platform pushes into. The flow is
//! idempotent; a bridge restarting against an already-provisioned platform
//! makes no create requests at all.
//!
//! Only identity resolution is fatal. Container and subscription steps are
//! logged and skipped on failure so one flaky create does not strand an
//! otherwise working device; the missing resource is retried on the next
//! run before `setup_complete` is recorded.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use obdlink_types::onem2m::{
    ResponsePrimitive, ae_create, ae_retrieve, container_create, subscription_create,
};

use crate::config::PlatformConfig;
use crate::correlation::Requester;
use crate::error::{BridgeError, Result};
use crate::store::SessionStore;

/// Containers created under the device's AE.
pub const CONTAINERS: [&str; 4] = ["cnt_telemetry", "cnt_command", "cnt_config", "cnt_status"];

/// Containers the platform pushes notifications for.
const SUBSCRIBED_CONTAINERS: [&str; 3] = ["cnt_command", "cnt_config", "cnt_telemetry"];

/// Drives the registration and resource-creation flow.
pub struct Provisioner {
    requester: Arc<dyn Requester>,
    store: Arc<Mutex<SessionStore>>,
    platform: PlatformConfig,
}

impl Provisioner {
    /// Create a provisioner over the given request seam and session store.
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

    /// Run the full provisioning flow, returning the device's AE-ID.
    ///
    /// Short-circuits when a previous run recorded `setup_complete`.
    pub async fn run(&self) -> Result<String> {
        {
            let store = self.store.lock().await;
            if store.is_setup_complete()
                && let Some(ae_id) = store.ae_id()
            {
                info!(ae_id, "platform already provisioned");
                return Ok(ae_id.to_string());
            }
        }

        let ae_id = self.resolve_identity().await?;
        self.create_containers(&ae_id).await?;
        self.create_subscriptions(&ae_id).await?;

        let mut store = self.store.lock().await;
        if !store.is_setup_complete() {
            store.set_setup_complete()?;
        }
        info!(ae_id, "platform provisioning complete");
        Ok(ae_id)
    }

    /// Resolve the AE-ID: cached, freshly created, or retrieved after a
    /// create conflict. Any other outcome is fatal.
    async fn resolve_identity(&self) -> Result<String> {
        if let Some(ae_id) = self.store.lock().await.ae_id() {
            debug!(ae_id, "using cached AE-ID");
            return Ok(ae_id.to_string());
        }

        let platform = &self.platform;
        let request = ae_create(
            &platform.device_id,
            &platform.app_id,
            &platform.access_token,
            platform.cse_base(),
        );
        let response = self.requester.request(request).await?;

        match response {
            Some(r) if r.is_created() => self.cache_ae_id(&r, "AE registered").await,
            Some(r) if r.is_conflict() => {
                debug!(device_id = %platform.device_id, "AE already registered, retrieving");
                self.retrieve_identity().await
            }
            Some(r) => Err(BridgeError::provisioning(format!(
                "AE registration rejected with status {}",
                r.rsc
            ))),
            None => Err(BridgeError::provisioning("AE registration timed out")),
        }
    }

    async fn retrieve_identity(&self) -> Result<String> {
        let platform = &self.platform;
        let request = ae_retrieve(
            &platform.device_id,
            &platform.access_token,
            format!("{}/{}", platform.cse_base(), platform.device_id),
        );
        let response = self.requester.request(request).await?;

        match response {
            Some(r) if r.is_retrieved() => self.cache_ae_id(&r, "AE retrieved").await,
            Some(r) => Err(BridgeError::provisioning(format!(
                "AE retrieve failed with status {}",
                r.rsc
            ))),
            None => Err(BridgeError::provisioning("AE retrieve timed out")),
        }
    }

    async fn cache_ae_id(&self, response: &ResponsePrimitive, what: &str) -> Result<String> {
        let ae_id = response.ae_id().ok_or_else(|| {
            BridgeError::provisioning("platform response is missing the AE-ID")
        })?;
        info!(ae_id, "{what}");
        self.store.lock().await.set_ae_id(&ae_id)?;
        Ok(ae_id)
    }

    /// Create the container set under the AE. Failures are skipped.
    async fn create_containers(&self, ae_id: &str) -> Result<()> {
        let platform = &self.platform;
        let parent = format!("{}/{ae_id}", platform.cse_base());

        for name in CONTAINERS {
            let request =
                container_create(ae_id, &platform.access_token, parent.clone(), name);
            match self.requester.request(request).await {
                Ok(Some(r)) if r.is_created() => info!(container = name, "container created"),
                Ok(Some(r)) if r.is_conflict() => {
                    debug!(container = name, "container already exists")
                }
                Ok(Some(r)) => {
                    warn!(container = name, rsc = r.rsc, "container create rejected, skipping")
                }
                Ok(None) => warn!(container = name, "container create timed out, skipping"),
                Err(e) => warn!(container = name, error = %e, "container create failed, skipping"),
            }
            tokio::time::sleep(platform.setup_step_delay()).await;
        }
        Ok(())
    }

    /// Subscribe to the platform-writable containers. Failures are skipped.
    async fn create_subscriptions(&self, ae_id: &str) -> Result<()> {
        let platform = &self.platform;
        let notify_uri = format!("/{}/{ae_id}", platform.cse_id);

        for name in SUBSCRIBED_CONTAINERS {
            let to = format!("{}/{ae_id}/{name}", platform.cse_base());
            let request = subscription_create(
                ae_id,
                &platform.access_token,
                to,
                name,
                &notify_uri,
            );
            match self.requester.request(request).await {
                Ok(Some(r)) if r.is_created() => {
                    info!(container = name, "subscription created")
                }
                Ok(Some(r)) if r.is_conflict() => {
                    debug!(container = name, "subscription already exists")
                }
                Ok(Some(r)) => {
                    warn!(container = name, rsc = r.rsc, "subscription rejected, skipping")
                }
                Ok(None) => warn!(container = name, "subscription timed out, skipping"),
                Err(e) => warn!(container = name, error = %e, "subscription failed, skipping"),
            }
            tokio::time::sleep(platform.setup_step_delay()).await;
        }
        Ok(())
    }
}

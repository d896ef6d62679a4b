//! obdlink-bridge binary entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use obdlink_bridge::{
    BridgeState, CloudLink, Config, Poller, Provisioner, Requester, SessionStore, Status,
    TelemetryPublisher,
};
use obdlink_core::ElmSession;

#[derive(Parser, Debug)]
#[command(
    name = "obdlink-bridge",
    about = "Poll an OBD-II adapter and bridge telemetry to a oneM2M platform",
    version
)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "obdlink.toml")]
    config: PathBuf,

    /// Override the adapter address (host:port)
    #[arg(long)]
    device: Option<String>,

    /// Override the MQTT broker URL
    #[arg(long)]
    broker: Option<String>,

    /// Override the platform device id
    #[arg(long)]
    device_id: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = if args.config.exists() {
        Config::load(&args.config)
            .with_context(|| format!("loading {}", args.config.display()))?
    } else {
        info!(path = %args.config.display(), "no config file, using defaults");
        Config::default()
    };
    if let Some(device) = args.device {
        config.device.address = device;
    }
    if let Some(broker) = args.broker {
        config.mqtt.broker = broker;
    }
    if let Some(device_id) = args.device_id {
        config.platform.device_id = device_id;
    }
    config.validate()?;

    run(config).await
}

async fn run(config: Config) -> anyhow::Result<()> {
    let state = BridgeState::new();

    // The watch channel is the bridge's feedback surface; render every
    // transition into the log.
    {
        let state = state.clone();
        let mut status_rx = state.subscribe();
        tokio::spawn(async move {
            while status_rx.changed().await.is_ok() {
                let status = status_rx.borrow_and_update().clone();
                info!(status = %status, polling = state.is_running(), "bridge status");
            }
        });
    }

    state.set_status(Status::Connecting);

    let store = Arc::new(Mutex::new(
        SessionStore::open(&config.storage.path).context("opening session store")?,
    ));

    let (cloud, mut notify_rx) =
        CloudLink::connect(&config.mqtt, &config.platform).context("connecting to broker")?;
    let cloud = Arc::new(cloud);
    let requester: Arc<dyn Requester> = cloud.clone();

    // Surface platform pushes (commands, config changes) in the log.
    tokio::spawn(async move {
        while let Some(content) = notify_rx.recv().await {
            info!(content, "platform notification");
        }
    });

    state.set_status(Status::Provisioning);
    let provisioner = Provisioner::new(
        requester.clone(),
        store.clone(),
        config.platform.clone(),
    );
    let ae_id = match provisioner.run().await {
        Ok(ae_id) => ae_id,
        Err(e) => {
            error!(error = %e, "provisioning failed");
            state.set_status(Status::Error(e.to_string()));
            cloud.disconnect().await;
            return Err(e.into());
        }
    };
    info!(ae_id, "device provisioned");

    let session = match ElmSession::connect(&config.device.address).await {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "adapter connection failed");
            state.set_status(Status::Error(e.to_string()));
            cloud.disconnect().await;
            return Err(e.into());
        }
    };
    state.set_status(Status::Connected);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                cancel.cancel();
            }
        });
    }

    let (snapshot_tx, snapshot_rx) = mpsc::channel(8);
    let publisher =
        TelemetryPublisher::new(requester, store.clone(), config.platform.clone());
    let publisher_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { publisher.run(snapshot_rx, cancel).await })
    };

    let poller = Poller::new(
        session,
        config.selected_pids(),
        config.device.poll_interval(),
        snapshot_tx,
    );

    state.set_status(Status::Ready);
    state.set_running(true);
    let result = poller.run(cancel.clone()).await;
    state.set_running(false);

    cancel.cancel();
    if let Err(e) = publisher_task.await {
        warn!(error = %e, "publisher task panicked");
    }
    cloud.disconnect().await;

    match result {
        Ok(()) => {
            state.set_status(Status::Stopped);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "polling failed");
            state.set_status(Status::Error(e.to_string()));
            Err(e.into())
        }
    }
}

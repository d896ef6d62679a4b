//! The polling scheduler.
//!
//! One task owns the adapter session and walks the configured PID list on
//! a fixed cadence. Each cycle queries every PID in catalog order, decodes
//! the raw response into the reading's value slot, then hands an
//! independent snapshot to the publisher channel. Decode failures never
//! stop the loop; only a broken adapter stream does.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use obdlink_core::ElmSession;
use obdlink_types::decode::{NO_DATA, decode};
use obdlink_types::pid::{Pid, PidReading, Snapshot};

use crate::error::Result;

/// Polls an adapter session and emits snapshots.
pub struct Poller<S> {
    session: ElmSession<S>,
    readings: Vec<PidReading>,
    interval: Duration,
    snapshot_tx: mpsc::Sender<Snapshot>,
}

impl<S> Poller<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Create a poller over an open session.
    pub fn new(
        session: ElmSession<S>,
        pids: Vec<Pid>,
        interval: Duration,
        snapshot_tx: mpsc::Sender<Snapshot>,
    ) -> Self {
        Self {
            session,
            readings: pids.into_iter().map(PidReading::new).collect(),
            interval,
            snapshot_tx,
        }
    }

    /// Initialize the adapter and poll until cancelled or the stream dies.
    ///
    /// The session is shut down on every exit path. An `Err` return means
    /// the adapter stream failed mid-cycle.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        if let Err(e) = self.session.initialize().await {
            self.session.shutdown().await;
            return Err(e.into());
        }
        info!(pids = self.readings.len(), interval = ?self.interval, "polling started");

        loop {
            for index in 0..self.readings.len() {
                let command = self.readings[index].pid.command.clone();
                let raw = tokio::select! {
                    _ = cancel.cancelled() => None,
                    raw = self.session.query(&command) => Some(raw),
                };
                let Some(raw) = raw else {
                    self.stop().await;
                    return Ok(());
                };
                self.readings[index].value = match raw {
                    Ok(Some(response)) => decode(&command, &response),
                    Ok(None) => NO_DATA.to_string(),
                    Err(e) => {
                        self.session.shutdown().await;
                        return Err(e.into());
                    }
                };
            }

            let snapshot = Snapshot::capture(self.readings.clone());
            debug!(captured_at = %snapshot.captured_at, "cycle complete");
            if self.snapshot_tx.send(snapshot).await.is_err() {
                // Publisher gone; nothing left to poll for.
                self.stop().await;
                return Ok(());
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    self.stop().await;
                    return Ok(());
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    async fn stop(&mut self) {
        self.session.shutdown().await;
        info!("polling stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obdlink_types::pid::pid_by_command;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    /// Script the adapter side: read CR-terminated commands and answer each
    /// from the table, with echo on for realism.
    async fn scripted_adapter(
        mut far: tokio::io::DuplexStream,
        responses: Vec<(&'static str, &'static str)>,
    ) {
        for (expected, response) in responses {
            let mut command = Vec::new();
            let mut byte = [0u8; 1];
            loop {
                if far.read_exact(&mut byte).await.is_err() {
                    return;
                }
                if byte[0] == b'\r' {
                    break;
                }
                command.push(byte[0]);
            }
            assert_eq!(String::from_utf8(command).unwrap(), expected);
            far.write_all(response.as_bytes()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_one_cycle_decodes_and_snapshots() {
        let (near, far) = duplex(1024);
        let adapter = tokio::spawn(scripted_adapter(
            far,
            vec![
                ("ATZ", "ATZ\rELM327 v1.5\r\r>"),
                ("ATE0", "OK\r\r>"),
                ("010C", "41 0C 1A F8\r\r>"),
                ("010D", "41 0D 3C\r\r>"),
            ],
        ));

        let pids = vec![
            pid_by_command("010C").unwrap(),
            pid_by_command("010D").unwrap(),
        ];
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let poller = Poller::new(
            ElmSession::new(near),
            pids,
            Duration::from_secs(60),
            tx,
        );

        let handle = tokio::spawn(poller.run(cancel.clone()));

        let snapshot = rx.recv().await.unwrap();
        let map = snapshot.value_map();
        assert_eq!(map.get("engine_rpm").unwrap(), "1726");
        assert_eq!(map.get("vehicle_speed").unwrap(), "60");

        cancel.cancel();
        handle.await.unwrap().unwrap();
        adapter.await.unwrap();
    }

    #[tokio::test]
    async fn test_no_data_keeps_polling() {
        let (near, far) = duplex(1024);
        let adapter = tokio::spawn(scripted_adapter(
            far,
            vec![
                ("ATZ", "\r>"),
                ("ATE0", "\r>"),
                // Adapter answers with a blank response for the first PID.
                ("010C", "\r>"),
                ("010D", "41 0D 00\r\r>"),
            ],
        ));

        let pids = vec![
            pid_by_command("010C").unwrap(),
            pid_by_command("010D").unwrap(),
        ];
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let poller = Poller::new(
            ElmSession::new(near),
            pids,
            Duration::from_secs(60),
            tx,
        );
        let handle = tokio::spawn(poller.run(cancel.clone()));

        let snapshot = rx.recv().await.unwrap();
        let map = snapshot.value_map();
        assert_eq!(map.get("engine_rpm").unwrap(), NO_DATA);
        assert_eq!(map.get("vehicle_speed").unwrap(), "0");

        cancel.cancel();
        handle.await.unwrap().unwrap();
        adapter.await.unwrap();
    }

    #[tokio::test]
    async fn test_dead_stream_ends_the_run_with_an_error() {
        let (near, far) = duplex(1024);
        // Adapter disappears immediately.
        drop(far);

        let pids = vec![pid_by_command("010C").unwrap()];
        let (tx, _rx) = mpsc::channel(1);
        let poller = Poller::new(
            ElmSession::new(near),
            pids,
            Duration::from_secs(60),
            tx,
        );

        let result = poller.run(CancellationToken::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_closed_snapshot_channel_stops_cleanly() {
        let (near, far) = duplex(1024);
        let adapter = tokio::spawn(scripted_adapter(
            far,
            vec![("ATZ", "\r>"), ("ATE0", "\r>"), ("010C", "41 0C 00 00\r\r>")],
        ));

        let pids = vec![pid_by_command("010C").unwrap()];
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let poller = Poller::new(
            ElmSession::new(near),
            pids,
            Duration::from_secs(60),
            tx,
        );
        poller.run(CancellationToken::new()).await.unwrap();
        adapter.await.unwrap();
    }
}

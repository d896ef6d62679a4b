//! The ELM327 device session.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{COMMAND_TERMINATOR, PROMPT, clean_response, is_payload_byte};

/// Commands sent once after connect: reset, then echo off.
const INIT_COMMANDS: [&str; 2] = ["ATZ", "ATE0"];

/// A half-duplex session with an ELM327-style adapter.
///
/// The session takes exclusive ownership of the byte stream; all operations
/// borrow `&mut self`, so a second command cannot overlap the previous
/// response. `ElmSession` intentionally does not implement `Clone`: one
/// live session per adapter.
pub struct ElmSession<S> {
    stream: BufReader<S>,
}

impl ElmSession<TcpStream> {
    /// Connect to an adapter reachable over TCP (WiFi adapters, or a
    /// Bluetooth SPP device bridged to an RFCOMM socket).
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| Error::connection_failed(addr, e.to_string()))?;
        debug!(%addr, "connected to adapter");
        Ok(Self::new(stream))
    }
}

impl<S> ElmSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already-open byte stream in a session.
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    /// Send the reset and echo-off commands, discarding their responses.
    pub async fn initialize(&mut self) -> Result<()> {
        for command in INIT_COMMANDS {
            self.send(command).await?;
            let discarded = self.read_response().await?;
            debug!(command, response = ?discarded, "init response discarded");
        }
        Ok(())
    }

    /// Write `command` plus a carriage return and flush.
    ///
    /// Fire-and-forget: the write itself is not acknowledged by the adapter.
    pub async fn send(&mut self, command: &str) -> Result<()> {
        self.stream.write_all(command.as_bytes()).await?;
        self.stream
            .write_all(COMMAND_TERMINATOR.as_bytes())
            .await?;
        self.stream.flush().await?;
        debug!(command, "sent");
        Ok(())
    }

    /// Read one response: accumulate bytes until the `>` prompt, then clean.
    ///
    /// The prompt itself is discarded. Non-payload bytes are silently
    /// dropped while accumulating. `Ok(None)` means the adapter produced no
    /// data line (echo and blanks only), which callers treat as "no data".
    /// A stream that ends before the prompt is an error.
    pub async fn read_response(&mut self) -> Result<Option<String>> {
        let mut buffer = String::new();
        let mut byte = [0u8; 1];
        loop {
            let n = self.stream.read(&mut byte).await?;
            if n == 0 {
                return Err(Error::StreamClosed);
            }
            if byte[0] == PROMPT {
                break;
            }
            if is_payload_byte(byte[0]) {
                buffer.push(byte[0] as char);
            }
        }
        let cleaned = clean_response(&buffer);
        debug!(response = ?cleaned, "received");
        Ok(cleaned)
    }

    /// Send a command and read its response.
    pub async fn query(&mut self, command: &str) -> Result<Option<String>> {
        self.send(command).await?;
        self.read_response().await
    }

    /// Best-effort close of the stream. Failures are logged, not propagated.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            warn!(error = %e, "error closing adapter stream");
        }
    }
}

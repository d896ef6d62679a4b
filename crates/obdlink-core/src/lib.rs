//! ELM327 serial session for OBD-II adapters.
//!
//! This crate drives a half-duplex command/response link to an ELM327-style
//! adapter: plaintext commands terminated by a carriage return go out,
//! plaintext responses terminated by a `>` prompt come back, optionally
//! echoing the sent command as a line the reader discards.
//!
//! The session is generic over any async byte stream. WiFi adapters (and
//! Bluetooth adapters bridged to an RFCOMM TCP socket) connect via
//! [`ElmSession::connect`]; tests script the far end of a
//! [`tokio::io::duplex`] pair.
//!
//! # Quick Start
//!
//! ```no_run
//! use obdlink_core::ElmSession;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = ElmSession::connect("192.168.0.10:35000").await?;
//!     session.initialize().await?;
//!
//!     if let Some(response) = session.query("010C").await? {
//!         println!("raw rpm response: {response}");
//!     }
//!
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod protocol;
pub mod session;

pub use error::{Error, Result};
pub use protocol::clean_response;
pub use session::ElmSession;

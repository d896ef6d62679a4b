//! Platform-agnostic types for OBD-II telemetry and the oneM2M wire model.
//!
//! This crate holds everything that does not touch an I/O resource:
//!
//! - **PID catalog**: the fixed set of diagnostic parameters the bridge
//!   polls, with display names and units ([`pid`]).
//! - **Decoder**: the pure hexadecimal-payload-to-physical-unit conversion
//!   for each supported PID ([`decode`]).
//! - **oneM2M wire model**: request/response primitives, payload builders,
//!   and one-shot classification of inbound broker messages ([`onem2m`]).
//!
//! # Example
//!
//! ```
//! use obdlink_types::decode;
//!
//! // Engine RPM: 0x1A * 256 + 0xF8 = 6904, divided by 4.
//! assert_eq!(decode("010C", "41 0C 1A F8"), "1726");
//! ```

pub mod decode;
pub mod error;
pub mod onem2m;
pub mod pid;

pub use decode::{NO_DATA, NOT_APPLICABLE, NOT_SUPPORTED, PARSE_ERROR, decode};
pub use error::{ParseError, ParseResult};
pub use onem2m::{Inbound, RequestPrimitive, ResponsePrimitive};
pub use pid::{Pid, PidReading, Snapshot, standard_pids};

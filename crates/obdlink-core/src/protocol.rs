//! Wire-level helpers for the ELM327 prompt protocol.

/// The prompt byte that terminates every adapter response.
pub const PROMPT: u8 = b'>';

/// Carriage return terminating every outbound command.
pub const COMMAND_TERMINATOR: &str = "\r";

/// Whether an accumulated byte is part of a response payload.
///
/// Only alphanumerics and whitespace survive; everything else is adapter
/// line noise or protocol control characters.
pub fn is_payload_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte.is_ascii_whitespace()
}

/// Reduce an accumulated response buffer to the cleaned data line.
///
/// The buffer is split into lines; the last non-blank line that does not
/// contain `"AT"` is the response. This discards echoed configuration
/// commands (which start with `AT`) and blank trailing artifacts.
/// `None` means the adapter produced no data line, which callers treat as
/// "no data" rather than an error.
///
/// # Examples
///
/// ```
/// use obdlink_core::clean_response;
///
/// assert_eq!(
///     clean_response("ATE0\r\nOK\r\n"),
///     Some("OK".to_string()),
/// );
/// assert_eq!(clean_response("\r\n \r\n"), None);
/// ```
pub fn clean_response(raw: &str) -> Option<String> {
    raw.lines()
        .rev()
        .find(|line| !line.trim().is_empty() && !line.contains("AT"))
        .map(|line| line.trim().to_string())
}

//! Pure decoding of OBD-II mode-01 response payloads.
//!
//! [`decode`] is a total function over `(command, response)`: every outcome,
//! including malformed input, maps to a string. Failures become sentinel
//! values rather than errors so that one bad adapter response can never
//! abort the polling loop.

use crate::error::{ParseError, ParseResult};

/// Sentinel for a reading that has not been polled yet.
pub const NO_DATA: &str = "--";
/// Sentinel for a response that does not match the expected header.
pub const NOT_APPLICABLE: &str = "N/A";
/// Sentinel for a command the decoder has no formula for.
pub const NOT_SUPPORTED: &str = "unsupported";
/// Sentinel for a response whose hex payload could not be parsed.
pub const PARSE_ERROR: &str = "parse error";

/// Decode a cleaned adapter response into a physical-unit value string.
///
/// The response is expected to be the cleaned single line produced by the
/// serial protocol reader, e.g. `"41 0C 1A F8"` for command `"010C"`.
///
/// - A response that does not start with `41` + the PID suffix yields
///   [`NOT_APPLICABLE`] (negative response or unrelated echo).
/// - A command outside the catalog formulas yields [`NOT_SUPPORTED`].
/// - Malformed or short hex yields [`PARSE_ERROR`].
///
/// # Examples
///
/// ```
/// use obdlink_types::decode::{decode, NOT_APPLICABLE};
///
/// assert_eq!(decode("010C", "41 0C 1A F8"), "1726");
/// assert_eq!(decode("010D", "41 0D 3C"), "60");
/// assert_eq!(decode("010C", "NO DATA"), NOT_APPLICABLE);
/// ```
pub fn decode(command: &str, response: &str) -> String {
    let clean: String = response
        .chars()
        .filter(|c| *c != ' ' && *c != '>')
        .collect();
    if clean.is_empty() {
        return NO_DATA.to_string();
    }

    // Positive mode-01 responses echo service byte 0x41 followed by the
    // PID's last two hex digits.
    let Some(suffix) = command.get(2..) else {
        return NOT_SUPPORTED.to_string();
    };
    let header = format!("41{suffix}");
    let Some(hex) = clean.strip_prefix(&header) else {
        return NOT_APPLICABLE.to_string();
    };

    match decode_value(command, hex) {
        Ok(value) => value,
        Err(_) => PARSE_ERROR.to_string(),
    }
}

/// Apply the per-command conversion formula to the hex data payload.
fn decode_value(command: &str, hex: &str) -> ParseResult<String> {
    Ok(match command {
        // Vehicle speed: raw byte as decimal km/h.
        "010D" => whole(hex)?.to_string(),
        // Engine RPM: ((A * 256) + B) / 4, integer division.
        "010C" => (word(hex)? / 4).to_string(),
        // Coolant / intake-air temperature: A - 40 °C.
        "0105" | "010F" => (whole(hex)? as i64 - 40).to_string(),
        // Engine load / throttle position: A * 100 / 255 %.
        "0104" | "0111" => format!("{:.1}", whole(hex)? as f64 * 100.0 / 255.0),
        // Fuel rate: ((A * 256) + B) / 20 L/h.
        "015E" => format!("{:.2}", word(hex)? as f64 / 20.0),
        // Distance traveled: (A * 256) + B km.
        "0131" => word(hex)?.to_string(),
        // Module voltage: ((A * 256) + B) / 1000 V.
        "0142" => format!("{:.2}", word(hex)? as f64 / 1000.0),
        _ => NOT_SUPPORTED.to_string(),
    })
}

/// Parse the entire payload as one hexadecimal number.
fn whole(hex: &str) -> ParseResult<u64> {
    if hex.is_empty() {
        return Err(ParseError::ShortPayload {
            expected: 2,
            actual: 0,
        });
    }
    u64::from_str_radix(hex, 16).map_err(|_| ParseError::InvalidHex(hex.to_string()))
}

/// Parse the first two payload bytes as a big-endian 16-bit word.
fn word(hex: &str) -> ParseResult<u32> {
    if hex.len() < 4 {
        return Err(ParseError::ShortPayload {
            expected: 4,
            actual: hex.len(),
        });
    }
    let a = byte_at(hex, 0)?;
    let b = byte_at(hex, 2)?;
    Ok(a * 256 + b)
}

fn byte_at(hex: &str, offset: usize) -> ParseResult<u32> {
    let digits = hex
        .get(offset..offset + 2)
        .ok_or(ParseError::ShortPayload {
            expected: offset + 2,
            actual: hex.len(),
        })?;
    u32::from_str_radix(digits, 16).map_err(|_| ParseError::InvalidHex(digits.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rpm() {
        // (0x1A * 256 + 0xF8) / 4 = 6904 / 4 = 1726
        assert_eq!(decode("010C", "410C1AF8"), "1726");
        assert_eq!(decode("010C", "41 0C 1A F8"), "1726");
        assert_eq!(decode("010C", "41 0C 1A F8 >"), "1726");
    }

    #[test]
    fn test_decode_speed() {
        assert_eq!(decode("010D", "41 0D 3C"), "60");
        assert_eq!(decode("010D", "41 0D 00"), "0");
        assert_eq!(decode("010D", "41 0D FF"), "255");
    }

    #[test]
    fn test_decode_temperatures() {
        // A - 40: 0x5A = 90 -> 50 °C
        assert_eq!(decode("0105", "41 05 5A"), "50");
        assert_eq!(decode("010F", "41 0F 28"), "0");
        // Below-zero readings are representable.
        assert_eq!(decode("0105", "41 05 00"), "-40");
    }

    #[test]
    fn test_decode_percentages() {
        assert_eq!(decode("0104", "41 04 FF"), "100.0");
        assert_eq!(decode("0111", "41 11 00"), "0.0");
        // 0x80 = 128 -> 50.2%
        assert_eq!(decode("0104", "41 04 80"), "50.2");
    }

    #[test]
    fn test_decode_fuel_rate() {
        // 0x00C8 = 200 -> 10.00 L/h
        assert_eq!(decode("015E", "41 5E 00 C8"), "10.00");
    }

    #[test]
    fn test_decode_distance() {
        // 0x1234 = 4660 km
        assert_eq!(decode("0131", "41 31 12 34"), "4660");
    }

    #[test]
    fn test_decode_voltage() {
        // 0x35E4 = 13796 -> 13.80 V
        assert_eq!(decode("0142", "41 42 35 E4"), "13.80");
    }

    #[test]
    fn test_header_mismatch_is_not_applicable() {
        assert_eq!(decode("010C", "NO DATA"), NOT_APPLICABLE);
        assert_eq!(decode("010C", "7F 01 12"), NOT_APPLICABLE);
        // Response for a different PID.
        assert_eq!(decode("010C", "41 0D 3C"), NOT_APPLICABLE);
    }

    #[test]
    fn test_malformed_hex_is_parse_error() {
        // Odd-length payload for a word formula.
        assert_eq!(decode("010C", "41 0C 1A"), PARSE_ERROR);
        // Non-hex garbage after a valid header.
        assert_eq!(decode("010D", "41 0D ZZ"), PARSE_ERROR);
        // Header only, no payload.
        assert_eq!(decode("010D", "41 0D"), PARSE_ERROR);
    }

    #[test]
    fn test_unknown_command_is_not_supported() {
        assert_eq!(decode("0133", "41 33 12"), NOT_SUPPORTED);
    }

    #[test]
    fn test_empty_response_is_no_data() {
        assert_eq!(decode("010C", ""), NO_DATA);
        assert_eq!(decode("010C", "  "), NO_DATA);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // decode never panics, whatever the adapter hands back.
            #[test]
            fn decode_is_total(command in "[0-9A-F]{0,6}", response in ".{0,64}") {
                let _ = decode(&command, &response);
            }

            // decode is deterministic.
            #[test]
            fn decode_is_deterministic(response in "[0-9A-F ]{0,16}") {
                prop_assert_eq!(decode("010C", &response), decode("010C", &response));
            }

            // Well-formed RPM payloads always decode to the documented formula.
            #[test]
            fn rpm_formula(a in 0u32..=255, b in 0u32..=255) {
                let response = format!("410C{a:02X}{b:02X}");
                let expected = ((a * 256 + b) / 4).to_string();
                prop_assert_eq!(decode("010C", &response), expected);
            }
        }
    }
}

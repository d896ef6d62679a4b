//! PID catalog and telemetry readings.
//!
//! A PID (Parameter ID) is a fixed four-hex-digit code identifying one
//! vehicle telemetry quantity in the OBD-II diagnostic protocol. The bridge
//! polls a configured subset of the catalog returned by [`standard_pids`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::decode::NO_DATA;

/// An immutable PID definition: command code, display name, and unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pid {
    /// The four-hex-digit command sent to the adapter, e.g. `"010C"`.
    pub command: String,
    /// Identifier used as the key in published telemetry, e.g. `"engine_rpm"`.
    pub name: String,
    /// Display unit, e.g. `"rpm"` or `"km/h"`.
    pub unit: String,
}

impl Pid {
    /// Create a PID definition.
    pub fn new(
        command: impl Into<String>,
        name: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            name: name.into(),
            unit: unit.into(),
        }
    }
}

/// A PID definition paired with its most recently decoded value.
///
/// The value starts at the [`NO_DATA`] sentinel and is overwritten every
/// poll cycle; the identity (command, name, unit) never changes. Readings
/// are cloned into a [`Snapshot`] before publishing so the next poll cycle
/// cannot race with a publish in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidReading {
    /// The immutable definition.
    pub pid: Pid,
    /// The current decoded value, or a sentinel.
    pub value: String,
}

impl PidReading {
    /// Create a reading with the "no data yet" sentinel value.
    pub fn new(pid: Pid) -> Self {
        Self {
            pid,
            value: NO_DATA.to_string(),
        }
    }
}

/// A point-in-time copy of all configured readings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// The readings, in catalog order.
    pub readings: Vec<PidReading>,
    /// When the snapshot was taken.
    #[serde(with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
}

impl Snapshot {
    /// Capture a snapshot of the given readings at the current time.
    pub fn capture(readings: Vec<PidReading>) -> Self {
        Self {
            readings,
            captured_at: OffsetDateTime::now_utc(),
        }
    }

    /// Flatten the readings into a `name -> value` map.
    ///
    /// A `BTreeMap` keeps the serialized key order stable across publishes.
    pub fn value_map(&self) -> BTreeMap<String, String> {
        self.readings
            .iter()
            .map(|r| (r.pid.name.clone(), r.value.clone()))
            .collect()
    }
}

/// The fixed PID catalog used by the polling scheduler.
pub fn standard_pids() -> Vec<Pid> {
    vec![
        Pid::new("010C", "engine_rpm", "rpm"),
        Pid::new("010D", "vehicle_speed", "km/h"),
        Pid::new("0105", "coolant_temp", "°C"),
        Pid::new("0104", "engine_load", "%"),
        Pid::new("010F", "intake_air_temp", "°C"),
        Pid::new("0111", "throttle_position", "%"),
        Pid::new("015E", "fuel_rate", "L/h"),
        Pid::new("0131", "distance_traveled", "km"),
        Pid::new("0142", "module_voltage", "V"),
    ]
}

/// Look up a catalog PID by its command code.
pub fn pid_by_command(command: &str) -> Option<Pid> {
    standard_pids().into_iter().find(|p| p.command == command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_commands() {
        let pids = standard_pids();
        assert_eq!(pids.len(), 9);
        let commands: Vec<&str> = pids.iter().map(|p| p.command.as_str()).collect();
        for expected in [
            "010C", "010D", "0105", "0104", "010F", "0111", "015E", "0131", "0142",
        ] {
            assert!(commands.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn test_reading_starts_with_no_data() {
        let reading = PidReading::new(Pid::new("010C", "engine_rpm", "rpm"));
        assert_eq!(reading.value, NO_DATA);
    }

    #[test]
    fn test_pid_by_command() {
        let pid = pid_by_command("010D").unwrap();
        assert_eq!(pid.name, "vehicle_speed");
        assert_eq!(pid.unit, "km/h");
        assert!(pid_by_command("01FF").is_none());
    }

    #[test]
    fn test_snapshot_value_map() {
        let mut rpm = PidReading::new(pid_by_command("010C").unwrap());
        rpm.value = "1726".to_string();
        let speed = PidReading::new(pid_by_command("010D").unwrap());

        let snapshot = Snapshot::capture(vec![rpm, speed]);
        let map = snapshot.value_map();
        assert_eq!(map.get("engine_rpm").unwrap(), "1726");
        assert_eq!(map.get("vehicle_speed").unwrap(), NO_DATA);
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let mut readings = vec![PidReading::new(pid_by_command("010C").unwrap())];
        let snapshot = Snapshot::capture(readings.clone());

        // Mutating the live readings must not affect the snapshot.
        readings[0].value = "999".to_string();
        assert_eq!(snapshot.readings[0].value, NO_DATA);
    }

    #[test]
    fn test_snapshot_serializes_timestamp() {
        let snapshot = Snapshot::capture(vec![]);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("captured_at"));
    }
}

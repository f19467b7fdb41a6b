//! # Sensor Controller Telemetry
//!
//! The module's sensor controller streams newline-delimited JSON objects of the form
//!
//! ```text
//! { "proximityDistanceCm": 8.5, "dockTagId": "A1" }
//! ```
//!
//! Either field may be absent or `null`. The legacy controller firmware uses the keys
//! `ULTRASONIC_BACK` and `NFC_UID`, which are accepted as aliases.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single decoded reading from the sensor controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    /// Distance measured by the rear proximity sensor, in centimetres.
    #[serde(default, alias = "ULTRASONIC_BACK")]
    pub proximity_distance_cm: Option<f64>,

    /// Identifier of the dock tag read by the short-range tag reader, if one is in range.
    #[serde(default, alias = "NFC_UID")]
    pub dock_tag_id: Option<String>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur while decoding a telemetry line.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryParseError {
    #[error("Telemetry line is not a valid reading: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Proximity distance must be a finite, non-negative number, got {0}")]
    InvalidProximity(f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SensorReading {
    /// Decode a single telemetry line.
    ///
    /// Returns `Ok(None)` for blank lines, which the controller emits as keepalives.
    pub fn from_line(line: &str) -> Result<Option<Self>, TelemetryParseError> {
        let line = line.trim();

        if line.is_empty() {
            return Ok(None)
        }

        let mut reading: Self = serde_json::from_str(line)
            .map_err(TelemetryParseError::InvalidJson)?;

        if let Some(d) = reading.proximity_distance_cm {
            if !d.is_finite() || d < 0.0 {
                return Err(TelemetryParseError::InvalidProximity(d))
            }
        }

        // An empty tag string is what the reader sends when nothing is in range
        if let Some(ref tag) = reading.dock_tag_id {
            if tag.trim().is_empty() {
                reading.dock_tag_id = None;
            }
        }

        Ok(Some(reading))
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

//! Measurement row model.
//!
//! One row of the `ToP` table. Sweep rows carry only the five core columns;
//! capture rows additionally carry [`CaptureDetails`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureDetails {
    pub antenna: u8,
    pub timestamp_secs: u64,
    pub read_count: u32,
    pub protocol: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementRecord {
    pub epc: String,
    pub rssi: i32,
    pub phase: i32,
    pub frequency: u32,
    pub power: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<CaptureDetails>,
}

impl MeasurementRecord {
    pub fn sweep(epc: impl Into<String>, rssi: i32, phase: i32, frequency: u32, power: i32) -> Self {
        Self {
            epc: epc.into(),
            rssi,
            phase,
            frequency,
            power,
            capture: None,
        }
    }

    pub fn with_capture(mut self, details: CaptureDetails) -> Self {
        self.capture = Some(details);
        self
    }
}

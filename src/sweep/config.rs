use std::{collections::HashSet, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::SweepError;

pub const DEFAULT_TAGS_OF_INTEREST: [&str; 2] =
    ["E200493F3185AD7126ACF6B5", "E200493F38187C3126BE51F0"];
pub const DEFAULT_MIN_FREQ_KHZ: u32 = 840_000;
pub const DEFAULT_MAX_FREQ_KHZ: u32 = 928_000;
pub const DEFAULT_FREQ_STEP_MHZ: f64 = 5.0;
pub const DEFAULT_MIN_POWER: i32 = 3150;
pub const DEFAULT_MAX_POWER: i32 = 3150;
pub const DEFAULT_POWER_STEP: i32 = 100;
pub const DEFAULT_SWEEP_REGION_INDEX: usize = 22;
pub const DEFAULT_SWEEP_DATABASE: &str = "measurements.db";

pub const DEFAULT_CAPTURE_POWER: i32 = 3000;
pub const DEFAULT_CAPTURE_SECS: u64 = 5;
pub const DEFAULT_CAPTURE_REGION_INDEX: usize = 1;
pub const DEFAULT_CAPTURE_DATABASE: &str = "default.db";

pub const DEFAULT_DWELL_MS: u64 = 500;
pub const DEFAULT_SETTLE_MS: u64 = 500;
pub const DEFAULT_PLAN_TIMEOUT_MS: u32 = 1000;

/// Frequency axis in kHz; the step is given in MHz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrequencyRange {
    pub min_khz: u32,
    pub max_khz: u32,
    pub step_mhz: f64,
}

impl FrequencyRange {
    /// Grid offset in kHz of the `index`-th frequency, truncated. Scaling the
    /// index first keeps steps like 0.3 MHz from losing a kHz to rounding.
    pub fn offset_khz(&self, index: u64) -> u64 {
        (index.saturating_mul(1000) as f64 * self.step_mhz) as u64
    }
}

impl Default for FrequencyRange {
    fn default() -> Self {
        Self {
            min_khz: DEFAULT_MIN_FREQ_KHZ,
            max_khz: DEFAULT_MAX_FREQ_KHZ,
            step_mhz: DEFAULT_FREQ_STEP_MHZ,
        }
    }
}

/// Read power axis in centi-dBm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerRange {
    pub min: i32,
    pub max: i32,
    pub step: i32,
}

impl Default for PowerRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_POWER,
            max: DEFAULT_MAX_POWER,
            step: DEFAULT_POWER_STEP,
        }
    }
}

/// How to reach and prepare the reader, shared by both run modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderConfig {
    pub uri: String,
    pub antennas: Vec<u8>,
    /// Read power applied during preparation; left untouched when `None`.
    pub read_power: Option<i32>,
    pub region_index: usize,
    pub plan_timeout_ms: u32,
    pub print_metadata: bool,
}

impl ReaderConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            antennas: Vec::new(),
            read_power: None,
            region_index: DEFAULT_SWEEP_REGION_INDEX,
            plan_timeout_ms: DEFAULT_PLAN_TIMEOUT_MS,
            print_metadata: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    pub reader: ReaderConfig,
    pub database: PathBuf,
    pub frequency: FrequencyRange,
    pub power: PowerRange,
    pub tags_of_interest: Vec<String>,
    pub dwell: Duration,
    pub settle: Duration,
    /// Number of times the grid is walked; zero repeats until cancelled.
    pub passes: u32,
}

impl SweepConfig {
    pub fn new(reader: ReaderConfig) -> Self {
        Self {
            reader,
            database: PathBuf::from(DEFAULT_SWEEP_DATABASE),
            frequency: FrequencyRange::default(),
            power: PowerRange::default(),
            tags_of_interest: DEFAULT_TAGS_OF_INTEREST
                .iter()
                .map(|tag| tag.to_string())
                .collect(),
            dwell: Duration::from_millis(DEFAULT_DWELL_MS),
            settle: Duration::from_millis(DEFAULT_SETTLE_MS),
            passes: 1,
        }
    }

    /// Checks the invariants the grid walk relies on. An inverted range is
    /// not an error; it yields an empty grid.
    pub fn validate(&self) -> Result<(), SweepError> {
        let step = self.frequency.step_mhz;
        if !step.is_finite() || step * 1000.0 < 1.0 {
            return Err(SweepError::InvalidConfig(format!(
                "frequency step must be at least 0.001 MHz, got {step}"
            )));
        }
        if self.power.step <= 0 {
            return Err(SweepError::InvalidConfig(format!(
                "power step must be positive, got {}",
                self.power.step
            )));
        }
        if self.tags_of_interest.is_empty() {
            return Err(SweepError::InvalidConfig(
                "at least one tag of interest is required".into(),
            ));
        }
        if let Some(tag) = self
            .tags_of_interest
            .iter()
            .find(|tag| tag.trim().is_empty() || hex::decode(tag.trim()).is_err())
        {
            return Err(SweepError::InvalidConfig(format!(
                "tag of interest '{tag}' is not a hex EPC"
            )));
        }
        let mut seen = HashSet::new();
        if let Some(tag) = self
            .tags_of_interest
            .iter()
            .find(|tag| !seen.insert(tag.trim().to_ascii_uppercase()))
        {
            return Err(SweepError::InvalidConfig(format!(
                "tag of interest '{tag}' is listed more than once"
            )));
        }
        validate_dwell(self.dwell)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    pub reader: ReaderConfig,
    pub database: PathBuf,
    pub duration: Duration,
    pub dwell: Duration,
    pub settle: Duration,
}

impl CaptureConfig {
    pub fn new(mut reader: ReaderConfig) -> Self {
        reader.region_index = DEFAULT_CAPTURE_REGION_INDEX;
        reader.read_power = Some(DEFAULT_CAPTURE_POWER);
        Self {
            reader,
            database: PathBuf::from(DEFAULT_CAPTURE_DATABASE),
            duration: Duration::from_secs(DEFAULT_CAPTURE_SECS),
            dwell: Duration::from_millis(DEFAULT_DWELL_MS),
            settle: Duration::from_millis(DEFAULT_SETTLE_MS),
        }
    }

    pub fn with_power(mut self, power: i32) -> Self {
        self.reader.read_power = Some(power);
        self
    }

    /// Fixed read power applied once at startup and recorded with every row.
    pub fn power(&self) -> i32 {
        self.reader.read_power.unwrap_or(DEFAULT_CAPTURE_POWER)
    }

    pub fn validate(&self) -> Result<(), SweepError> {
        validate_dwell(self.dwell)
    }
}

fn validate_dwell(dwell: Duration) -> Result<(), SweepError> {
    if dwell.is_zero() {
        return Err(SweepError::InvalidConfig(
            "read dwell must be longer than zero".into(),
        ));
    }
    Ok(())
}

use std::time::Duration;

use super::config::{FrequencyRange, PowerRange};

/// A single (frequency, power) point of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepCell {
    pub frequency: u32,
    pub power: i32,
}

/// The one cell of a continuous capture: read at `power` until `budget` has
/// elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCell {
    pub power: i32,
    pub budget: Duration,
}

/// Frequencies of a sweep, `min + trunc(i * 1000 * step)` while `<= max`.
#[derive(Debug, Clone)]
pub struct FrequencyAxis {
    range: FrequencyRange,
    index: u64,
}

impl Iterator for FrequencyAxis {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let value = u64::from(self.range.min_khz) + self.range.offset_khz(self.index);
        if value > u64::from(self.range.max_khz) {
            return None;
        }
        self.index += 1;
        Some(value as u32)
    }
}

/// Read powers tried at each frequency, `min + i * step` while `<= max`.
#[derive(Debug, Clone)]
pub struct PowerAxis {
    range: PowerRange,
    next: i64,
}

impl Iterator for PowerAxis {
    type Item = i32;

    fn next(&mut self) -> Option<i32> {
        if self.range.step <= 0 || self.next > i64::from(self.range.max) {
            return None;
        }
        let value = self.next as i32;
        self.next += i64::from(self.range.step);
        Some(value)
    }
}

/// The frequency/power plane a sweep walks.
///
/// Every accessor hands out a fresh iterator, so the grid can be walked again
/// for repeated passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    frequency: FrequencyRange,
    power: PowerRange,
}

impl Grid {
    pub fn new(frequency: FrequencyRange, power: PowerRange) -> Self {
        Self { frequency, power }
    }

    pub fn frequencies(&self) -> FrequencyAxis {
        FrequencyAxis {
            range: self.frequency,
            index: 0,
        }
    }

    pub fn powers(&self) -> PowerAxis {
        PowerAxis {
            range: self.power,
            next: i64::from(self.power.min),
        }
    }

    /// Cells in visiting order: every power of a frequency before the next
    /// frequency.
    pub fn cells(&self) -> impl Iterator<Item = SweepCell> + '_ {
        self.frequencies().flat_map(move |frequency| {
            self.powers()
                .map(move |power| SweepCell { frequency, power })
        })
    }

    pub fn frequency_count(&self) -> usize {
        self.frequencies().count()
    }

    pub fn power_count(&self) -> usize {
        self.powers().count()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies().next().is_none() || self.powers().next().is_none()
    }
}

pub fn capture_session(power: i32, budget: Duration) -> SessionCell {
    SessionCell { power, budget }
}

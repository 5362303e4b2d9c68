//! In-process reader used for dry runs (`sim:///path/to/scenario.json`) and tests.
//!
//! Two sources of observations are supported. A scenario describes tags as
//! rules (visible above some power, on some frequencies) and every read window
//! is generated from the reader's current hop table and power. A script is a
//! queue of canned read results that is consumed first, one per read, before
//! falling back to the scenario rules.

use std::{
    collections::VecDeque,
    fs,
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::Duration,
};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{
    AntennaReturnLoss, DeviceError, Gen2Metadata, Gen2Target, LinkFrequency, MetadataField,
    MetadataFlags, ParamKey, ParamValue, ReadPlan, ReaderDevice, Region, SplitTimestamp,
    TagObservation, TagProtocol,
};

pub const SCHEME: &str = "sim";

const DEFAULT_FREQUENCY_KHZ: u32 = 915_000;

fn default_reads_per_window() -> u32 {
    1
}

/// A tag the simulated reader can see.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagRule {
    /// Hex-encoded EPC.
    pub epc: String,
    pub rssi: i32,
    #[serde(default)]
    pub phase: i32,
    /// Lowest read power (cdBm) at which the tag answers; any power if unset.
    #[serde(default)]
    pub min_power: Option<i32>,
    /// Hop frequencies (kHz) on which the tag answers; all if empty.
    #[serde(default)]
    pub frequencies: Vec<u32>,
    #[serde(default)]
    pub antenna: Option<u8>,
    #[serde(default = "default_reads_per_window")]
    pub reads_per_window: u32,
}

impl TagRule {
    pub fn new(epc: impl Into<String>, rssi: i32) -> Self {
        Self {
            epc: epc.into(),
            rssi,
            phase: 0,
            min_power: None,
            frequencies: Vec::new(),
            antenna: None,
            reads_per_window: default_reads_per_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Scenario {
    pub model: String,
    pub region: Region,
    pub regions: Vec<Region>,
    pub antenna_detection: bool,
    pub read_power: i32,
    /// Ceiling the reader clamps requested read powers to.
    pub max_read_power: Option<i32>,
    pub return_loss: Vec<AntennaReturnLoss>,
    /// Maximum observations buffered per read window before the reader
    /// reports a full buffer.
    pub buffer_capacity: Option<usize>,
    /// Parameters whose `set_param` fails, for exercising error paths.
    pub reject_params: Vec<ParamKey>,
    pub tags: Vec<TagRule>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            model: "M6e".into(),
            region: Region::NONE,
            regions: (1..=24).map(Region).collect(),
            antenna_detection: true,
            read_power: 3000,
            max_read_power: None,
            return_loss: Vec::new(),
            buffer_capacity: None,
            reject_params: Vec::new(),
            tags: Vec::new(),
        }
    }
}

/// One canned read result.
#[derive(Debug, Clone)]
pub struct ScriptedRead {
    pub outcome: Result<(), DeviceError>,
    pub observations: Vec<TagObservation>,
}

impl ScriptedRead {
    pub fn ok(observations: Vec<TagObservation>) -> Self {
        Self {
            outcome: Ok(()),
            observations,
        }
    }

    pub fn buffer_full(observations: Vec<TagObservation>) -> Self {
        Self {
            outcome: Err(DeviceError::BufferFull),
            observations,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            outcome: Err(DeviceError::Transport(reason.into())),
            observations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Connected(String),
    ParamSet(ParamKey, ParamValue),
    Read(Duration),
    Disconnected,
}

/// Shared record of everything the controller asked the reader to do.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<DeviceEvent>>>);

impl EventLog {
    fn lock(&self) -> MutexGuard<'_, Vec<DeviceEvent>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn push(&self, event: DeviceEvent) {
        self.lock().push(event);
    }

    pub fn snapshot(&self) -> Vec<DeviceEvent> {
        self.lock().clone()
    }

    pub fn reads(&self) -> usize {
        self.lock()
            .iter()
            .filter(|event| matches!(event, DeviceEvent::Read(_)))
            .count()
    }

    pub fn power_sets(&self) -> Vec<i32> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                DeviceEvent::ParamSet(ParamKey::ReadPower, ParamValue::Power(power)) => {
                    Some(*power)
                }
                _ => None,
            })
            .collect()
    }

    pub fn hop_tables(&self) -> Vec<Vec<u32>> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                DeviceEvent::ParamSet(ParamKey::HopTable, ParamValue::HopTable(table)) => {
                    Some(table.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub fn disconnected(&self) -> bool {
        self.lock()
            .last()
            .map(|event| *event == DeviceEvent::Disconnected)
            .unwrap_or(false)
    }
}

pub struct SimulatedReader {
    scenario: Scenario,
    rules: Vec<(Vec<u8>, TagRule)>,
    script: VecDeque<ScriptedRead>,
    connected: bool,
    region: Region,
    read_power: i32,
    hop_table: Vec<u32>,
    plan: Option<ReadPlan>,
    metadata: MetadataFlags,
    buffer: VecDeque<TagObservation>,
    events: EventLog,
}

impl SimulatedReader {
    pub fn new(scenario: Scenario) -> Result<Self, DeviceError> {
        let rules = scenario
            .tags
            .iter()
            .map(|rule| {
                hex::decode(&rule.epc)
                    .map(|epc| (epc, rule.clone()))
                    .map_err(|err| {
                        DeviceError::Transport(format!(
                            "scenario tag '{}' is not valid hex: {err}",
                            rule.epc
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let metadata = [
            MetadataField::ReadCount,
            MetadataField::Rssi,
            MetadataField::AntennaId,
            MetadataField::Frequency,
            MetadataField::Timestamp,
            MetadataField::Protocol,
        ]
        .into_iter()
        .collect();

        Ok(Self {
            region: scenario.region,
            read_power: scenario.read_power,
            scenario,
            rules,
            script: VecDeque::new(),
            connected: false,
            hop_table: Vec::new(),
            plan: None,
            metadata,
            buffer: VecDeque::new(),
            events: EventLog::default(),
        })
    }

    /// Reader that plays back `reads` in order, then reports empty windows.
    pub fn scripted(reads: Vec<ScriptedRead>) -> Self {
        Self {
            region: Region::NONE,
            read_power: 3000,
            scenario: Scenario::default(),
            rules: Vec::new(),
            script: reads.into(),
            connected: false,
            hop_table: Vec::new(),
            plan: None,
            metadata: MetadataFlags::EMPTY,
            buffer: VecDeque::new(),
            events: EventLog::default(),
        }
    }

    pub fn from_scenario_file(path: &str) -> Result<Self, DeviceError> {
        let connect_err = |reason: String| DeviceError::Connect {
            uri: format!("{SCHEME}://{path}"),
            reason,
        };
        let contents = fs::read_to_string(path)
            .map_err(|err| connect_err(format!("failed to read scenario: {err}")))?;
        let scenario: Scenario = serde_json::from_str(&contents)
            .map_err(|err| connect_err(format!("invalid scenario: {err}")))?;
        Self::new(scenario)
    }

    pub fn with_script(mut self, reads: Vec<ScriptedRead>) -> Self {
        self.script = reads.into();
        self
    }

    pub fn event_log(&self) -> EventLog {
        self.events.clone()
    }

    fn ensure_connected(&self) -> Result<(), DeviceError> {
        if self.connected {
            Ok(())
        } else {
            Err(DeviceError::NotConnected)
        }
    }

    fn current_frequency(&self) -> u32 {
        self.hop_table
            .first()
            .copied()
            .unwrap_or(DEFAULT_FREQUENCY_KHZ)
    }

    fn generate_window(&self) -> Vec<TagObservation> {
        let frequency = self.current_frequency();
        let protocol = self
            .plan
            .as_ref()
            .map(|plan| plan.protocol)
            .unwrap_or(TagProtocol::Gen2);
        let default_antenna = self
            .plan
            .as_ref()
            .and_then(|plan| plan.antennas.first().copied())
            .unwrap_or(1);
        let millis = Utc::now().timestamp_millis().max(0) as u64;

        self.rules
            .iter()
            .filter(|(_, rule)| rule.min_power.map_or(true, |min| self.read_power >= min))
            .filter(|(_, rule)| rule.frequencies.is_empty() || rule.frequencies.contains(&frequency))
            .map(|(epc, rule)| {
                let has = |field| self.metadata.contains(field);
                let gen2 = (protocol == TagProtocol::Gen2).then(|| Gen2Metadata {
                    q: has(MetadataField::Gen2Q).then_some(4),
                    link_frequency: has(MetadataField::Gen2LinkFrequency)
                        .then_some(LinkFrequency::Khz250),
                    target: has(MetadataField::Gen2Target).then_some(Gen2Target::A),
                });
                TagObservation {
                    epc: epc.clone(),
                    rssi: has(MetadataField::Rssi).then_some(rule.rssi),
                    phase: has(MetadataField::Phase).then_some(rule.phase),
                    frequency: has(MetadataField::Frequency).then_some(frequency),
                    antenna: has(MetadataField::AntennaId)
                        .then_some(rule.antenna.unwrap_or(default_antenna)),
                    timestamp: has(MetadataField::Timestamp)
                        .then_some(SplitTimestamp::from_millis(millis)),
                    read_count: has(MetadataField::ReadCount).then_some(rule.reads_per_window),
                    protocol: has(MetadataField::Protocol).then_some(protocol),
                    data: None,
                    gen2,
                    tag_type: None,
                }
            })
            .collect()
    }
}

impl ReaderDevice for SimulatedReader {
    fn connect(&mut self, uri: &str) -> Result<(), DeviceError> {
        self.connected = true;
        self.events.push(DeviceEvent::Connected(uri.to_string()));
        Ok(())
    }

    fn get_param(&mut self, key: ParamKey) -> Result<ParamValue, DeviceError> {
        self.ensure_connected()?;
        let value = match key {
            ParamKey::VersionModel => ParamValue::Text(self.scenario.model.clone()),
            ParamKey::RegionId => ParamValue::Region(self.region),
            ParamKey::SupportedRegions => ParamValue::RegionList(self.scenario.regions.clone()),
            ParamKey::AntennaReturnLoss => {
                if self.scenario.return_loss.is_empty() {
                    return Err(DeviceError::Unsupported(key));
                }
                ParamValue::ReturnLoss(self.scenario.return_loss.clone())
            }
            ParamKey::ReadPower => ParamValue::Power(self.read_power),
            ParamKey::MetadataFlags => ParamValue::Metadata(self.metadata),
            ParamKey::ReadPlan => match &self.plan {
                Some(plan) => ParamValue::ReadPlan(plan.clone()),
                None => return Err(DeviceError::Unsupported(key)),
            },
            ParamKey::HopTable => ParamValue::HopTable(self.hop_table.clone()),
        };
        Ok(value)
    }

    fn set_param(&mut self, key: ParamKey, value: ParamValue) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        if self.scenario.reject_params.contains(&key) {
            return Err(DeviceError::Transport(format!("reader rejected {key}")));
        }
        self.events.push(DeviceEvent::ParamSet(key, value.clone()));

        match (key, value) {
            (ParamKey::RegionId, ParamValue::Region(region)) => {
                if !self.scenario.regions.contains(&region) {
                    return Err(DeviceError::InvalidValue {
                        param: key,
                        reason: format!("{region} is not supported"),
                    });
                }
                self.region = region;
            }
            (ParamKey::ReadPower, ParamValue::Power(power)) => {
                self.read_power = self
                    .scenario
                    .max_read_power
                    .map_or(power, |max| power.min(max));
            }
            (ParamKey::HopTable, ParamValue::HopTable(table)) => {
                if table.is_empty() {
                    return Err(DeviceError::InvalidValue {
                        param: key,
                        reason: "hop table must not be empty".into(),
                    });
                }
                self.hop_table = table;
            }
            (ParamKey::MetadataFlags, ParamValue::Metadata(flags)) => self.metadata = flags,
            (ParamKey::ReadPlan, ParamValue::ReadPlan(plan)) => self.plan = Some(plan),
            (ParamKey::VersionModel | ParamKey::SupportedRegions | ParamKey::AntennaReturnLoss, _) => {
                return Err(DeviceError::Unsupported(key));
            }
            _ => {
                return Err(DeviceError::InvalidValue {
                    param: key,
                    reason: "value has the wrong type".into(),
                });
            }
        }
        Ok(())
    }

    fn supports_antenna_detection(&mut self) -> Result<bool, DeviceError> {
        self.ensure_connected()?;
        Ok(self.scenario.antenna_detection)
    }

    fn read(&mut self, dwell: Duration) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        self.events.push(DeviceEvent::Read(dwell));
        self.buffer.clear();
        thread::sleep(dwell);

        if let Some(scripted) = self.script.pop_front() {
            self.buffer = scripted.observations.into();
            return scripted.outcome;
        }

        let mut window = self.generate_window();
        let overflow = match self.scenario.buffer_capacity {
            Some(capacity) if window.len() > capacity => {
                window.truncate(capacity);
                true
            }
            _ => false,
        };
        self.buffer = window.into();

        if overflow {
            Err(DeviceError::BufferFull)
        } else {
            Ok(())
        }
    }

    fn next_observation(&mut self) -> Option<TagObservation> {
        if !self.connected {
            return None;
        }
        self.buffer.pop_front()
    }

    fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            self.buffer.clear();
            self.events.push(DeviceEvent::Disconnected);
        }
    }
}

//! Tag Observation Classifier.
//!
//! Turns raw [`TagObservation`]s into normalised reads, matches them against
//! the tags of interest and accumulates the per-frequency [`CellResult`].

use std::fmt;

use thiserror::Error;

use crate::db::{CaptureDetails, MeasurementRecord};
use crate::device::{Gen2Target, LinkFrequency, MetadataField, TagObservation, TagProtocol};

/// Recorded for a tag of interest that never answered at a frequency.
pub const NOT_SEEN_RSSI: i32 = -99;
pub const NOT_SEEN_PHASE: i32 = 0;
pub const NOT_SEEN_POWER: i32 = 3200;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedObservation {
    #[error("embedded tag operation failed for {epc} (error code {code:#06x})")]
    EmbeddedOpFailed { epc: String, code: u16 },

    #[error("observation carries no tag identifier")]
    EmptyIdentifier,
}

/// An observation with every field filled in. Fields the reader did not
/// report are zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedRead {
    pub epc: String,
    pub rssi: i32,
    pub phase: i32,
    pub frequency: u32,
    pub antenna: u8,
    pub timestamp_secs: u64,
    pub read_count: u32,
    pub protocol: u32,
}

impl ClassifiedRead {
    /// Capture mode row: every read is kept, at the session's fixed power.
    pub fn into_capture_record(self, power: i32) -> MeasurementRecord {
        let details = CaptureDetails {
            antenna: self.antenna,
            timestamp_secs: self.timestamp_secs,
            read_count: self.read_count,
            protocol: self.protocol,
        };
        MeasurementRecord::sweep(self.epc, self.rssi, self.phase, self.frequency, power)
            .with_capture(details)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Classifier {
    /// Some readers report the data length in bits rather than bytes.
    data_len_in_bits: bool,
    print_metadata: bool,
}

impl Classifier {
    pub fn new(print_metadata: bool) -> Self {
        Self {
            data_len_in_bits: false,
            print_metadata,
        }
    }

    pub fn for_model(model: &str, print_metadata: bool) -> Self {
        Self {
            data_len_in_bits: model == "M3e",
            print_metadata,
        }
    }

    pub fn print_metadata(&self) -> bool {
        self.print_metadata
    }

    pub fn normalize(&self, obs: &TagObservation) -> Result<ClassifiedRead, MalformedObservation> {
        if obs.epc.is_empty() {
            return Err(MalformedObservation::EmptyIdentifier);
        }
        let epc = hex::encode_upper(&obs.epc);
        if let Some(code) = obs.data.as_ref().and_then(|data| data.embedded_error()) {
            return Err(MalformedObservation::EmbeddedOpFailed { epc, code });
        }

        Ok(ClassifiedRead {
            epc,
            rssi: obs.rssi.unwrap_or(0),
            phase: obs.phase.unwrap_or(0),
            frequency: obs.frequency.unwrap_or(0),
            antenna: obs.antenna.unwrap_or(0),
            timestamp_secs: obs.timestamp.map(|ts| ts.seconds()).unwrap_or(0),
            read_count: obs.read_count.unwrap_or(0),
            protocol: obs.protocol.map(|p| p.code()).unwrap_or(0),
        })
    }

    /// Human readable dump of the metadata present on `obs`.
    pub fn describe<'a>(&self, obs: &'a TagObservation) -> Description<'a> {
        Description {
            obs,
            data_len_in_bits: self.data_len_in_bits,
        }
    }
}

/// Multi-line metadata listing returned by [`Classifier::describe`].
pub struct Description<'a> {
    obs: &'a TagObservation,
    data_len_in_bits: bool,
}

impl fmt::Display for Description<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let obs = self.obs;
        let is_gen2 = obs.protocol == Some(TagProtocol::Gen2);
        let gen2 = obs.gen2.filter(|_| is_gen2).unwrap_or_default();

        write!(f, "EPC: {}", hex::encode_upper(&obs.epc))?;
        for field in obs.present().iter() {
            match field {
                MetadataField::ReadCount => {
                    write!(f, "\n  Read Count: {}", obs.read_count.unwrap_or(0))?
                }
                MetadataField::Rssi => write!(f, "\n  RSSI: {}", obs.rssi.unwrap_or(0))?,
                MetadataField::AntennaId => {
                    write!(f, "\n  Antenna ID: {}", obs.antenna.unwrap_or(0))?
                }
                MetadataField::Frequency => {
                    write!(f, "\n  Frequency: {}", obs.frequency.unwrap_or(0))?
                }
                MetadataField::Timestamp => write!(
                    f,
                    "\n  Timestamp: {}",
                    obs.timestamp.map(|ts| ts.millis()).unwrap_or(0)
                )?,
                MetadataField::Phase => write!(f, "\n  Phase: {}", obs.phase.unwrap_or(0))?,
                MetadataField::Protocol => {
                    if let Some(protocol) = obs.protocol {
                        write!(f, "\n  Protocol: {protocol}")?;
                    }
                }
                MetadataField::Data => {
                    if let Some(data) = &obs.data {
                        let len = if self.data_len_in_bits {
                            data.len.div_ceil(8)
                        } else {
                            data.len
                        };
                        write!(f, "\n  Data ({len}): {}", hex::encode_upper(&data.bytes))?;
                    }
                }
                MetadataField::Gen2Q => {
                    if let Some(q) = gen2.q {
                        write!(f, "\n  Gen2Q: {q}")?;
                    }
                }
                MetadataField::Gen2LinkFrequency => {
                    if let Some(lf) = gen2.link_frequency {
                        write!(f, "\n  Gen2 Link Frequency: {}", describe_blf(lf))?;
                    }
                }
                MetadataField::Gen2Target => {
                    if let Some(target) = gen2.target {
                        write!(f, "\n  Gen2 Target: {}", describe_target(target))?;
                    }
                }
                MetadataField::TagType => {
                    write!(f, "\n  TagType: {:#x}", obs.tag_type.unwrap_or(0))?
                }
            }
        }
        Ok(())
    }
}

fn describe_blf(lf: LinkFrequency) -> String {
    match lf {
        LinkFrequency::Khz250 => "250".into(),
        LinkFrequency::Khz320 => "320".into(),
        LinkFrequency::Khz640 => "640".into(),
        LinkFrequency::Unknown(raw) => format!("Unknown ({raw})"),
    }
}

fn describe_target(target: Gen2Target) -> String {
    match target {
        Gen2Target::A => "A".into(),
        Gen2Target::B => "B".into(),
        Gen2Target::Unknown(raw) => format!("Unknown ({raw})"),
    }
}

/// The configured tags of interest, in the order their rows are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagsOfInterest(Vec<String>);

impl TagsOfInterest {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            tags.into_iter()
                .map(|tag| tag.as_ref().trim().to_ascii_uppercase())
                .collect(),
        )
    }

    pub fn position(&self, epc: &str) -> Option<usize> {
        self.0.iter().position(|tag| tag.eq_ignore_ascii_case(epc))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// First observation of a tag of interest at the current frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellEntry {
    pub rssi: i32,
    pub phase: i32,
    pub power: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {
    /// First sighting; the index into the tags of interest.
    Recorded(usize),
    Duplicate,
    NotOfInterest,
}

/// Per-frequency accumulator; one slot per tag of interest.
#[derive(Debug, Clone, PartialEq)]
pub struct CellResult {
    frequency: u32,
    entries: Vec<Option<CellEntry>>,
}

impl CellResult {
    pub fn new(frequency: u32, tags: &TagsOfInterest) -> Self {
        Self {
            frequency,
            entries: vec![None; tags.len()],
        }
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn observe(&mut self, tags: &TagsOfInterest, read: &ClassifiedRead, power: i32) -> Observed {
        let Some(index) = tags.position(&read.epc) else {
            return Observed::NotOfInterest;
        };
        let slot = &mut self.entries[index];
        if slot.is_some() {
            return Observed::Duplicate;
        }
        *slot = Some(CellEntry {
            rssi: read.rssi,
            phase: read.phase,
            power,
        });
        Observed::Recorded(index)
    }

    pub fn seen(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    pub fn all_seen(&self) -> bool {
        self.entries.iter().all(Option::is_some)
    }

    /// Rows for this frequency in tags-of-interest order. Unseen tags get a
    /// sentinel row only when `include_sentinels` is set.
    pub fn into_records(self, tags: &TagsOfInterest, include_sentinels: bool) -> Vec<MeasurementRecord> {
        let frequency = self.frequency;
        tags.iter()
            .zip(self.entries)
            .filter_map(|(epc, entry)| match entry {
                Some(entry) => Some(MeasurementRecord::sweep(
                    epc,
                    entry.rssi,
                    entry.phase,
                    frequency,
                    entry.power,
                )),
                None if include_sentinels => Some(MeasurementRecord::sweep(
                    epc,
                    NOT_SEEN_RSSI,
                    NOT_SEEN_PHASE,
                    frequency,
                    NOT_SEEN_POWER,
                )),
                None => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Gen2Metadata, MetadataFlags, EMBEDDED_OP_ERROR_LEN};

    const A: &str = "E200493F3185AD7126ACF6B5";
    const B: &str = "E200493F38187C3126BE51F0";

    fn obs(epc: &str) -> TagObservation {
        TagObservation::new(hex::decode(epc).unwrap())
    }

    fn read(epc: &str, rssi: i32) -> ClassifiedRead {
        Classifier::default()
            .normalize(&obs(epc).with_rssi(rssi))
            .unwrap()
    }

    #[test]
    fn normalizes_present_fields_and_zeroes_the_rest() {
        let observation = obs("e2000001")
            .with_rssi(-52)
            .with_frequency(902_750)
            .with_antenna(2)
            .with_timestamp_millis(1_700_000_123_456)
            .with_protocol(TagProtocol::Gen2);
        let read = Classifier::default().normalize(&observation).unwrap();
        assert_eq!(
            read,
            ClassifiedRead {
                epc: "E2000001".into(),
                rssi: -52,
                phase: 0,
                frequency: 902_750,
                antenna: 2,
                timestamp_secs: 1_700_000_123,
                read_count: 0,
                protocol: 5,
            }
        );
    }

    #[test]
    fn embedded_operation_failure_is_malformed() {
        let observation = obs("E2000001").with_data(EMBEDDED_OP_ERROR_LEN, vec![0x04, 0x23]);
        assert_eq!(
            Classifier::default().normalize(&observation),
            Err(MalformedObservation::EmbeddedOpFailed {
                epc: "E2000001".into(),
                code: 0x0423
            })
        );
        assert_eq!(
            Classifier::default().normalize(&TagObservation::default()),
            Err(MalformedObservation::EmptyIdentifier)
        );
    }

    #[test]
    fn first_observation_wins() {
        let tags = TagsOfInterest::new([A, B]);
        let mut cell = CellResult::new(840_000, &tags);

        assert_eq!(cell.observe(&tags, &read(A, -40), 3000), Observed::Recorded(0));
        assert_eq!(cell.observe(&tags, &read(A, -30), 3100), Observed::Duplicate);
        assert_eq!(cell.observe(&tags, &read("0102", -20), 3100), Observed::NotOfInterest);
        assert!(!cell.all_seen());
        assert_eq!(cell.seen(), 1);

        let records = cell.into_records(&tags, true);
        assert_eq!(
            records,
            vec![
                MeasurementRecord::sweep(A, -40, 0, 840_000, 3000),
                MeasurementRecord::sweep(B, NOT_SEEN_RSSI, NOT_SEEN_PHASE, 840_000, NOT_SEEN_POWER),
            ]
        );
    }

    #[test]
    fn partial_flush_omits_sentinels() {
        let tags = TagsOfInterest::new([A, B]);
        let mut cell = CellResult::new(845_000, &tags);
        cell.observe(&tags, &read(B, -61), 3150);
        let records = cell.into_records(&tags, false);
        assert_eq!(records, vec![MeasurementRecord::sweep(B, -61, 0, 845_000, 3150)]);
    }

    #[test]
    fn tags_compare_case_insensitively() {
        let tags = TagsOfInterest::new(["e200493f3185ad7126acf6b5"]);
        assert_eq!(tags.position(A), Some(0));
        assert_eq!(tags.iter().next(), Some(A));
    }

    #[test]
    fn capture_record_keeps_every_field() {
        let read = Classifier::default()
            .normalize(
                &obs("AA01")
                    .with_rssi(-45)
                    .with_phase(90)
                    .with_frequency(915_250)
                    .with_antenna(1)
                    .with_timestamp_millis(5_000)
                    .with_read_count(7)
                    .with_protocol(TagProtocol::Gen2),
            )
            .unwrap();
        let record = read.into_capture_record(3000);
        assert_eq!(record.power, 3000);
        assert_eq!(
            record.capture,
            Some(CaptureDetails {
                antenna: 1,
                timestamp_secs: 5,
                read_count: 7,
                protocol: 5,
            })
        );
    }

    #[test]
    fn describe_lists_only_present_fields() {
        let mut observation = obs("AA01")
            .with_rssi(-45)
            .with_protocol(TagProtocol::Iso14443a)
            .with_data(16, vec![0xDE, 0xAD]);
        observation.gen2 = Some(Gen2Metadata {
            q: Some(4),
            ..Gen2Metadata::default()
        });

        let text = Classifier::for_model("M3e", false).describe(&observation).to_string();
        assert!(text.starts_with("EPC: AA01"));
        assert!(text.contains("RSSI: -45"));
        assert!(text.contains("Protocol: ISO14443A"));
        assert!(text.contains("Data (2): DEAD"));
        assert!(!text.contains("Gen2Q"));
        assert!(!text.contains("Phase"));

        observation.protocol = Some(TagProtocol::Gen2);
        let text = Classifier::new(false).describe(&observation).to_string();
        assert!(text.contains("Gen2Q: 4"));
        assert!(text.contains("Data (16): DEAD"));
        assert_ne!(observation.present(), MetadataFlags::EMPTY);
    }

    struct RejectingWriter;

    impl fmt::Write for RejectingWriter {
        fn write_str(&mut self, _: &str) -> fmt::Result {
            Err(fmt::Error)
        }
    }

    #[test]
    fn describe_propagates_writer_errors() {
        use std::fmt::Write as _;

        let observation = obs("AA01").with_rssi(-45).with_phase(12);
        let description = Classifier::default().describe(&observation);
        assert!(write!(RejectingWriter, "{description}").is_err());
        assert_eq!(
            description.to_string(),
            "EPC: AA01\n  RSSI: -45\n  Phase: 12"
        );
    }
}

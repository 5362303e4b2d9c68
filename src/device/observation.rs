use super::params::{MetadataField, MetadataFlags, TagProtocol};

/// Data length a reader reports when an embedded tag operation failed; the
/// first two payload bytes then carry the error code.
pub const EMBEDDED_OP_ERROR_LEN: u32 = 0x8000;

/// Millisecond timestamp split across two 32-bit halves, most significant first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitTimestamp {
    pub high: u32,
    pub low: u32,
}

impl SplitTimestamp {
    pub fn from_millis(millis: u64) -> Self {
        Self {
            high: (millis >> 32) as u32,
            low: millis as u32,
        }
    }

    pub fn millis(&self) -> u64 {
        (u64::from(self.high) << 32) | u64::from(self.low)
    }

    pub fn seconds(&self) -> u64 {
        self.millis() / 1000
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagData {
    /// Payload length in bytes, or in bits for readers that count bits.
    pub len: u32,
    pub bytes: Vec<u8>,
}

impl TagData {
    /// Error code of a failed embedded operation, when the length carries the
    /// reserved sentinel.
    pub fn embedded_error(&self) -> Option<u16> {
        if self.len != EMBEDDED_OP_ERROR_LEN {
            return None;
        }
        let code = match self.bytes.as_slice() {
            [hi, lo, ..] => u16::from_be_bytes([*hi, *lo]),
            _ => 0,
        };
        Some(code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFrequency {
    Khz250,
    Khz320,
    Khz640,
    Unknown(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gen2Target {
    A,
    B,
    Unknown(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Gen2Metadata {
    pub q: Option<u8>,
    pub link_frequency: Option<LinkFrequency>,
    pub target: Option<Gen2Target>,
}

/// One detection surfaced by the reader after a read window.
///
/// Every field besides the identifier is optional: which ones are filled in
/// depends on the reader model and on the metadata flags it honoured.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TagObservation {
    pub epc: Vec<u8>,
    pub rssi: Option<i32>,
    pub phase: Option<i32>,
    pub frequency: Option<u32>,
    pub antenna: Option<u8>,
    pub timestamp: Option<SplitTimestamp>,
    pub read_count: Option<u32>,
    pub protocol: Option<TagProtocol>,
    pub data: Option<TagData>,
    pub gen2: Option<Gen2Metadata>,
    pub tag_type: Option<u64>,
}

impl TagObservation {
    pub fn new(epc: impl Into<Vec<u8>>) -> Self {
        Self {
            epc: epc.into(),
            ..Self::default()
        }
    }

    pub fn with_rssi(mut self, rssi: i32) -> Self {
        self.rssi = Some(rssi);
        self
    }

    pub fn with_phase(mut self, phase: i32) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_frequency(mut self, frequency: u32) -> Self {
        self.frequency = Some(frequency);
        self
    }

    pub fn with_antenna(mut self, antenna: u8) -> Self {
        self.antenna = Some(antenna);
        self
    }

    pub fn with_timestamp_millis(mut self, millis: u64) -> Self {
        self.timestamp = Some(SplitTimestamp::from_millis(millis));
        self
    }

    pub fn with_read_count(mut self, count: u32) -> Self {
        self.read_count = Some(count);
        self
    }

    pub fn with_protocol(mut self, protocol: TagProtocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn with_data(mut self, len: u32, bytes: impl Into<Vec<u8>>) -> Self {
        self.data = Some(TagData {
            len,
            bytes: bytes.into(),
        });
        self
    }

    /// Metadata fields actually present on this observation.
    pub fn present(&self) -> MetadataFlags {
        let gen2 = self.gen2.unwrap_or_default();
        [
            (MetadataField::ReadCount, self.read_count.is_some()),
            (MetadataField::Rssi, self.rssi.is_some()),
            (MetadataField::AntennaId, self.antenna.is_some()),
            (MetadataField::Frequency, self.frequency.is_some()),
            (MetadataField::Timestamp, self.timestamp.is_some()),
            (MetadataField::Phase, self.phase.is_some()),
            (MetadataField::Protocol, self.protocol.is_some()),
            (MetadataField::Data, self.data.is_some()),
            (MetadataField::Gen2Q, gen2.q.is_some()),
            (MetadataField::Gen2LinkFrequency, gen2.link_frequency.is_some()),
            (MetadataField::Gen2Target, gen2.target.is_some()),
            (MetadataField::TagType, self.tag_type.is_some()),
        ]
        .into_iter()
        .filter_map(|(field, present)| present.then_some(field))
        .collect()
    }
}

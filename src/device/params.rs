use std::fmt;

use serde::{Deserialize, Serialize};

/// Reader parameters the sweep and capture runs read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamKey {
    VersionModel,
    RegionId,
    SupportedRegions,
    AntennaReturnLoss,
    ReadPower,
    MetadataFlags,
    ReadPlan,
    HopTable,
}

impl ParamKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKey::VersionModel => "version/model",
            ParamKey::RegionId => "region/id",
            ParamKey::SupportedRegions => "region/supportedRegions",
            ParamKey::AntennaReturnLoss => "antenna/returnLoss",
            ParamKey::ReadPower => "radio/readPower",
            ParamKey::MetadataFlags => "reader/metadataflags",
            ParamKey::ReadPlan => "read/plan",
            ParamKey::HopTable => "region/hopTable",
        }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Regulatory region code as reported by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(pub u8);

impl Region {
    pub const NONE: Region = Region(0);
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Region::NONE {
            f.write_str("none")
        } else {
            write!(f, "region {}", self.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AntennaReturnLoss {
    pub port: u8,
    pub loss: i32,
}

/// Air protocol a read plan targets, or that an observation was read with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagProtocol {
    Gen2,
    Iso14443a,
    Other(u32),
}

impl TagProtocol {
    const GEN2_CODE: u32 = 5;
    const ISO14443A_CODE: u32 = 0x40;

    /// Numeric identifier persisted in the `protocol` column.
    pub fn code(&self) -> u32 {
        match self {
            TagProtocol::Gen2 => Self::GEN2_CODE,
            TagProtocol::Iso14443a => Self::ISO14443A_CODE,
            TagProtocol::Other(code) => *code,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            Self::GEN2_CODE => TagProtocol::Gen2,
            Self::ISO14443A_CODE => TagProtocol::Iso14443a,
            other => TagProtocol::Other(other),
        }
    }
}

impl fmt::Display for TagProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagProtocol::Gen2 => f.write_str("GEN2"),
            TagProtocol::Iso14443a => f.write_str("ISO14443A"),
            TagProtocol::Other(code) => write!(f, "protocol {code}"),
        }
    }
}

/// Optional per-read metadata a reader can attach to an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataField {
    ReadCount,
    Rssi,
    AntennaId,
    Frequency,
    Timestamp,
    Phase,
    Protocol,
    Data,
    Gen2Q,
    Gen2LinkFrequency,
    Gen2Target,
    TagType,
}

impl MetadataField {
    pub const ALL: [MetadataField; 12] = [
        MetadataField::ReadCount,
        MetadataField::Rssi,
        MetadataField::AntennaId,
        MetadataField::Frequency,
        MetadataField::Timestamp,
        MetadataField::Phase,
        MetadataField::Protocol,
        MetadataField::Data,
        MetadataField::Gen2Q,
        MetadataField::Gen2LinkFrequency,
        MetadataField::Gen2Target,
        MetadataField::TagType,
    ];

    fn bit(self) -> u16 {
        let index = Self::ALL
            .iter()
            .position(|field| *field == self)
            .unwrap_or_default();
        1 << index
    }
}

/// Set of [`MetadataField`]s, used both to request metadata from the reader
/// and to describe what an observation actually carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetadataFlags(u16);

impl MetadataFlags {
    pub const EMPTY: MetadataFlags = MetadataFlags(0);
    pub const ALL: MetadataFlags = MetadataFlags((1 << MetadataField::ALL.len()) - 1);

    pub fn with(mut self, field: MetadataField) -> Self {
        self.0 |= field.bit();
        self
    }

    pub fn contains(&self, field: MetadataField) -> bool {
        self.0 & field.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = MetadataField> + '_ {
        MetadataField::ALL
            .into_iter()
            .filter(move |field| self.contains(*field))
    }
}

impl FromIterator<MetadataField> for MetadataFlags {
    fn from_iter<I: IntoIterator<Item = MetadataField>>(iter: I) -> Self {
        iter.into_iter()
            .fold(MetadataFlags::EMPTY, |flags, field| flags.with(field))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadPlan {
    pub antennas: Vec<u8>,
    pub protocol: TagProtocol,
    pub timeout_ms: u32,
}

/// Typed parameter payloads exchanged through `get_param` / `set_param`.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Region(Region),
    RegionList(Vec<Region>),
    ReturnLoss(Vec<AntennaReturnLoss>),
    Power(i32),
    Metadata(MetadataFlags),
    ReadPlan(ReadPlan),
    HopTable(Vec<u32>),
}

impl ParamValue {
    pub fn into_text(self) -> Option<String> {
        match self {
            ParamValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn into_region(self) -> Option<Region> {
        match self {
            ParamValue::Region(region) => Some(region),
            _ => None,
        }
    }

    pub fn into_region_list(self) -> Option<Vec<Region>> {
        match self {
            ParamValue::RegionList(regions) => Some(regions),
            _ => None,
        }
    }

    pub fn into_return_loss(self) -> Option<Vec<AntennaReturnLoss>> {
        match self {
            ParamValue::ReturnLoss(values) => Some(values),
            _ => None,
        }
    }

    pub fn into_power(self) -> Option<i32> {
        match self {
            ParamValue::Power(power) => Some(power),
            _ => None,
        }
    }
}

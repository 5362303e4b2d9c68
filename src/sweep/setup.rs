use crate::device::{
    DeviceError, MetadataFlags, ParamKey, ParamValue, ReadPlan, ReaderDevice, Region, TagProtocol,
};
use crate::error::SweepError;
use crate::{log_debug, log_info};

use super::config::ReaderConfig;

const ENABLE_LOGS: bool = true;

/// Handheld module that reports data lengths in bits, reads ISO14443A and has
/// no region setting.
const MODEL_M3E: &str = "M3e";
/// Model that rejects the metadata flag parameter.
const MODEL_MERCURY6: &str = "Mercury6";

/// What the reader ended up configured with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderProfile {
    pub model: String,
    pub protocol: TagProtocol,
    pub region: Region,
    pub read_power: i32,
}

impl ReaderProfile {
    pub fn is_m3e(&self) -> bool {
        self.model == MODEL_M3E
    }
}

fn unexpected(context: &'static str, key: ParamKey) -> SweepError {
    SweepError::DeviceConfig {
        context,
        source: DeviceError::UnexpectedValue(key),
    }
}

fn get<D, T>(
    device: &mut D,
    key: ParamKey,
    context: &'static str,
    extract: impl FnOnce(ParamValue) -> Option<T>,
) -> Result<T, SweepError>
where
    D: ReaderDevice + ?Sized,
{
    let value = device
        .get_param(key)
        .map_err(SweepError::device_config(context))?;
    extract(value).ok_or_else(|| unexpected(context, key))
}

fn select_region<D: ReaderDevice + ?Sized>(
    device: &mut D,
    index: usize,
) -> Result<Region, SweepError> {
    let current = get(device, ParamKey::RegionId, "getting region", ParamValue::into_region)?;
    let supported = get(
        device,
        ParamKey::SupportedRegions,
        "getting supported regions",
        ParamValue::into_region_list,
    )?;

    if supported.is_empty() {
        return Err(SweepError::DeviceConfig {
            context: "getting supported regions",
            source: DeviceError::InvalidValue {
                param: ParamKey::SupportedRegions,
                reason: "reader reports no supported regions".into(),
            },
        });
    }
    let region = supported.get(index).copied().ok_or_else(|| SweepError::DeviceConfig {
        context: "selecting region",
        source: DeviceError::InvalidValue {
            param: ParamKey::RegionId,
            reason: format!(
                "index {index} is out of bounds; reader supports {} regions",
                supported.len()
            ),
        },
    })?;

    log_debug!("Reader region is {current}; switching to {region}");
    device
        .set_param(ParamKey::RegionId, ParamValue::Region(region))
        .map_err(SweepError::device_config("setting region"))?;
    Ok(region)
}

/// Connects and configures the reader for a run: region, read power,
/// antenna check, metadata flags and read plan, in that order.
pub fn prepare_reader<D: ReaderDevice + ?Sized>(
    device: &mut D,
    config: &ReaderConfig,
) -> Result<ReaderProfile, SweepError> {
    device
        .connect(&config.uri)
        .map_err(SweepError::device_config("connecting to reader"))?;

    let model = get(
        device,
        ParamKey::VersionModel,
        "getting version model",
        ParamValue::into_text,
    )?;
    log_info!("Connected to {} ({model})", config.uri);
    let is_m3e = model == MODEL_M3E;

    let region = if is_m3e {
        Region::NONE
    } else {
        select_region(device, config.region_index)?
    };

    if let Some(power) = config.read_power {
        let previous = get(
            device,
            ParamKey::ReadPower,
            "getting read power",
            ParamValue::into_power,
        )?;
        log_debug!("Old read power = {previous} cdBm");
        device
            .set_param(ParamKey::ReadPower, ParamValue::Power(power))
            .map_err(SweepError::device_config("setting read power"))?;
    }
    let read_power = get(
        device,
        ParamKey::ReadPower,
        "getting read power",
        ParamValue::into_power,
    )?;
    log_info!("Read power = {read_power} cdBm");

    let detects_antennas = device
        .supports_antenna_detection()
        .map_err(SweepError::device_config("checking antenna detection"))?;
    if !detects_antennas && config.antennas.is_empty() {
        return Err(SweepError::DeviceConfig {
            context: "checking antenna detection",
            source: DeviceError::AntennaListRequired,
        });
    }

    if model != MODEL_MERCURY6 {
        device
            .set_param(ParamKey::MetadataFlags, ParamValue::Metadata(MetadataFlags::ALL))
            .map_err(SweepError::device_config("setting metadata flags"))?;
    }

    let protocol = if is_m3e {
        TagProtocol::Iso14443a
    } else {
        TagProtocol::Gen2
    };
    device
        .install_read_plan(ReadPlan {
            antennas: config.antennas.clone(),
            protocol,
            timeout_ms: config.plan_timeout_ms,
        })
        .map_err(SweepError::device_config("setting read plan"))?;

    Ok(ReaderProfile {
        model,
        protocol,
        region,
        read_power,
    })
}

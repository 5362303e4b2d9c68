//! Reader device capability.
//!
//! The sweep controller only talks to a reader through [`ReaderDevice`]. Vendor
//! transports live outside this crate; [`open_reader`] resolves the `sim://`
//! scheme to the in-process [`SimulatedReader`] and rejects anything else.

use std::time::Duration;

use thiserror::Error;

pub mod observation;
pub mod params;
pub mod simulated;

pub use observation::{
    Gen2Metadata, Gen2Target, LinkFrequency, SplitTimestamp, TagData, TagObservation,
    EMBEDDED_OP_ERROR_LEN,
};
pub use params::{
    AntennaReturnLoss, MetadataField, MetadataFlags, ParamKey, ParamValue, ReadPlan, Region,
    TagProtocol,
};
pub use simulated::{DeviceEvent, EventLog, Scenario, ScriptedRead, SimulatedReader, TagRule};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// The on-device tag buffer filled during the read window. Already
    /// buffered observations can still be drained.
    #[error("tag ID buffer full")]
    BufferFull,

    #[error("unsupported reader URI scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("failed to connect to {uri}: {reason}")]
    Connect { uri: String, reason: String },

    #[error("reader is not connected")]
    NotConnected,

    #[error("parameter {0} is not supported by this reader")]
    Unsupported(ParamKey),

    #[error("parameter {0} returned an unexpected value")]
    UnexpectedValue(ParamKey),

    #[error("invalid value for {param}: {reason}")]
    InvalidValue { param: ParamKey, reason: String },

    #[error("reader doesn't support antenna detection; an antenna list is required")]
    AntennaListRequired,

    #[error("{0}")]
    Transport(String),
}

/// Blocking interface to an RFID reader.
///
/// A read is a two step affair: [`read`](ReaderDevice::read) blocks for the
/// dwell window while the reader inventories tags, then
/// [`next_observation`](ReaderDevice::next_observation) drains what it buffered
/// until it returns `None`. The next `read` starts a fresh window.
pub trait ReaderDevice {
    fn connect(&mut self, uri: &str) -> Result<(), DeviceError>;

    fn get_param(&mut self, key: ParamKey) -> Result<ParamValue, DeviceError>;

    fn set_param(&mut self, key: ParamKey, value: ParamValue) -> Result<(), DeviceError>;

    fn install_read_plan(&mut self, plan: ReadPlan) -> Result<(), DeviceError> {
        self.set_param(ParamKey::ReadPlan, ParamValue::ReadPlan(plan))
    }

    /// Whether the reader can find connected antennas on its own.
    fn supports_antenna_detection(&mut self) -> Result<bool, DeviceError>;

    fn read(&mut self, dwell: Duration) -> Result<(), DeviceError>;

    fn next_observation(&mut self) -> Option<TagObservation>;

    fn disconnect(&mut self);
}

impl<D: ReaderDevice + ?Sized> ReaderDevice for Box<D> {
    fn connect(&mut self, uri: &str) -> Result<(), DeviceError> {
        (**self).connect(uri)
    }

    fn get_param(&mut self, key: ParamKey) -> Result<ParamValue, DeviceError> {
        (**self).get_param(key)
    }

    fn set_param(&mut self, key: ParamKey, value: ParamValue) -> Result<(), DeviceError> {
        (**self).set_param(key, value)
    }

    fn install_read_plan(&mut self, plan: ReadPlan) -> Result<(), DeviceError> {
        (**self).install_read_plan(plan)
    }

    fn supports_antenna_detection(&mut self) -> Result<bool, DeviceError> {
        (**self).supports_antenna_detection()
    }

    fn read(&mut self, dwell: Duration) -> Result<(), DeviceError> {
        (**self).read(dwell)
    }

    fn next_observation(&mut self) -> Option<TagObservation> {
        (**self).next_observation()
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }
}

pub type BoxedReader = Box<dyn ReaderDevice + Send>;

/// Creates the reader a URI points at. The device is not connected yet.
pub fn open_reader(uri: &str) -> Result<BoxedReader, DeviceError> {
    let (scheme, rest) = uri
        .split_once("://")
        .ok_or_else(|| DeviceError::UnsupportedScheme(uri.to_string()))?;

    match scheme {
        simulated::SCHEME => {
            let reader = SimulatedReader::from_scenario_file(rest)?;
            Ok(Box::new(reader))
        }
        other => Err(DeviceError::UnsupportedScheme(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_schemes_are_rejected() {
        let err = open_reader("tmr:///dev/ttyS0").err();
        assert_eq!(err, Some(DeviceError::UnsupportedScheme("tmr".into())));
    }

    #[test]
    fn uri_without_scheme_is_rejected() {
        assert!(matches!(
            open_reader("/dev/ttyUSB0"),
            Err(DeviceError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn missing_scenario_file_fails_to_open() {
        assert!(matches!(
            open_reader("sim:///definitely/not/here.json"),
            Err(DeviceError::Connect { .. })
        ));
    }
}

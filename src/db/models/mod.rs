pub mod measurement;

pub use measurement::{CaptureDetails, MeasurementRecord};

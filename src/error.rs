use thiserror::Error;

use crate::device::DeviceError;

/// Failures that end a sweep or capture run.
#[derive(Error, Debug)]
pub enum SweepError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The reader refused a setup step. `context` names the step, as in
    /// "setting read power".
    #[error("error {context}")]
    DeviceConfig {
        context: &'static str,
        source: DeviceError,
    },

    #[error("error reading tags")]
    DeviceRead(#[source] DeviceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SweepError {
    pub fn device_config(context: &'static str) -> impl FnOnce(DeviceError) -> Self {
        move |source| Self::DeviceConfig { context, source }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("measurement table has not been created")]
    SchemaNotInitialised,

    #[error("capture row for {epc} is missing antenna/timestamp details")]
    MissingCaptureDetails { epc: String },

    #[error("record store is closed")]
    Closed,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub mod classifier;
pub mod config;
pub mod controller;
pub mod grid;
pub mod setup;
pub mod state;

pub use classifier::{
    CellResult, ClassifiedRead, Classifier, Description, MalformedObservation, TagsOfInterest,
    NOT_SEEN_PHASE, NOT_SEEN_POWER, NOT_SEEN_RSSI,
};
pub use config::{CaptureConfig, FrequencyRange, PowerRange, ReaderConfig, SweepConfig};
pub use controller::SweepController;
pub use grid::{capture_session, Grid, SessionCell, SweepCell};
pub use setup::{prepare_reader, ReaderProfile};
pub use state::{ControllerState, RunMode, RunOutcome, RunSummary};

//! Bin module - state record, classification, prediction and simulation

mod state;
mod status;
mod estimate;
mod simulator;

pub use state::{
    ApplyReport, BinField, BinSnapshot, BinSpec, BinState, BinUpdate, FieldUpdate, UpdateSource,
    DEFAULT_MIN_FILL_RATE,
};
pub use status::{classify, BinStatus, ALERT_LEVEL, WARNING_LEVEL};
pub use estimate::{estimate, TimeToFull};
pub use simulator::BinSimulator;

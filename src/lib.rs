pub mod config;
pub mod controller;
pub mod cycle;
pub mod draft;
pub mod errors;
pub mod flags;
pub mod logging;
pub mod notify;
pub mod phase_set;
pub mod settings;
pub mod store;

pub use controller::{AdvanceOutcome, MergeStrategy, PhaseController, SequenceState};
pub use errors::{PhaseyError, StoreError};
pub use phase_set::PhaseSet;

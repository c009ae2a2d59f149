//! Training module: fit loop, early stopping and the trial runner

pub mod trainer;
pub mod trial;

pub use trainer::{evaluate, fit, EpochRecord, TrainingState};
pub use trial::{run_trial, TrialContext, TrialPhase, TrialResult};

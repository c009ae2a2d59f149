//! # DroneWatch
//!
//! A Rust library for running transfer-learning experiment trials that
//! classify images as `drone` or `not_drone` using the Burn framework.
//!
//! ## Features
//!
//! - **Frozen ResNet-50 backbone** with a small trainable classification head
//! - **Three dataset variants** (real, synthetic, hybrid) with per-variant
//!   learning rates
//! - **On-the-fly augmentation** for training batches (flips, rotation, zoom,
//!   contrast, brightness)
//! - **Early stopping** on validation loss with best-weights restore and
//!   best-only checkpointing
//!
//! ## Modules
//!
//! - `dataset`: Split loading, caching, batching and augmentation
//! - `model`: ResNet-50 feature extractor and the trainable head
//! - `training`: Fit loop, early stopping and the trial runner
//! - `inference`: Batched and single-image prediction
//! - `utils`: Errors, logging and evaluation metrics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dronewatch::backend::TrainingBackend;
//! use dronewatch::config::{DatasetVariant, TrialConfig};
//! use dronewatch::training::run_trial;
//!
//! let config = TrialConfig::new("data/real", DatasetVariant::Real);
//! let result = run_trial::<TrainingBackend>(&config)?;
//! println!("{}", result.metrics);
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::{ClassConfig, DatasetVariant, TrialConfig};
pub use dataset::burn_dataset::{
    AugmentingBatcher, DroneBatch, DroneBatcher, DroneBurnDataset, DroneItem, RawDroneDataset,
    RawDroneItem,
};
pub use dataset::loader::{DatasetSplits, ImageSample, Split, SplitDataset};
pub use dataset::prepare::{extract_frames, PrepareConfig, PrepareStats};
pub use inference::predictor::{DatasetPredictions, Prediction, Predictor};
pub use model::classifier::{DroneClassifier, DroneClassifierConfig, DroneHead};
pub use model::resnet::{ResNet50, ResNet50Config};
pub use training::trainer::{EpochRecord, TrainingState};
pub use training::trial::{run_trial, TrialPhase, TrialResult};
pub use utils::error::{DroneWatchError, Result};
pub use utils::metrics::{ConfusionMatrix, Metrics};

/// Binary classification: drone vs not_drone
pub const NUM_CLASSES: usize = 2;

/// Default input image size (pixels per side)
pub const IMAGE_SIZE: usize = 224;

/// Decision threshold applied to the sigmoid output
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

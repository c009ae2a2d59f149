//! Dataset module: preparation, split loading, caching, batching and
//! augmentation

pub mod augmentation;
pub mod burn_dataset;
pub mod loader;
pub mod prepare;

pub use augmentation::{AugmentationConfig, Augmenter};
pub use burn_dataset::{
    AugmentingBatcher, DroneBatch, DroneBatcher, DroneBurnDataset, DroneItem, RawDroneDataset,
    RawDroneItem,
};
pub use loader::{DatasetSplits, ImageSample, Split, SplitDataset};
pub use prepare::{extract_frames, PrepareConfig, PrepareStats};

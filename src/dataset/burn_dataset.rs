//! Burn Dataset Integration
//!
//! Implements Burn's Dataset trait and Batcher for the drone splits.
//!
//! ## Batchers
//!
//! - `DroneBatcher`: standard batcher without augmentation (validation,
//!   test, inference)
//! - `AugmentingBatcher`: applies on-the-fly augmentation (training only)
//!
//! Both batchers apply ImageNet normalization so inputs match the
//! pretrained ResNet-50 backbone.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::augmentation::{AugmentationConfig, Augmenter};
use crate::utils::error::{DroneWatchError, Result};

/// ImageNet channel means, matched to the pretrained backbone
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

fn progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb
}

/// A single preprocessed item ready for Burn
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DroneItem {
    /// Image data as flattened CHW float array [3 * H * W], scaled to [0, 1]
    pub image: Vec<f32>,
    /// Class label (0 = negative, 1 = positive)
    pub label: usize,
    /// Image path (for debugging/logging)
    pub path: String,
}

impl DroneItem {
    /// Create a new item by loading and preprocessing an image
    pub fn from_path(path: &PathBuf, label: usize, image_size: usize) -> Result<Self> {
        let img = ImageReader::open(path)
            .map_err(|e| DroneWatchError::ImageLoadError(path.clone(), e.to_string()))?
            .decode()
            .map_err(|e| DroneWatchError::ImageLoadError(path.clone(), e.to_string()))?
            .resize_exact(image_size as u32, image_size as u32, FilterType::Triangle)
            .to_rgb8();

        let (width, height) = (image_size, image_size);
        let mut image = vec![0.0f32; 3 * height * width];

        // CHW layout, scaled to [0, 1]
        for y in 0..height {
            for x in 0..width {
                let pixel = img.get_pixel(x as u32, y as u32);
                image[y * width + x] = pixel[0] as f32 / 255.0;
                image[height * width + y * width + x] = pixel[1] as f32 / 255.0;
                image[2 * height * width + y * width + x] = pixel[2] as f32 / 255.0;
            }
        }

        Ok(Self {
            image,
            label,
            path: path.to_string_lossy().to_string(),
        })
    }
}

/// A raw item that stores the unprocessed image
/// Used for on-the-fly augmentation during training
#[derive(Clone)]
pub struct RawDroneItem {
    /// Raw image data (not resized, not normalized)
    pub image: DynamicImage,
    /// Class label (0 = negative, 1 = positive)
    pub label: usize,
    /// Image path (for debugging/logging)
    pub path: String,
}

impl RawDroneItem {
    /// Create a new raw item by loading an image without preprocessing
    pub fn from_path(path: &PathBuf, label: usize) -> Result<Self> {
        let img = ImageReader::open(path)
            .map_err(|e| DroneWatchError::ImageLoadError(path.clone(), e.to_string()))?
            .decode()
            .map_err(|e| DroneWatchError::ImageLoadError(path.clone(), e.to_string()))?;

        Ok(Self {
            image: img,
            label,
            path: path.to_string_lossy().to_string(),
        })
    }
}

impl std::fmt::Debug for RawDroneItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawDroneItem")
            .field("label", &self.label)
            .field("path", &self.path)
            .field(
                "image_size",
                &format!("{}x{}", self.image.width(), self.image.height()),
            )
            .finish()
    }
}

/// Dataset that caches raw images in memory for on-the-fly augmentation
#[derive(Clone)]
pub struct RawDroneDataset {
    items: Vec<RawDroneItem>,
}

impl std::fmt::Debug for RawDroneDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawDroneDataset")
            .field("len", &self.items.len())
            .finish()
    }
}

impl RawDroneDataset {
    /// Load all images into memory (raw, unprocessed), in parallel.
    /// Any unreadable image fails the whole load.
    pub fn new_cached(samples: Vec<(PathBuf, usize)>) -> Result<Self> {
        let total = samples.len();
        let pb = progress_bar(total);
        let loaded = AtomicUsize::new(0);

        let items: Result<Vec<RawDroneItem>> = samples
            .par_iter()
            .map(|(path, label)| {
                let item = RawDroneItem::from_path(path, *label);
                let count = loaded.fetch_add(1, Ordering::Relaxed);
                if count % 50 == 0 {
                    pb.set_position(count as u64);
                }
                item
            })
            .collect();

        let items = items?;
        pb.finish_and_clear();
        info!("cached {} raw images for augmentation", items.len());

        Ok(Self { items })
    }
}

impl Dataset<RawDroneItem> for RawDroneDataset {
    fn get(&self, index: usize) -> Option<RawDroneItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Preprocessed dataset implementing Burn's Dataset trait
#[derive(Debug, Clone)]
pub struct DroneBurnDataset {
    /// Cached preprocessed items
    items: Vec<DroneItem>,
    /// Target image size
    image_size: usize,
}

impl DroneBurnDataset {
    /// Load all images into memory, preprocessed. Uses parallel loading
    /// with rayon; any unreadable image fails the whole load.
    pub fn new_cached(samples: Vec<(PathBuf, usize)>, image_size: usize) -> Result<Self> {
        let total = samples.len();
        let pb = progress_bar(total);
        let loaded = AtomicUsize::new(0);

        let items: Result<Vec<DroneItem>> = samples
            .par_iter()
            .map(|(path, label)| {
                let item = DroneItem::from_path(path, *label, image_size);
                let count = loaded.fetch_add(1, Ordering::Relaxed);
                if count % 50 == 0 {
                    pb.set_position(count as u64);
                }
                item
            })
            .collect();

        let items = items?;
        pb.finish_and_clear();
        info!("cached {} preprocessed images", items.len());

        Ok(Self { items, image_size })
    }

    /// Target image size
    pub fn image_size(&self) -> usize {
        self.image_size
    }

    /// Labels of all items in dataset order
    pub fn labels(&self) -> Vec<usize> {
        self.items.iter().map(|item| item.label).collect()
    }
}

impl Dataset<DroneItem> for DroneBurnDataset {
    fn get(&self, index: usize) -> Option<DroneItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// A batch of drone images
#[derive(Clone, Debug)]
pub struct DroneBatch<B: Backend> {
    /// Batch of images with shape [batch_size, 3, height, width],
    /// ImageNet-normalized
    pub images: Tensor<B, 4>,
    /// Batch of labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

fn normalize<B: Backend>(images: Tensor<B, 4>, device: &B::Device) -> Tensor<B, 4> {
    let mean = Tensor::<B, 4>::from_floats(
        TensorData::new(IMAGENET_MEAN.to_vec(), [1, 3, 1, 1]),
        device,
    );
    let std = Tensor::<B, 4>::from_floats(
        TensorData::new(IMAGENET_STD.to_vec(), [1, 3, 1, 1]),
        device,
    );
    (images - mean) / std
}

/// Standard batcher without augmentation (validation/test/inference)
#[derive(Clone, Debug)]
pub struct DroneBatcher<B: Backend> {
    #[allow(dead_code)]
    device: B::Device,
    image_size: usize,
}

impl<B: Backend> DroneBatcher<B> {
    /// Create a new batcher for the given device
    pub fn new(device: B::Device, image_size: usize) -> Self {
        Self { device, image_size }
    }
}

impl<B: Backend> Batcher<B, DroneItem, DroneBatch<B>> for DroneBatcher<B> {
    fn batch(&self, items: Vec<DroneItem>, device: &B::Device) -> DroneBatch<B> {
        let batch_size = items.len();
        let channels = 3;
        let height = self.image_size;
        let width = self.image_size;

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.clone()).collect();

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, channels, height, width]),
            device,
        );
        let images = normalize(images, device);

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        DroneBatch { images, targets }
    }
}

/// Batcher that applies on-the-fly augmentation to raw images
///
/// Used during training only. Each batch draws a fresh seeded RNG so
/// augmentation is reproducible for a given trial seed.
pub struct AugmentingBatcher<B: Backend> {
    device: B::Device,
    image_size: usize,
    augmenter: Augmenter,
    seed: u64,
    batch_counter: Arc<AtomicU64>,
}

impl<B: Backend> Clone for AugmentingBatcher<B> {
    fn clone(&self) -> Self {
        Self {
            device: self.device.clone(),
            image_size: self.image_size,
            augmenter: self.augmenter.clone(),
            seed: self.seed,
            batch_counter: Arc::clone(&self.batch_counter),
        }
    }
}

impl<B: Backend> std::fmt::Debug for AugmentingBatcher<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AugmentingBatcher")
            .field("image_size", &self.image_size)
            .field("seed", &self.seed)
            .finish()
    }
}

impl<B: Backend> AugmentingBatcher<B> {
    /// Create a new augmenting batcher with the default training augmentations
    pub fn new(device: B::Device, image_size: usize, seed: u64) -> Self {
        Self::with_config(device, image_size, AugmentationConfig::default(), seed)
    }

    /// Create with a specific augmentation config
    pub fn with_config(
        device: B::Device,
        image_size: usize,
        config: AugmentationConfig,
        seed: u64,
    ) -> Self {
        Self {
            device,
            image_size,
            augmenter: Augmenter::new(config, image_size as u32),
            seed,
            batch_counter: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<B: Backend> Batcher<B, RawDroneItem, DroneBatch<B>> for AugmentingBatcher<B> {
    fn batch(&self, items: Vec<RawDroneItem>, device: &B::Device) -> DroneBatch<B> {
        let batch_size = items.len();
        let channels = 3;
        let height = self.image_size;
        let width = self.image_size;

        let mut images_data = Vec::with_capacity(batch_size * channels * height * width);
        let mut targets_data = Vec::with_capacity(batch_size);

        // Fresh RNG per batch, derived from the trial seed and a batch counter
        let batch_index = self.batch_counter.fetch_add(1, Ordering::Relaxed);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(batch_index));

        for item in items {
            let tensor_data = self.augmenter.preprocess(item.image, Some(&mut rng));
            images_data.extend(tensor_data);
            targets_data.push(item.label as i64);
        }

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, channels, height, width]),
            device,
        );
        let images = normalize(images, device);

        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        DroneBatch { images, targets }
    }
}

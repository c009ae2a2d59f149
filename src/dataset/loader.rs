//! Dataset Loader
//!
//! Loads a three-way split (train/val/test) of drone imagery from disk.
//! Each split directory must contain exactly the two configured class
//! subdirectories; anything else is a configuration error surfaced before
//! any compute happens.

use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::{ClassConfig, TrialConfig};
use crate::utils::error::{DroneWatchError, Result};
use crate::NUM_CLASSES;

/// File extensions picked up by the loader
pub(crate) const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// The three dataset partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    /// Directory name of this split under the dataset root
    pub fn dir_name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

/// A single image sample with its label and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label (0 = negative, 1 = positive)
    pub label: usize,
    /// Class name (directory the image came from)
    pub class_name: String,
    /// Unique sample ID within the split
    pub id: usize,
}

/// One loaded split of the dataset
#[derive(Debug, Clone)]
pub struct SplitDataset {
    /// Which split this is
    pub split: Split,
    /// All samples of the split, enumerated in label order with sorted
    /// file names (deterministic until shuffled)
    pub samples: Vec<ImageSample>,
    /// Class names in label order
    pub class_names: [String; NUM_CLASSES],
}

impl SplitDataset {
    /// Load one split from the dataset root
    ///
    /// Expected layout:
    /// ```text
    /// root/
    /// ├── train/
    /// │   ├── not_drone/*.jpg
    /// │   └── drone/*.jpg
    /// ├── val/...
    /// └── test/...
    /// ```
    pub fn load(root: &Path, split: Split, classes: &ClassConfig) -> Result<Self> {
        if !root.exists() {
            return Err(DroneWatchError::PathNotFound(root.to_path_buf()));
        }

        let split_dir = root.join(split.dir_name());
        if !split_dir.is_dir() {
            return Err(DroneWatchError::Config(format!(
                "missing split directory '{}' under {:?}",
                split.dir_name(),
                root
            )));
        }

        // The split must contain exactly the two configured class directories
        let mut found: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&split_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    found.push(name.to_string());
                }
            }
        }
        found.sort();

        let mut expected = vec![classes.negative.clone(), classes.positive.clone()];
        expected.sort();

        if found != expected {
            return Err(DroneWatchError::Config(format!(
                "split '{}' must contain exactly the class directories {:?}, found {:?}",
                split.dir_name(),
                expected,
                found
            )));
        }

        // Enumerate files per class in label order, file names sorted
        let class_names = [classes.negative.clone(), classes.positive.clone()];
        let mut samples = Vec::new();
        let mut sample_id: usize = 0;

        for (label, class_name) in class_names.iter().enumerate() {
            let class_dir = split_dir.join(class_name);

            let mut paths: Vec<PathBuf> = WalkDir::new(&class_dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.path().to_path_buf())
                .filter(|p| {
                    p.extension()
                        .map(|ext| {
                            let ext = ext.to_string_lossy().to_lowercase();
                            IMAGE_EXTENSIONS.contains(&ext.as_str())
                        })
                        .unwrap_or(false)
                })
                .collect();
            paths.sort();

            for path in paths {
                samples.push(ImageSample {
                    path,
                    label,
                    class_name: class_name.clone(),
                    id: sample_id,
                });
                sample_id += 1;
            }

            debug!("split '{}': class '{}' -> label {}", split, class_name, label);
        }

        info!("loaded split '{}': {} samples", split, samples.len());

        Ok(Self {
            split,
            samples,
            class_names,
        })
    }

    /// Number of samples in the split
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the split is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Shuffle the samples in place with a given seed
    pub fn shuffle(&mut self, seed: u64) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.samples.shuffle(&mut rng);
    }

    /// Samples as (path, label) pairs for the burn dataset constructors
    pub fn sample_pairs(&self) -> Vec<(PathBuf, usize)> {
        self.samples
            .iter()
            .map(|s| (s.path.clone(), s.label))
            .collect()
    }

    /// Per-class sample counts in label order
    pub fn class_counts(&self) -> [usize; NUM_CLASSES] {
        let mut counts = [0usize; NUM_CLASSES];
        for sample in &self.samples {
            if sample.label < NUM_CLASSES {
                counts[sample.label] += 1;
            }
        }
        counts
    }
}

/// All three splits of a trial's dataset
#[derive(Debug, Clone)]
pub struct DatasetSplits {
    pub train: SplitDataset,
    pub val: SplitDataset,
    pub test: SplitDataset,
}

impl DatasetSplits {
    /// Load all splits for a trial; train and val are shuffled with the
    /// trial seed, test keeps its deterministic enumeration order.
    pub fn load(config: &TrialConfig) -> Result<Self> {
        let mut train = SplitDataset::load(&config.data_dir, Split::Train, &config.classes)?;
        let mut val = SplitDataset::load(&config.data_dir, Split::Val, &config.classes)?;
        let test = SplitDataset::load(&config.data_dir, Split::Test, &config.classes)?;

        if train.is_empty() {
            return Err(DroneWatchError::Dataset(
                "train split contains no images".to_string(),
            ));
        }
        if val.is_empty() {
            return Err(DroneWatchError::Dataset(
                "val split contains no images".to_string(),
            ));
        }

        train.shuffle(config.seed);
        val.shuffle(config.seed.wrapping_add(1));

        Ok(Self { train, val, test })
    }

    /// Print per-split statistics
    pub fn print_stats(&self) {
        println!("\n📊 Dataset Statistics:");
        for split in [&self.train, &self.val, &self.test] {
            let counts = split.class_counts();
            println!(
                "  {:>5}: {:5} samples ({}: {}, {}: {})",
                split.split.dir_name(),
                split.len(),
                split.class_names[0],
                counts[0],
                split.class_names[1],
                counts[1],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::fs;

    fn write_image(path: &Path, shade: u8) {
        let mut img = RgbImage::new(16, 16);
        for pixel in img.pixels_mut() {
            *pixel = Rgb([shade, shade / 2, 255 - shade]);
        }
        img.save(path).unwrap();
    }

    fn build_dataset(root: &Path, per_class: usize) {
        for split in ["train", "val", "test"] {
            for class in ["not_drone", "drone"] {
                let dir = root.join(split).join(class);
                fs::create_dir_all(&dir).unwrap();
                for i in 0..per_class {
                    write_image(&dir.join(format!("img_{:03}.png", i)), (i * 40) as u8);
                }
            }
        }
    }

    #[test]
    fn test_load_split_labels_match_directories() {
        let dir = tempfile::tempdir().unwrap();
        build_dataset(dir.path(), 3);

        let split =
            SplitDataset::load(dir.path(), Split::Train, &ClassConfig::default()).unwrap();

        assert_eq!(split.len(), 6);
        for sample in &split.samples {
            let parent = sample.path.parent().unwrap().file_name().unwrap();
            assert_eq!(parent.to_str().unwrap(), sample.class_name);
            let expected = if sample.class_name == "drone" { 1 } else { 0 };
            assert_eq!(sample.label, expected);
        }
    }

    #[test]
    fn test_class_names_identical_across_splits() {
        let dir = tempfile::tempdir().unwrap();
        build_dataset(dir.path(), 2);

        let config = TrialConfig::new(dir.path(), crate::config::DatasetVariant::Real);
        let splits = DatasetSplits::load(&config).unwrap();

        assert_eq!(splits.train.class_names, splits.val.class_names);
        assert_eq!(splits.val.class_names, splits.test.class_names);
        assert_eq!(splits.train.class_names[0], "not_drone");
        assert_eq!(splits.train.class_names[1], "drone");
    }

    #[test]
    fn test_test_split_order_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        build_dataset(dir.path(), 4);

        let a = SplitDataset::load(dir.path(), Split::Test, &ClassConfig::default()).unwrap();
        let b = SplitDataset::load(dir.path(), Split::Test, &ClassConfig::default()).unwrap();

        let paths_a: Vec<_> = a.samples.iter().map(|s| s.path.clone()).collect();
        let paths_b: Vec<_> = b.samples.iter().map(|s| s.path.clone()).collect();
        assert_eq!(paths_a, paths_b);

        // negative class enumerated first, file names sorted
        assert_eq!(a.samples[0].label, 0);
        assert_eq!(a.samples[4].label, 1);
        assert!(paths_a[0] < paths_a[1]);
    }

    #[test]
    fn test_shuffle_is_seeded() {
        let dir = tempfile::tempdir().unwrap();
        build_dataset(dir.path(), 8);

        let mut a = SplitDataset::load(dir.path(), Split::Train, &ClassConfig::default()).unwrap();
        let mut b = SplitDataset::load(dir.path(), Split::Train, &ClassConfig::default()).unwrap();

        a.shuffle(42);
        b.shuffle(42);

        let ids_a: Vec<_> = a.samples.iter().map(|s| s.id).collect();
        let ids_b: Vec<_> = b.samples.iter().map(|s| s.id).collect();
        assert_eq!(ids_a, ids_b);

        let mut c = SplitDataset::load(dir.path(), Split::Train, &ClassConfig::default()).unwrap();
        c.shuffle(7);
        let ids_c: Vec<_> = c.samples.iter().map(|s| s.id).collect();
        assert_ne!(ids_a, ids_c);
    }

    #[test]
    fn test_empty_val_split_fails_at_load_time() {
        let dir = tempfile::tempdir().unwrap();
        build_dataset(dir.path(), 2);

        // Class directories present but without any images
        for class in ["not_drone", "drone"] {
            let class_dir = dir.path().join("val").join(class);
            fs::remove_dir_all(&class_dir).unwrap();
            fs::create_dir_all(&class_dir).unwrap();
        }

        let config = TrialConfig::new(dir.path(), crate::config::DatasetVariant::Real);
        let err = DatasetSplits::load(&config).unwrap_err();
        assert!(matches!(err, DroneWatchError::Dataset(_)));
    }

    #[test]
    fn test_missing_split_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        build_dataset(dir.path(), 1);
        fs::remove_dir_all(dir.path().join("val")).unwrap();

        let err =
            SplitDataset::load(dir.path(), Split::Val, &ClassConfig::default()).unwrap_err();
        assert!(matches!(err, DroneWatchError::Config(_)));
    }

    #[test]
    fn test_unexpected_class_directory_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        build_dataset(dir.path(), 1);
        fs::create_dir_all(dir.path().join("train").join("bird")).unwrap();

        let err =
            SplitDataset::load(dir.path(), Split::Train, &ClassConfig::default()).unwrap_err();
        assert!(matches!(err, DroneWatchError::Config(_)));
    }

    #[test]
    fn test_missing_root_is_path_error() {
        let err = SplitDataset::load(
            Path::new("/nonexistent/dataset"),
            Split::Train,
            &ClassConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DroneWatchError::PathNotFound(_)));
    }
}

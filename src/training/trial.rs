//! Trial Runner
//!
//! Runs a single experiment trial as a linear sequence of phases:
//! Init -> DataLoaded -> ModelBuilt -> Training -> Evaluated -> Done.
//! Every trial starts from a fresh compute context and a fresh model;
//! any error aborts the trial with no partial result.

use std::marker::PhantomData;

use burn::tensor::backend::AutodiffBackend;
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{DatasetVariant, TrialConfig};
use crate::dataset::burn_dataset::{DroneBurnDataset, RawDroneDataset};
use crate::dataset::loader::{DatasetSplits, Split, SplitDataset};
use crate::inference::predictor::Predictor;
use crate::model::classifier::build_classifier;
use crate::training::trainer::{fit, EpochRecord, TrainingState};
use crate::utils::error::{DroneWatchError, Result};
use crate::utils::format_duration;
use crate::utils::metrics::Metrics;
use crate::NUM_CLASSES;

/// Phases a trial moves through, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialPhase {
    Init,
    DataLoaded,
    ModelBuilt,
    Training,
    Evaluated,
    Done,
}

/// Fresh compute context for one trial
///
/// Seeds the backend RNG and provides the device; nothing is shared with
/// previous trials.
pub struct TrialContext<B: AutodiffBackend> {
    pub device: B::Device,
    pub seed: u64,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> TrialContext<B> {
    pub fn new(seed: u64) -> Self {
        B::seed(seed);
        Self {
            device: Default::default(),
            seed,
            _backend: PhantomData,
        }
    }
}

/// Outcome of a completed trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    /// Which dataset variant was trained on
    pub variant: DatasetVariant,
    /// Effective learning rate
    pub learning_rate: f64,
    /// Per-epoch loss/accuracy history
    pub history: Vec<EpochRecord>,
    /// Epoch with the lowest validation loss (0-indexed)
    pub best_epoch: usize,
    /// Whether the patience budget stopped training before the epoch budget
    pub stopped_early: bool,
    /// Wall-clock duration of the whole trial in seconds
    pub wall_time_seconds: f64,
    /// Test-set metrics (accuracy, weighted precision/recall/F1,
    /// confusion matrix)
    pub metrics: Metrics,
}

/// Run one full trial: load data, build the model, fit, evaluate on a
/// freshly re-read test split, and aggregate metrics.
pub fn run_trial<B: AutodiffBackend>(config: &TrialConfig) -> Result<TrialResult> {
    config.validate()?;

    let started = std::time::Instant::now();
    let mut phase = TrialPhase::Init;
    let ctx = TrialContext::<B>::new(config.seed);
    info!(
        "starting trial: variant '{}', lr {}, seed {}",
        config.variant,
        config.learning_rate(),
        config.seed
    );

    // Load splits; train/val shuffled with the trial seed, config errors
    // surface here before any compute
    let splits = DatasetSplits::load(config)?;
    let train_raw = RawDroneDataset::new_cached(splits.train.sample_pairs())?;
    let val_ds = DroneBurnDataset::new_cached(splits.val.sample_pairs(), config.image_size)?;
    advance(&mut phase, TrialPhase::DataLoaded);

    // Fresh model per trial
    let mut model = build_classifier::<B>(
        config.dropout,
        config.pretrained_weights.as_deref(),
        &ctx.device,
    )?;
    advance(&mut phase, TrialPhase::ModelBuilt);

    advance(&mut phase, TrialPhase::Training);
    let state = fit(&mut model, &train_raw, &val_ds, config, &ctx.device)?;

    // Defensive re-read of the test split: fresh from disk, unshuffled, so
    // predictions zip positionally with ground truth
    let test = SplitDataset::load(&config.data_dir, Split::Test, &config.classes)?;
    if test.is_empty() {
        return Err(DroneWatchError::Dataset(
            "test split contains no images".to_string(),
        ));
    }
    let test_ds = DroneBurnDataset::new_cached(test.sample_pairs(), config.image_size)?;

    let predictor = Predictor::new(
        model,
        test.class_names.clone(),
        config.image_size,
        config.batch_size,
        ctx.device.clone(),
    );
    let outputs = predictor.predict_dataset(&test_ds)?;
    advance(&mut phase, TrialPhase::Evaluated);

    let class_names = test.class_names.clone();
    let names: Vec<&str> = class_names.iter().map(|s| s.as_str()).collect();
    let metrics = Metrics::from_predictions(&outputs.predictions, &outputs.targets, NUM_CLASSES)
        .with_class_names(&names);

    let TrainingState {
        best_epoch,
        stopped_early,
        history,
        ..
    } = state;

    let result = TrialResult {
        variant: config.variant,
        learning_rate: config.learning_rate(),
        history,
        best_epoch,
        stopped_early,
        wall_time_seconds: started.elapsed().as_secs_f64(),
        metrics,
    };

    save_result(&result, config)?;
    advance(&mut phase, TrialPhase::Done);

    info!(
        "trial complete in {}: accuracy {:.2}%, weighted f1 {:.2}%",
        format_duration(result.wall_time_seconds),
        result.metrics.accuracy * 100.0,
        result.metrics.weighted_f1 * 100.0
    );

    Ok(result)
}

fn advance(phase: &mut TrialPhase, next: TrialPhase) {
    debug!("trial phase: {:?} -> {:?}", phase, next);
    *phase = next;
}

/// Persist the trial result as timestamped JSON in the output directory
fn save_result(result: &TrialResult, config: &TrialConfig) -> Result<()> {
    std::fs::create_dir_all(&config.output_dir)?;

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = config
        .output_dir
        .join(format!("trial_{}_{}.json", config.variant, timestamp));

    let content = serde_json::to_string_pretty(result)
        .map_err(|e| DroneWatchError::Serialization(e.to_string()))?;
    std::fs::write(&path, content)?;

    info!("saved trial result to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use image::{Rgb, RgbImage};
    use std::fs;
    use std::path::Path;

    type TestBackend = Autodiff<NdArray>;

    fn write_image(path: &Path, shade: u8) {
        let mut img = RgbImage::new(16, 16);
        for pixel in img.pixels_mut() {
            *pixel = Rgb([shade, 255 - shade, shade / 2]);
        }
        img.save(path).unwrap();
    }

    fn build_dataset(root: &Path, per_class: usize) {
        for split in ["train", "val", "test"] {
            for (ci, class) in ["not_drone", "drone"].iter().enumerate() {
                let dir = root.join(split).join(class);
                fs::create_dir_all(&dir).unwrap();
                for i in 0..per_class {
                    write_image(
                        &dir.join(format!("img_{:02}.png", i)),
                        (ci * 128 + i * 10) as u8,
                    );
                }
            }
        }
    }

    fn tiny_config(data_dir: &Path, output_dir: &Path) -> TrialConfig {
        let mut config = TrialConfig::new(data_dir, DatasetVariant::Synthetic);
        config.image_size = 32;
        config.batch_size = 4;
        config.epochs = 1;
        config.output_dir = output_dir.to_path_buf();
        config
    }

    #[test]
    fn test_trial_context_is_fresh() {
        let ctx = TrialContext::<TestBackend>::new(7);
        assert_eq!(ctx.seed, 7);
    }

    #[test]
    fn test_run_trial_end_to_end() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        build_dataset(data.path(), 4);

        let config = tiny_config(data.path(), out.path());
        let result = run_trial::<TestBackend>(&config).unwrap();

        // 8 test samples land in a 2x2 matrix that totals the split size
        assert_eq!(result.metrics.confusion_matrix.num_classes, 2);
        assert_eq!(result.metrics.confusion_matrix.total(), 8);
        assert_eq!(result.metrics.total_samples, 8);
        assert!(
            (result.metrics.confusion_matrix.accuracy() - result.metrics.accuracy).abs() < 1e-9
        );

        // One epoch of history, no early stop possible
        assert_eq!(result.history.len(), 1);
        assert!(!result.stopped_early);
        assert!(result.wall_time_seconds > 0.0);

        // Best-head checkpoint written
        assert!(out.path().join("best_head.mpk").exists());
    }

    #[test]
    fn test_run_trial_rejects_missing_split() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        build_dataset(data.path(), 2);
        fs::remove_dir_all(data.path().join("test")).unwrap();

        let config = tiny_config(data.path(), out.path());
        let err = run_trial::<TestBackend>(&config).unwrap_err();
        assert!(matches!(err, DroneWatchError::Config(_)));
    }

    #[test]
    fn test_trial_respects_epoch_budget() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        build_dataset(data.path(), 3);

        let mut config = tiny_config(data.path(), out.path());
        config.epochs = 2;

        let result = run_trial::<TestBackend>(&config).unwrap();
        assert!(result.history.len() <= 2);
    }
}

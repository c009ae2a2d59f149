//! Fit Loop
//!
//! Manual training loop over the cached datasets: seeded per-epoch
//! reshuffle, lazy batching, Adam on the trainable head only, validation
//! after every epoch, early stopping on validation loss with best-weights
//! restore and best-only checkpointing.

use std::path::{Path, PathBuf};

use burn::{
    data::dataloader::batcher::Batcher,
    data::dataset::Dataset,
    nn::loss::BinaryCrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::activation::sigmoid,
    tensor::backend::AutodiffBackend,
    tensor::ElementConversion,
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::TrialConfig;
use crate::dataset::burn_dataset::{AugmentingBatcher, DroneBatcher, DroneBurnDataset, RawDroneDataset};
use crate::model::classifier::DroneClassifier;
use crate::utils::error::{DroneWatchError, Result};
use crate::utils::metrics::RunningAverage;

/// Per-epoch training and validation figures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
}

/// Tracks validation-loss improvements across epochs for early stopping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingState {
    pub best_val_loss: f64,
    pub best_epoch: usize,
    pub epochs_without_improvement: usize,
    pub history: Vec<EpochRecord>,
    pub stopped_early: bool,
}

impl Default for TrainingState {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingState {
    pub fn new() -> Self {
        Self {
            best_val_loss: f64::INFINITY,
            best_epoch: 0,
            epochs_without_improvement: 0,
            history: Vec::new(),
            stopped_early: false,
        }
    }

    /// Record an epoch; returns true when validation loss improved
    pub fn record(&mut self, record: EpochRecord) -> bool {
        let improved = record.val_loss < self.best_val_loss;
        if improved {
            self.best_val_loss = record.val_loss;
            self.best_epoch = record.epoch;
            self.epochs_without_improvement = 0;
        } else {
            self.epochs_without_improvement += 1;
        }
        self.history.push(record);
        improved
    }

    /// True when the patience budget is exhausted
    pub fn should_early_stop(&self, patience: usize) -> bool {
        self.epochs_without_improvement >= patience
    }
}

/// Train the classifier head; returns the training state with full history.
///
/// On return the model holds the head weights of the best epoch, and the
/// same weights have been checkpointed to `<output_dir>/best_head`.
pub fn fit<B: AutodiffBackend>(
    model: &mut DroneClassifier<B>,
    train: &RawDroneDataset,
    val: &DroneBurnDataset,
    config: &TrialConfig,
    device: &B::Device,
) -> Result<TrainingState> {
    if train.len() == 0 {
        return Err(DroneWatchError::Training(
            "training dataset is empty".to_string(),
        ));
    }

    std::fs::create_dir_all(&config.output_dir)?;
    let checkpoint_path = checkpoint_path(&config.output_dir);

    let lr = config.learning_rate();
    let batch_size = config.batch_size;

    let mut optimizer = AdamConfig::new().init();
    let train_batcher = AugmentingBatcher::<B>::new(device.clone(), config.image_size, config.seed);
    let val_batcher = DroneBatcher::<B::InnerBackend>::new(device.clone(), config.image_size);
    let loss_fn = BinaryCrossEntropyLossConfig::new()
        .with_logits(true)
        .init(device);

    info!(
        "fitting head: {} train / {} val samples, lr {}, batch size {}",
        train.len(),
        val.len(),
        lr,
        batch_size
    );

    let mut state = TrainingState::new();
    let mut best_head = model.head.clone();
    let mut epoch_rng = ChaCha8Rng::seed_from_u64(config.seed);

    for epoch in 0..config.epochs {
        let mut epoch_loss = RunningAverage::new();
        let mut correct = 0usize;
        let mut total = 0usize;

        // Fresh shuffle every epoch; batches are assembled on demand
        let mut indices: Vec<usize> = (0..train.len()).collect();
        indices.shuffle(&mut epoch_rng);
        let num_batches = indices.len().div_ceil(batch_size);

        for batch_idx in 0..num_batches {
            let start = batch_idx * batch_size;
            let end = (start + batch_size).min(indices.len());
            let items: Vec<_> = indices[start..end]
                .iter()
                .filter_map(|&i| train.get(i))
                .collect();

            if items.is_empty() {
                continue;
            }

            let batch = train_batcher.batch(items, device);

            let logits = model.forward(batch.images.clone());
            let loss = loss_fn.forward(logits.clone(), batch.targets.clone());

            let loss_value: f64 = loss.clone().into_scalar().elem();
            epoch_loss.add(loss_value);

            let predictions = sigmoid(logits).greater_elem(0.5).int();
            let batch_correct: i64 = predictions
                .equal(batch.targets.clone())
                .int()
                .sum()
                .into_scalar()
                .elem();
            correct += batch_correct as usize;
            total += batch.targets.dims()[0];

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model.head);
            model.head = optimizer.step(lr, model.head.clone(), grads);

            if (batch_idx + 1) % 10 == 0 || batch_idx == num_batches - 1 {
                debug!(
                    "epoch {} batch {}/{}: loss = {:.4}",
                    epoch + 1,
                    batch_idx + 1,
                    num_batches,
                    loss_value
                );
            }
        }

        let train_loss = epoch_loss.average();
        let train_accuracy = correct as f64 / total.max(1) as f64;

        let (val_loss, val_accuracy) = evaluate(model, val, &val_batcher, batch_size, device)?;

        let record = EpochRecord {
            epoch,
            train_loss,
            train_accuracy,
            val_loss,
            val_accuracy,
        };

        let improved = state.record(record);
        if improved {
            best_head = model.head.clone();
            model.save_head(&checkpoint_path)?;
            debug!("checkpointed best head to {:?}", checkpoint_path);
        }

        info!(
            "epoch {}/{}: train loss {:.4}, train acc {:.2}%, val loss {:.4}, val acc {:.2}%{}",
            epoch + 1,
            config.epochs,
            train_loss,
            train_accuracy * 100.0,
            val_loss,
            val_accuracy * 100.0,
            if improved { " (best)" } else { "" }
        );

        if state.should_early_stop(config.patience) {
            warn!(
                "early stopping after {} epochs without improvement",
                config.patience
            );
            state.stopped_early = true;
            break;
        }
    }

    // Restore the weights of the best epoch
    model.head = best_head;
    info!(
        "training done: best val loss {:.4} at epoch {}",
        state.best_val_loss,
        state.best_epoch + 1
    );

    Ok(state)
}

/// Path of the best-head checkpoint inside an output directory
pub fn checkpoint_path(output_dir: &Path) -> PathBuf {
    output_dir.join("best_head")
}

/// Evaluate the model on a cached dataset; returns (mean loss, accuracy)
pub fn evaluate<B: AutodiffBackend>(
    model: &DroneClassifier<B>,
    dataset: &DroneBurnDataset,
    batcher: &DroneBatcher<B::InnerBackend>,
    batch_size: usize,
    device: &B::Device,
) -> Result<(f64, f64)> {
    if dataset.len() == 0 {
        return Err(DroneWatchError::Training(
            "evaluation dataset is empty".to_string(),
        ));
    }

    let loss_fn = BinaryCrossEntropyLossConfig::new()
        .with_logits(true)
        .init::<B::InnerBackend>(device);

    let len = dataset.len();
    let mut loss_sum = 0.0f64;
    let mut correct = 0usize;
    let mut total = 0usize;

    for start in (0..len).step_by(batch_size) {
        let end = (start + batch_size).min(len);
        let items: Vec<_> = (start..end).filter_map(|i| dataset.get(i)).collect();

        if items.is_empty() {
            continue;
        }

        let batch = batcher.batch(items, device);
        let batch_len = batch.targets.dims()[0];

        let logits = model.forward_inference(batch.images);
        let loss = loss_fn.forward(logits.clone(), batch.targets.clone());
        let loss_value: f64 = loss.into_scalar().elem();
        loss_sum += loss_value * batch_len as f64;

        let predictions = sigmoid(logits).greater_elem(0.5).int();
        let batch_correct: i64 = predictions
            .equal(batch.targets)
            .int()
            .sum()
            .into_scalar()
            .elem();

        correct += batch_correct as usize;
        total += batch_len;
    }

    Ok((loss_sum / total as f64, correct as f64 / total as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatasetVariant;
    use crate::model::classifier::DroneClassifierConfig;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Tensor;
    use image::{Rgb, RgbImage};
    use std::fs;
    use std::path::Path;

    type TestBackend = Autodiff<NdArray>;

    fn record(epoch: usize, val_loss: f64) -> EpochRecord {
        EpochRecord {
            epoch,
            train_loss: 1.0,
            train_accuracy: 0.5,
            val_loss,
            val_accuracy: 0.5,
        }
    }

    #[test]
    fn test_best_epoch_tracked() {
        let mut state = TrainingState::new();

        assert!(state.record(record(0, 0.9)));
        assert!(state.record(record(1, 0.7)));
        assert!(!state.record(record(2, 0.8)));

        assert_eq!(state.best_epoch, 1);
        assert!((state.best_val_loss - 0.7).abs() < 1e-9);
        assert_eq!(state.epochs_without_improvement, 1);
    }

    #[test]
    fn test_best_epoch_survives_degradation() {
        // Loss improves until epoch 3 (0-indexed), then degrades; the best
        // epoch must stay put
        let mut state = TrainingState::new();
        for (epoch, loss) in [0.9, 0.8, 0.7, 0.6, 0.65, 0.7, 0.8].iter().enumerate() {
            state.record(record(epoch, *loss));
        }

        assert_eq!(state.best_epoch, 3);
        assert!((state.best_val_loss - 0.6).abs() < 1e-9);
        assert_eq!(state.epochs_without_improvement, 3);
        assert!(state.should_early_stop(3));
    }

    #[test]
    fn test_early_stop_respects_patience() {
        let mut state = TrainingState::new();

        state.record(record(0, 0.5));
        state.record(record(1, 0.6));
        state.record(record(2, 0.7));
        assert!(!state.should_early_stop(3));

        state.record(record(3, 0.8));
        assert!(state.should_early_stop(3));
    }

    #[test]
    fn test_improvement_resets_patience_counter() {
        let mut state = TrainingState::new();

        state.record(record(0, 0.5));
        state.record(record(1, 0.6));
        state.record(record(2, 0.55));
        state.record(record(3, 0.4));
        assert_eq!(state.epochs_without_improvement, 0);
        assert_eq!(state.best_epoch, 3);
    }

    fn build_tiny_dataset(root: &Path, per_class: usize) {
        for split in ["train", "val"] {
            for (ci, class) in ["not_drone", "drone"].iter().enumerate() {
                let dir = root.join(split).join(class);
                fs::create_dir_all(&dir).unwrap();
                for i in 0..per_class {
                    let mut img = RgbImage::new(16, 16);
                    for pixel in img.pixels_mut() {
                        *pixel = Rgb([(ci * 120 + i * 20) as u8, 64, 200]);
                    }
                    img.save(dir.join(format!("img_{:02}.png", i))).unwrap();
                }
            }
        }
    }

    #[test]
    fn test_backbone_stays_frozen_during_fit() {
        use crate::config::{ClassConfig, TrialConfig};
        use crate::dataset::loader::{Split, SplitDataset};

        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        build_tiny_dataset(data.path(), 3);

        let mut config = TrialConfig::new(data.path(), DatasetVariant::Synthetic);
        config.image_size = 32;
        config.batch_size = 3;
        config.epochs = 1;
        config.output_dir = out.path().to_path_buf();

        let classes = ClassConfig::default();
        let train = SplitDataset::load(data.path(), Split::Train, &classes).unwrap();
        let val = SplitDataset::load(data.path(), Split::Val, &classes).unwrap();
        let train_raw = RawDroneDataset::new_cached(train.sample_pairs()).unwrap();
        let val_ds = DroneBurnDataset::new_cached(val.sample_pairs(), 32).unwrap();

        let device = Default::default();
        let mut model = DroneClassifierConfig::new().init::<TestBackend>(&device);
        let backbone_before = model.backbone.clone();

        let input = Tensor::<NdArray, 4>::ones([1, 3, 32, 32], &device);
        let logit_before = model
            .forward_inference(input.clone())
            .into_data();

        fit(&mut model, &train_raw, &val_ds, &config, &device).unwrap();

        // The backbone never enters the optimizer; its features must be
        // bit-identical after training while the head moved
        let features_before = backbone_before.forward(input.clone()).into_data();
        let features_after = model.backbone.forward(input.clone()).into_data();
        assert_eq!(features_before, features_after);

        let logit_after = model.forward_inference(input).into_data();
        assert_ne!(logit_before, logit_after);
    }

    #[test]
    fn test_fit_restores_checkpointed_best_head_weights() {
        use crate::config::{ClassConfig, TrialConfig};
        use crate::dataset::loader::{Split, SplitDataset};

        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        build_tiny_dataset(data.path(), 4);

        let mut config = TrialConfig::new(data.path(), DatasetVariant::Synthetic);
        config.image_size = 32;
        config.batch_size = 4;
        config.epochs = 4;
        config.output_dir = out.path().to_path_buf();

        let classes = ClassConfig::default();
        let train = SplitDataset::load(data.path(), Split::Train, &classes).unwrap();
        let val = SplitDataset::load(data.path(), Split::Val, &classes).unwrap();
        let train_raw = RawDroneDataset::new_cached(train.sample_pairs()).unwrap();
        let val_ds = DroneBurnDataset::new_cached(val.sample_pairs(), 32).unwrap();

        let device = Default::default();
        let mut model = DroneClassifierConfig::new().init::<TestBackend>(&device);

        let state = fit(&mut model, &train_raw, &val_ds, &config, &device).unwrap();

        // The returned model must hold the best-epoch head, which is exactly
        // what the checkpoint file contains. Even when validation loss
        // degrades after the best epoch, the restored head matches the
        // checkpoint, not the last epoch's weights.
        let mut restored = DroneClassifierConfig::new().init::<TestBackend>(&device);
        restored.backbone = model.backbone.clone();
        restored
            .load_head(checkpoint_path(&config.output_dir), &device)
            .unwrap();

        let input = Tensor::<NdArray, 4>::ones([2, 3, 32, 32], &device);
        let from_model = model.forward_inference(input.clone()).into_data();
        let from_checkpoint = restored.forward_inference(input).into_data();
        assert_eq!(from_model, from_checkpoint);

        assert!(state.best_epoch < config.epochs);
    }
}

//! Predictor
//!
//! Batched and single-image inference with the trained classifier.
//! Sigmoid outputs are thresholded at 0.5 by default.

use std::path::Path;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::AutodiffBackend;

use crate::dataset::burn_dataset::{DroneBatcher, DroneBurnDataset, DroneItem};
use crate::model::classifier::DroneClassifier;
use crate::utils::error::{DroneWatchError, Result};
use crate::{DEFAULT_THRESHOLD, NUM_CLASSES};

/// A single prediction
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Predicted label (0 = negative, 1 = positive)
    pub label: usize,
    /// Predicted class name
    pub class_name: String,
    /// Sigmoid output: probability of the positive class
    pub probability: f32,
}

/// Predictions over a whole dataset, positionally aligned with its items
#[derive(Debug, Clone)]
pub struct DatasetPredictions {
    /// Predicted labels
    pub predictions: Vec<usize>,
    /// Ground-truth labels from the dataset
    pub targets: Vec<usize>,
    /// Positive-class probabilities
    pub probabilities: Vec<f32>,
}

/// Runs the classifier on preprocessed items
pub struct Predictor<B: AutodiffBackend> {
    model: DroneClassifier<B>,
    batcher: DroneBatcher<B::InnerBackend>,
    class_names: [String; NUM_CLASSES],
    image_size: usize,
    batch_size: usize,
    threshold: f32,
    device: B::Device,
}

impl<B: AutodiffBackend> Predictor<B> {
    /// Create a new predictor with the default 0.5 threshold
    pub fn new(
        model: DroneClassifier<B>,
        class_names: [String; NUM_CLASSES],
        image_size: usize,
        batch_size: usize,
        device: B::Device,
    ) -> Self {
        Self {
            model,
            batcher: DroneBatcher::new(device.clone(), image_size),
            class_names,
            image_size,
            batch_size,
            threshold: DEFAULT_THRESHOLD,
            device,
        }
    }

    /// Override the decision threshold
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Predict every item of a cached dataset in batches
    pub fn predict_dataset(&self, dataset: &DroneBurnDataset) -> Result<DatasetPredictions> {
        let len = dataset.len();
        let mut predictions = Vec::with_capacity(len);
        let mut targets = Vec::with_capacity(len);
        let mut probabilities = Vec::with_capacity(len);

        for start in (0..len).step_by(self.batch_size) {
            let end = (start + self.batch_size).min(len);
            let items: Vec<_> = (start..end).filter_map(|i| dataset.get(i)).collect();

            if items.is_empty() {
                continue;
            }

            let batch = self.batcher.batch(items, &self.device);

            let logits = self.model.forward_inference(batch.images);
            let probs = sigmoid(logits);

            for prob in probs.into_data().iter::<f32>() {
                probabilities.push(prob);
                predictions.push((prob > self.threshold) as usize);
            }
            for target in batch.targets.into_data().iter::<i64>() {
                targets.push(target as usize);
            }
        }

        Ok(DatasetPredictions {
            predictions,
            targets,
            probabilities,
        })
    }

    /// Predict a single image from disk
    pub fn predict_image(&self, path: &Path) -> Result<Prediction> {
        let item = DroneItem::from_path(&path.to_path_buf(), 0, self.image_size)?;
        let batch = self.batcher.batch(vec![item], &self.device);

        let logits = self.model.forward_inference(batch.images);
        let probs = sigmoid(logits);

        let probability = probs
            .into_data()
            .iter::<f32>()
            .next()
            .ok_or_else(|| DroneWatchError::Inference("empty model output".to_string()))?;

        let label = (probability > self.threshold) as usize;

        Ok(Prediction {
            label,
            class_name: self.class_names[label].clone(),
            probability,
        })
    }

    /// Class names in label order
    pub fn class_names(&self) -> &[String; NUM_CLASSES] {
        &self.class_names
    }
}

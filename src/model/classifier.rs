//! Drone Classifier
//!
//! A frozen pretrained ResNet-50 feature extractor paired with a small
//! trainable head (dropout + a single sigmoid unit).
//!
//! The backbone lives on the non-autodiff inner backend: no gradients exist
//! for it and batch norm always uses its running statistics, so the
//! pretrained weights cannot drift. Only the head participates in
//! optimization.

use std::path::Path;

use burn::{
    module::AutodiffModule,
    nn::{Dropout, DropoutConfig, Linear, LinearConfig},
    prelude::*,
    record::CompactRecorder,
    tensor::backend::AutodiffBackend,
};
use tracing::{info, warn};

use crate::model::resnet::{ResNet50, ResNet50Config, FEATURE_DIM};
use crate::utils::error::{DroneWatchError, Result as DwResult};

/// Trainable classification head: dropout + one dense unit (2049 parameters)
#[derive(Module, Debug)]
pub struct DroneHead<B: Backend> {
    dropout: Dropout,
    fc: Linear<B>,
}

impl<B: Backend> DroneHead<B> {
    /// Produce one logit per sample from pooled backbone features
    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 1> {
        let x = self.dropout.forward(features);
        self.fc.forward(x).squeeze::<1>(1)
    }
}

#[derive(Config, Debug)]
pub struct DroneHeadConfig {
    #[config(default = 0.4)]
    pub dropout: f64,
}

impl DroneHeadConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DroneHead<B> {
        DroneHead {
            dropout: DropoutConfig::new(self.dropout).init(),
            fc: LinearConfig::new(FEATURE_DIM, 1).init(device),
        }
    }
}

/// Full classifier: frozen backbone + trainable head
pub struct DroneClassifier<B: AutodiffBackend> {
    /// Feature extractor on the inner backend (frozen by construction)
    pub backbone: ResNet50<B::InnerBackend>,
    /// Trainable head on the autodiff backend
    pub head: DroneHead<B>,
}

impl<B: AutodiffBackend> Clone for DroneClassifier<B> {
    fn clone(&self) -> Self {
        Self {
            backbone: self.backbone.clone(),
            head: self.head.clone(),
        }
    }
}

impl<B: AutodiffBackend> std::fmt::Debug for DroneClassifier<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DroneClassifier")
            .field("head", &self.head)
            .finish()
    }
}

#[derive(Config, Debug)]
pub struct DroneClassifierConfig {
    #[config(default = 0.4)]
    pub dropout: f64,
}

impl DroneClassifierConfig {
    /// Initialize the classifier with a randomly initialized backbone
    pub fn init<B: AutodiffBackend>(&self, device: &B::Device) -> DroneClassifier<B> {
        DroneClassifier {
            backbone: ResNet50Config::new().init::<B::InnerBackend>(device),
            head: DroneHeadConfig::new().with_dropout(self.dropout).init(device),
        }
    }
}

impl<B: AutodiffBackend> DroneClassifier<B> {
    /// Training forward pass
    ///
    /// Features are computed on the inner backend (no gradients, batch norm
    /// in inference mode) and re-enter the autodiff graph as a leaf before
    /// the head. Dropout is active because the head runs under autodiff.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 1> {
        let features = self.backbone.forward(images.inner());
        let features = Tensor::from_inner(features);
        self.head.forward(features)
    }

    /// Inference forward pass: everything on the inner backend, dropout off
    pub fn forward_inference(
        &self,
        images: Tensor<B::InnerBackend, 4>,
    ) -> Tensor<B::InnerBackend, 1> {
        let features = self.backbone.forward(images);
        self.head.valid().forward(features)
    }

    /// Load pretrained backbone weights from a burn record file
    pub fn load_backbone<P: AsRef<Path>>(&mut self, path: P, device: &B::Device) -> DwResult<()> {
        let path = path.as_ref();
        info!("loading pretrained backbone weights from {:?}", path);

        self.backbone = self
            .backbone
            .clone()
            .load_file(path, &CompactRecorder::new(), device)
            .map_err(|e| {
                DroneWatchError::Model(format!(
                    "failed to load backbone weights from {:?}: {}",
                    path, e
                ))
            })?;

        Ok(())
    }

    /// Save the head weights (the only trainable part) to a record file
    pub fn save_head<P: AsRef<Path>>(&self, path: P) -> DwResult<()> {
        self.head
            .clone()
            .save_file(path.as_ref().to_path_buf(), &CompactRecorder::new())
            .map_err(|e| DroneWatchError::Model(format!("failed to save head weights: {}", e)))
    }

    /// Load head weights from a record file
    pub fn load_head<P: AsRef<Path>>(&mut self, path: P, device: &B::Device) -> DwResult<()> {
        self.head = self
            .head
            .clone()
            .load_file(path.as_ref().to_path_buf(), &CompactRecorder::new(), device)
            .map_err(|e| {
                DroneWatchError::Model(format!(
                    "failed to load head weights from {:?}: {}",
                    path.as_ref(),
                    e
                ))
            })?;

        Ok(())
    }
}

/// Build the classifier for a trial, loading pretrained backbone weights
/// when a path is configured.
pub fn build_classifier<B: AutodiffBackend>(
    dropout: f64,
    pretrained_weights: Option<&Path>,
    device: &B::Device,
) -> DwResult<DroneClassifier<B>> {
    let mut model = DroneClassifierConfig::new()
        .with_dropout(dropout)
        .init::<B>(device);

    match pretrained_weights {
        Some(path) => model.load_backbone(path, device)?,
        None => warn!("no pretrained backbone weights configured, using random initialization"),
    }

    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_head_parameter_count() {
        let device = Default::default();
        let head = DroneHeadConfig::new().init::<NdArray>(&device);

        // 2048 weights + 1 bias
        assert_eq!(head.num_params(), 2049);
    }

    #[test]
    fn test_forward_produces_one_logit_per_sample() {
        let device = Default::default();
        let model = DroneClassifierConfig::new().init::<TestBackend>(&device);

        let images = Tensor::<TestBackend, 4>::zeros([3, 3, 64, 64], &device);
        let logits = model.forward(images);

        assert_eq!(logits.dims(), [3]);
    }

    #[test]
    fn test_inference_matches_batch_size() {
        let device = Default::default();
        let model = DroneClassifierConfig::new().init::<TestBackend>(&device);

        let images = Tensor::<NdArray, 4>::zeros([2, 3, 64, 64], &device);
        let logits = model.forward_inference(images);

        assert_eq!(logits.dims(), [2]);
    }

    #[test]
    fn test_head_save_load_roundtrip() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("head");

        let model = DroneClassifierConfig::new().init::<TestBackend>(&device);
        model.save_head(&path).unwrap();

        let mut other = DroneClassifierConfig::new().init::<TestBackend>(&device);
        other.load_head(&path, &device).unwrap();

        let a = model.head.fc.weight.val().into_data();
        let b = other.head.fc.weight.val().into_data();
        assert_eq!(a, b);
    }
}

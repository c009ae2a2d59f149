//! Inference module: batched and single-image prediction

pub mod predictor;

pub use predictor::{DatasetPredictions, Prediction, Predictor};

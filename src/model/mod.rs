//! Model module: ResNet-50 feature extractor and the trainable head

pub mod classifier;
pub mod resnet;

pub use classifier::{
    build_classifier, DroneClassifier, DroneClassifierConfig, DroneHead, DroneHeadConfig,
};
pub use resnet::{ResNet50, ResNet50Config, FEATURE_DIM};

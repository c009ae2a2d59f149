//! Trial Configuration
//!
//! Serde-backed configuration for experiment trials. A config can be built
//! programmatically, loaded from a JSON file, or assembled from CLI flags.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::error::{DroneWatchError, Result};
use crate::{IMAGE_SIZE, NUM_CLASSES};

/// Which dataset flavour a trial runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DatasetVariant {
    /// Photographs of real drones
    Real,
    /// Rendered/synthetic drone imagery
    Synthetic,
    /// Mix of real and synthetic imagery
    Hybrid,
}

impl DatasetVariant {
    /// Default Adam learning rate for this variant
    pub fn default_learning_rate(&self) -> f64 {
        match self {
            DatasetVariant::Real => 1e-5,
            DatasetVariant::Synthetic | DatasetVariant::Hybrid => 1e-3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetVariant::Real => "real",
            DatasetVariant::Synthetic => "synthetic",
            DatasetVariant::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for DatasetVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The two class directories every split must contain
///
/// The negative class maps to label 0 and the positive class to label 1.
/// The model's sigmoid output is the probability of the positive class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassConfig {
    /// Directory name of the negative class (label 0)
    pub negative: String,
    /// Directory name of the positive class (label 1)
    pub positive: String,
}

impl Default for ClassConfig {
    fn default() -> Self {
        Self {
            negative: "not_drone".to_string(),
            positive: "drone".to_string(),
        }
    }
}

impl ClassConfig {
    /// Class names in label order
    pub fn names(&self) -> [&str; NUM_CLASSES] {
        [&self.negative, &self.positive]
    }
}

/// Full configuration for a single trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialConfig {
    /// Dataset root containing train/, val/ and test/ splits
    pub data_dir: PathBuf,

    /// Dataset variant, selects the default learning rate
    pub variant: DatasetVariant,

    /// Class directory names (negative first)
    pub classes: ClassConfig,

    /// Input image size (pixels per side)
    pub image_size: usize,

    /// Batch size for training and evaluation
    pub batch_size: usize,

    /// Epoch budget
    pub epochs: usize,

    /// Early stopping patience (epochs without val-loss improvement)
    pub patience: usize,

    /// Learning rate override; falls back to the variant default when unset
    pub learning_rate: Option<f64>,

    /// Dropout probability for the classification head
    pub dropout: f64,

    /// Seed for shuffling and augmentation
    pub seed: u64,

    /// Optional path to pretrained backbone weights (burn record)
    pub pretrained_weights: Option<PathBuf>,

    /// Directory for checkpoints and trial results
    pub output_dir: PathBuf,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            variant: DatasetVariant::Real,
            classes: ClassConfig::default(),
            image_size: IMAGE_SIZE,
            batch_size: 32,
            epochs: 10,
            patience: 3,
            learning_rate: None,
            dropout: 0.4,
            seed: 42,
            pretrained_weights: None,
            output_dir: PathBuf::from("output"),
        }
    }
}

impl TrialConfig {
    /// Create a config for the given dataset root and variant
    pub fn new<P: Into<PathBuf>>(data_dir: P, variant: DatasetVariant) -> Self {
        Self {
            data_dir: data_dir.into(),
            variant,
            ..Self::default()
        }
    }

    /// The effective learning rate for this trial
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
            .unwrap_or_else(|| self.variant.default_learning_rate())
    }

    /// Validate parameter ranges
    pub fn validate(&self) -> Result<()> {
        if self.image_size == 0 {
            return Err(DroneWatchError::Config(
                "image_size must be greater than 0".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(DroneWatchError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.epochs == 0 {
            return Err(DroneWatchError::Config(
                "epochs must be greater than 0".to_string(),
            ));
        }
        if self.patience == 0 {
            return Err(DroneWatchError::Config(
                "patience must be greater than 0".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(DroneWatchError::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if let Some(lr) = self.learning_rate {
            if lr <= 0.0 {
                return Err(DroneWatchError::Config(format!(
                    "learning_rate must be positive, got {}",
                    lr
                )));
            }
        }
        if self.classes.negative == self.classes.positive {
            return Err(DroneWatchError::Config(
                "negative and positive class names must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Load a config from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| DroneWatchError::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save the config to a JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| DroneWatchError::Serialization(e.to_string()))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TrialConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.epochs, 10);
        assert_eq!(config.patience, 3);
        assert!((config.dropout - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_variant_learning_rates() {
        assert!((DatasetVariant::Real.default_learning_rate() - 1e-5).abs() < 1e-12);
        assert!((DatasetVariant::Synthetic.default_learning_rate() - 1e-3).abs() < 1e-12);
        assert!((DatasetVariant::Hybrid.default_learning_rate() - 1e-3).abs() < 1e-12);
    }

    #[test]
    fn test_learning_rate_override() {
        let mut config = TrialConfig::new("data/real", DatasetVariant::Real);
        assert!((config.learning_rate() - 1e-5).abs() < 1e-12);

        config.learning_rate = Some(5e-4);
        assert!((config.learning_rate() - 5e-4).abs() < 1e-12);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = TrialConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = TrialConfig::default();
        config.dropout = 1.0;
        assert!(config.validate().is_err());

        let mut config = TrialConfig::default();
        config.classes.positive = config.classes.negative.clone();
        assert!(config.validate().is_err());

        let mut config = TrialConfig::default();
        config.learning_rate = Some(-1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trial.json");

        let mut config = TrialConfig::new("data/hybrid", DatasetVariant::Hybrid);
        config.seed = 7;
        config.save(&path).unwrap();

        let loaded = TrialConfig::load(&path).unwrap();
        assert_eq!(loaded.variant, DatasetVariant::Hybrid);
        assert_eq!(loaded.seed, 7);
        assert_eq!(loaded.classes, ClassConfig::default());
    }

    #[test]
    fn test_class_names_in_label_order() {
        let classes = ClassConfig::default();
        assert_eq!(classes.names(), ["not_drone", "drone"]);
    }
}

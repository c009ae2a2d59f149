//! DroneWatch CLI
//!
//! Entry point for the drone classification trial runner: prepare frame
//! dumps into dataset classes, train a trial on one dataset variant,
//! inspect dataset statistics, or run inference with a trained head.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use dronewatch::backend::{backend_name, default_device, TrainingBackend};
use dronewatch::config::{DatasetVariant, TrialConfig};
use dronewatch::dataset::loader::DatasetSplits;
use dronewatch::dataset::prepare::{extract_frames, PrepareConfig};
use dronewatch::model::classifier::build_classifier;
use dronewatch::training::trial::run_trial;
use dronewatch::utils::logging::{init_logging, LogConfig};
use dronewatch::Predictor;

/// Drone / not-drone classification trials with a frozen ResNet-50 backbone
#[derive(Parser, Debug)]
#[command(name = "dronewatch")]
#[command(version = dronewatch::VERSION)]
#[command(about = "Binary drone classification trials with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, default_value = "false")]
    quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a full training trial on one dataset variant
    Train {
        /// Load the full trial configuration from a JSON file
        /// (other flags are ignored when set)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Dataset root containing train/, val/ and test/ splits
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,

        /// Dataset variant, selects the default learning rate
        #[arg(long, value_enum, default_value = "real")]
        variant: DatasetVariant,

        /// Number of training epochs
        #[arg(short, long, default_value = "10")]
        epochs: usize,

        /// Batch size for training and evaluation
        #[arg(short, long, default_value = "32")]
        batch_size: usize,

        /// Early stopping patience in epochs
        #[arg(long, default_value = "3")]
        patience: usize,

        /// Learning rate override (defaults to the variant rate)
        #[arg(short, long)]
        learning_rate: Option<f64>,

        /// Dropout probability for the classification head
        #[arg(long, default_value = "0.4")]
        dropout: f64,

        /// Input image size (pixels per side)
        #[arg(long, default_value = "224")]
        image_size: usize,

        /// Random seed for reproducibility
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Path to pretrained backbone weights (burn record)
        #[arg(long)]
        pretrained_weights: Option<PathBuf>,

        /// Output directory for checkpoints and results
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
    },

    /// Show per-split dataset statistics
    Stats {
        /// Dataset root containing train/, val/ and test/ splits
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,
    },

    /// Sample every Nth frame image into a dataset class directory
    Prepare {
        /// Directory of decoded video frames, enumerated in sorted order
        #[arg(short, long)]
        input: PathBuf,

        /// Output class directory for the sampled frames
        #[arg(short, long)]
        output: PathBuf,

        /// Keep every Nth frame
        #[arg(short, long, default_value = "30")]
        sample_rate: usize,

        /// Output image size (pixels per side)
        #[arg(long, default_value = "224")]
        image_size: usize,
    },

    /// Run inference on an image or a directory of images
    Infer {
        /// Path to input image or directory
        #[arg(short, long)]
        input: PathBuf,

        /// Path to the trained head checkpoint
        #[arg(short, long)]
        model: PathBuf,

        /// Path to pretrained backbone weights (burn record)
        #[arg(long)]
        pretrained_weights: Option<PathBuf>,

        /// Input image size (pixels per side)
        #[arg(long, default_value = "224")]
        image_size: usize,

        /// Decision threshold on the sigmoid output
        #[arg(short, long, default_value = "0.5")]
        threshold: f32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Train {
            config,
            data_dir,
            variant,
            epochs,
            batch_size,
            patience,
            learning_rate,
            dropout,
            image_size,
            seed,
            pretrained_weights,
            output_dir,
        } => {
            let trial_config = match config {
                Some(path) => TrialConfig::load(path)?,
                None => {
                    let mut c = TrialConfig::new(data_dir, variant);
                    c.epochs = epochs;
                    c.batch_size = batch_size;
                    c.patience = patience;
                    c.learning_rate = learning_rate;
                    c.dropout = dropout;
                    c.image_size = image_size;
                    c.seed = seed;
                    c.pretrained_weights = pretrained_weights;
                    c.output_dir = output_dir;
                    c
                }
            };
            cmd_train(trial_config)?;
        }

        Commands::Stats { data_dir } => {
            cmd_stats(&data_dir)?;
        }

        Commands::Prepare {
            input,
            output,
            sample_rate,
            image_size,
        } => {
            cmd_prepare(&input, &output, sample_rate, image_size)?;
        }

        Commands::Infer {
            input,
            model,
            pretrained_weights,
            image_size,
            threshold,
        } => {
            cmd_infer(
                &input,
                &model,
                pretrained_weights.as_deref(),
                image_size,
                threshold,
            )?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔═══════════════════════════════════════════════════════╗
 ║   DroneWatch — drone classification trials            ║
 ║   Frozen ResNet-50 + trainable head, built on Burn    ║
 ╚═══════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn cmd_train(config: TrialConfig) -> Result<()> {
    println!("{}", "Trial Configuration:".cyan().bold());
    println!("  Data directory: {}", config.data_dir.display());
    println!("  Variant:        {}", config.variant);
    println!("  Learning rate:  {}", config.learning_rate());
    println!("  Epochs:         {}", config.epochs);
    println!("  Batch size:     {}", config.batch_size);
    println!("  Patience:       {}", config.patience);
    println!("  Image size:     {}", config.image_size);
    println!("  Seed:           {}", config.seed);
    println!("  Backend:        {}", backend_name());
    println!();

    let result = run_trial::<TrainingBackend>(&config)?;

    let class_names = config.classes.clone();
    let names = class_names.names();

    println!("{}", result.metrics.display());
    println!(
        "{}",
        result.metrics.confusion_matrix.display(Some(names.as_slice()))
    );

    println!(
        "Trial finished in {}",
        dronewatch::utils::format_duration(result.wall_time_seconds)
    );

    if result.stopped_early {
        println!(
            "{} stopped early, best epoch was {}",
            "Note:".yellow(),
            result.best_epoch + 1
        );
    }

    let csv_path = config.output_dir.join("confusion_matrix.csv");
    result.metrics.confusion_matrix.save_csv(&csv_path)?;
    println!("Confusion matrix saved to {}", csv_path.display());

    Ok(())
}

fn cmd_stats(data_dir: &Path) -> Result<()> {
    info!("computing dataset statistics for {:?}", data_dir);

    if !data_dir.exists() {
        println!(
            "{} dataset directory not found: {}",
            "Error:".red(),
            data_dir.display()
        );
        return Ok(());
    }

    // Variant only affects the learning rate, not the statistics
    let config = TrialConfig::new(data_dir, DatasetVariant::Real);
    let splits = DatasetSplits::load(&config)?;
    splits.print_stats();

    Ok(())
}

fn cmd_prepare(input: &Path, output: &Path, sample_rate: usize, image_size: usize) -> Result<()> {
    println!("{}", "Preparation Configuration:".cyan().bold());
    println!("  Input:       {}", input.display());
    println!("  Output:      {}", output.display());
    println!("  Sample rate: every {} frames", sample_rate);
    println!("  Image size:  {}", image_size);
    println!();

    let config = PrepareConfig {
        sample_rate,
        image_size,
    };
    let stats = extract_frames(input, output, &config)?;

    println!(
        "{} kept {} of {} frames in {}",
        "Done:".green(),
        stats.written,
        stats.scanned,
        output.display()
    );

    Ok(())
}

fn cmd_infer(
    input: &Path,
    model_path: &Path,
    pretrained_weights: Option<&Path>,
    image_size: usize,
    threshold: f32,
) -> Result<()> {
    println!("{}", "Inference Configuration:".cyan().bold());
    println!("  Input:   {}", input.display());
    println!("  Model:   {}", model_path.display());
    println!("  Backend: {}", backend_name());
    println!();

    if !input.exists() {
        println!(
            "{} input path not found: {}",
            "Error:".red(),
            input.display()
        );
        return Ok(());
    }

    let device = default_device();
    let mut model =
        build_classifier::<TrainingBackend>(0.0, pretrained_weights, &device)?;
    model.load_head(model_path, &device)?;

    let classes = dronewatch::config::ClassConfig::default();
    let predictor = Predictor::new(
        model,
        [classes.negative.clone(), classes.positive.clone()],
        image_size,
        1,
        device,
    )
    .with_threshold(threshold);

    let files: Vec<PathBuf> = if input.is_dir() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(input)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| {
                        ["jpg", "jpeg", "png", "bmp"].contains(&e.to_lowercase().as_str())
                    })
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        files
    } else {
        vec![input.to_path_buf()]
    };

    if files.is_empty() {
        println!("{} no images found in {}", "Error:".red(), input.display());
        return Ok(());
    }

    for file in &files {
        let prediction = predictor.predict_image(file)?;
        let label = if prediction.label == 1 {
            prediction.class_name.green()
        } else {
            prediction.class_name.yellow()
        };
        println!(
            "  {:40} {} ({:.1}%)",
            file.file_name().unwrap_or_default().to_string_lossy(),
            label,
            prediction.probability * 100.0
        );
    }

    Ok(())
}

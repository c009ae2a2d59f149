//! Dataset Preparation Module
//!
//! Turns a directory of sequentially numbered frame images (as produced by
//! an external video-to-frames dump) into dataset-ready class samples:
//! every Nth frame is kept, resized to the target size, and written as a
//! numbered PNG into the output class directory. Video decoding itself is
//! outside this crate; the input is already-decoded frames.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use tracing::info;
use walkdir::WalkDir;

use crate::dataset::loader::IMAGE_EXTENSIONS;
use crate::utils::error::{DroneWatchError, Result};
use crate::IMAGE_SIZE;

/// Configuration for frame sampling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareConfig {
    /// Keep every Nth frame
    pub sample_rate: usize,
    /// Output image size (pixels per side)
    pub image_size: usize,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            sample_rate: 30,
            image_size: IMAGE_SIZE,
        }
    }
}

/// Statistics about a preparation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareStats {
    /// Frames found in the source directory
    pub scanned: usize,
    /// Frames written to the output directory
    pub written: usize,
}

/// Sample frames from a source directory into dataset-ready PNGs
///
/// Source frames are enumerated in sorted order so the sampling is
/// deterministic. Output files are named `frame_00000.png`,
/// `frame_00001.png`, ... regardless of the source names.
pub fn extract_frames(
    source_dir: &Path,
    output_dir: &Path,
    config: &PrepareConfig,
) -> Result<PrepareStats> {
    if config.sample_rate == 0 {
        return Err(DroneWatchError::Config(
            "sample_rate must be greater than 0".to_string(),
        ));
    }
    if config.image_size == 0 {
        return Err(DroneWatchError::Config(
            "image_size must be greater than 0".to_string(),
        ));
    }
    if !source_dir.is_dir() {
        return Err(DroneWatchError::PathNotFound(source_dir.to_path_buf()));
    }

    let mut frames: Vec<PathBuf> = WalkDir::new(source_dir)
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
    frames.sort();

    if frames.is_empty() {
        return Err(DroneWatchError::Dataset(format!(
            "no frame images found in {:?}",
            source_dir
        )));
    }

    std::fs::create_dir_all(output_dir)?;

    let mut written = 0usize;
    for (index, path) in frames.iter().enumerate() {
        if index % config.sample_rate != 0 {
            continue;
        }

        let img = image::open(path)
            .map_err(|e| DroneWatchError::ImageLoadError(path.clone(), e.to_string()))?
            .resize_exact(
                config.image_size as u32,
                config.image_size as u32,
                FilterType::Triangle,
            );

        let out_path = output_dir.join(format!("frame_{:05}.png", written));
        img.save(&out_path)
            .map_err(|e| DroneWatchError::ImageLoadError(out_path.clone(), e.to_string()))?;
        written += 1;
    }

    let stats = PrepareStats {
        scanned: frames.len(),
        written,
    };

    info!(
        "prepared {} of {} frames from {:?} into {:?}",
        stats.written, stats.scanned, source_dir, output_dir
    );

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_frames(dir: &Path, count: usize, size: u32) {
        for i in 0..count {
            let mut img = RgbImage::new(size, size);
            for pixel in img.pixels_mut() {
                *pixel = Rgb([(i * 10) as u8, 100, 50]);
            }
            img.save(dir.join(format!("dump_{:03}.png", i))).unwrap();
        }
    }

    #[test]
    fn test_extract_frames_samples_every_nth() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_frames(src.path(), 10, 16);

        let config = PrepareConfig {
            sample_rate: 3,
            image_size: 8,
        };
        let stats = extract_frames(src.path(), out.path(), &config).unwrap();

        // Frames 0, 3, 6, 9 of 10
        assert_eq!(stats.scanned, 10);
        assert_eq!(stats.written, 4);

        for i in 0..4 {
            let path = out.path().join(format!("frame_{:05}.png", i));
            assert!(path.exists());
            let img = image::open(&path).unwrap();
            assert_eq!((img.width(), img.height()), (8, 8));
        }
        assert!(!out.path().join("frame_00004.png").exists());
    }

    #[test]
    fn test_extract_frames_keeps_all_at_rate_one() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_frames(src.path(), 5, 16);

        let config = PrepareConfig {
            sample_rate: 1,
            image_size: 16,
        };
        let stats = extract_frames(src.path(), out.path(), &config).unwrap();
        assert_eq!(stats.written, 5);
    }

    #[test]
    fn test_extract_frames_rejects_zero_sample_rate() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();

        let config = PrepareConfig {
            sample_rate: 0,
            image_size: 16,
        };
        let err = extract_frames(src.path(), out.path(), &config).unwrap_err();
        assert!(matches!(err, DroneWatchError::Config(_)));
    }

    #[test]
    fn test_extract_frames_missing_source() {
        let out = tempfile::tempdir().unwrap();

        let err = extract_frames(
            Path::new("/nonexistent/frames"),
            out.path(),
            &PrepareConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DroneWatchError::PathNotFound(_)));
    }

    #[test]
    fn test_extract_frames_empty_source() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();

        let err = extract_frames(src.path(), out.path(), &PrepareConfig::default()).unwrap_err();
        assert!(matches!(err, DroneWatchError::Dataset(_)));
    }
}

//! Data Augmentation Module
//!
//! Provides on-the-fly image augmentations for training batches. Each
//! transform is applied with bounded magnitude so the label is preserved.
//!
//! # Augmentation Strategy
//!
//! - **Training**: random flips, rotation, zoom, contrast, brightness
//! - **Validation/Test/Inference**: no augmentations (clean evaluation)

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageBuffer, Rgb, RgbImage};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Configuration for data augmentation
#[derive(Clone, Debug)]
pub struct AugmentationConfig {
    /// Probability of applying horizontal flip (0.0 - 1.0)
    pub horizontal_flip_prob: f32,
    /// Probability of applying vertical flip (0.0 - 1.0)
    pub vertical_flip_prob: f32,
    /// Maximum rotation angle in degrees (applies ±rotation_degrees)
    pub rotation_degrees: f32,
    /// Probability of applying rotation
    pub rotation_prob: f32,
    /// Zoom factor range (1.0 ± zoom_delta)
    pub zoom_delta: f32,
    /// Probability of applying zoom
    pub zoom_prob: f32,
    /// Brightness adjustment range (±brightness_delta)
    pub brightness_delta: f32,
    /// Probability of applying brightness adjustment
    pub brightness_prob: f32,
    /// Contrast adjustment range (1.0 ± contrast_delta)
    pub contrast_delta: f32,
    /// Probability of applying contrast adjustment
    pub contrast_prob: f32,
}

impl Default for AugmentationConfig {
    /// Defaults match the trial recipe: flips, rotation of ±0.2 turns (72°),
    /// ±20% zoom, ±20% contrast, ±20% brightness.
    fn default() -> Self {
        Self {
            horizontal_flip_prob: 0.5,
            vertical_flip_prob: 0.5,
            rotation_degrees: 72.0,
            rotation_prob: 0.5,
            zoom_delta: 0.2,
            zoom_prob: 0.5,
            brightness_delta: 0.2,
            brightness_prob: 0.5,
            contrast_delta: 0.2,
            contrast_prob: 0.5,
        }
    }
}

impl AugmentationConfig {
    /// Disable all augmentations (for validation/inference)
    pub fn none() -> Self {
        Self {
            horizontal_flip_prob: 0.0,
            vertical_flip_prob: 0.0,
            rotation_degrees: 0.0,
            rotation_prob: 0.0,
            zoom_delta: 0.0,
            zoom_prob: 0.0,
            brightness_delta: 0.0,
            brightness_prob: 0.0,
            contrast_delta: 0.0,
            contrast_prob: 0.0,
        }
    }
}

/// Image augmenter that applies random transformations
#[derive(Clone)]
pub struct Augmenter {
    config: AugmentationConfig,
    image_size: u32,
}

impl Augmenter {
    /// Create a new augmenter with the given configuration
    pub fn new(config: AugmentationConfig, image_size: u32) -> Self {
        Self { config, image_size }
    }

    /// Create an augmenter with the default training augmentations
    pub fn with_defaults(image_size: u32) -> Self {
        Self::new(AugmentationConfig::default(), image_size)
    }

    /// Create an augmenter with no augmentation (for validation/inference)
    pub fn no_augmentation(image_size: u32) -> Self {
        Self::new(AugmentationConfig::none(), image_size)
    }

    /// Apply all configured augmentations randomly to an image
    pub fn augment(&self, img: DynamicImage, rng: &mut ChaCha8Rng) -> DynamicImage {
        let mut result = img;

        if rng.gen::<f32>() < self.config.horizontal_flip_prob {
            result = result.fliph();
        }

        if rng.gen::<f32>() < self.config.vertical_flip_prob {
            result = result.flipv();
        }

        if self.config.rotation_prob > 0.0 && rng.gen::<f32>() < self.config.rotation_prob {
            let angle =
                rng.gen_range(-self.config.rotation_degrees..=self.config.rotation_degrees);
            result = self.rotate(&result, angle);
        }

        if self.config.zoom_prob > 0.0 && rng.gen::<f32>() < self.config.zoom_prob {
            let factor = 1.0 + rng.gen_range(-self.config.zoom_delta..=self.config.zoom_delta);
            result = self.zoom(&result, factor);
        }

        if self.config.brightness_prob > 0.0 && rng.gen::<f32>() < self.config.brightness_prob {
            let delta =
                rng.gen_range(-self.config.brightness_delta..=self.config.brightness_delta);
            result = self.adjust_brightness(&result, delta);
        }

        if self.config.contrast_prob > 0.0 && rng.gen::<f32>() < self.config.contrast_prob {
            let factor =
                1.0 + rng.gen_range(-self.config.contrast_delta..=self.config.contrast_delta);
            result = self.adjust_contrast(&result, factor);
        }

        result
    }

    /// Rotate image by the given angle in degrees
    fn rotate(&self, img: &DynamicImage, angle_degrees: f32) -> DynamicImage {
        if angle_degrees.abs() < 0.1 {
            return img.clone();
        }

        let angle_rad = angle_degrees.to_radians();
        let (width, height) = img.dimensions();
        let rgb = img.to_rgb8();

        let cx = width as f32 / 2.0;
        let cy = height as f32 / 2.0;

        let cos_a = angle_rad.cos();
        let sin_a = angle_rad.sin();

        let mut output = ImageBuffer::new(width, height);

        for y in 0..height {
            for x in 0..width {
                // Rotate around center
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;

                let src_x = cx + dx * cos_a + dy * sin_a;
                let src_y = cy - dx * sin_a + dy * cos_a;

                let pixel = self.bilinear_sample(&rgb, src_x, src_y);
                output.put_pixel(x, y, pixel);
            }
        }

        DynamicImage::ImageRgb8(output)
    }

    /// Sample a pixel using bilinear interpolation
    fn bilinear_sample(&self, img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
        let (width, height) = img.dimensions();

        if x < 0.0 || y < 0.0 || x >= width as f32 - 1.0 || y >= height as f32 - 1.0 {
            // Black fill for out-of-bounds samples
            return Rgb([0, 0, 0]);
        }

        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(width - 1);
        let y1 = (y0 + 1).min(height - 1);

        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let p00 = img.get_pixel(x0, y0);
        let p10 = img.get_pixel(x1, y0);
        let p01 = img.get_pixel(x0, y1);
        let p11 = img.get_pixel(x1, y1);

        let mut result = [0u8; 3];
        for c in 0..3 {
            let v00 = p00[c] as f32;
            let v10 = p10[c] as f32;
            let v01 = p01[c] as f32;
            let v11 = p11[c] as f32;

            let v = v00 * (1.0 - fx) * (1.0 - fy)
                + v10 * fx * (1.0 - fy)
                + v01 * (1.0 - fx) * fy
                + v11 * fx * fy;

            result[c] = v.round().clamp(0.0, 255.0) as u8;
        }

        Rgb(result)
    }

    /// Zoom in (factor > 1) or out (factor < 1), preserving image dimensions
    fn zoom(&self, img: &DynamicImage, factor: f32) -> DynamicImage {
        let (width, height) = img.dimensions();

        if (factor - 1.0).abs() < 1e-3 || width < 2 || height < 2 {
            return img.clone();
        }

        if factor > 1.0 {
            // Zoom in: center crop then scale back up
            let crop_w = ((width as f32 / factor).round() as u32).clamp(1, width);
            let crop_h = ((height as f32 / factor).round() as u32).clamp(1, height);
            let x = (width - crop_w) / 2;
            let y = (height - crop_h) / 2;

            img.crop_imm(x, y, crop_w, crop_h)
                .resize_exact(width, height, FilterType::Triangle)
        } else {
            // Zoom out: shrink and paste centered on a black canvas
            let new_w = ((width as f32 * factor).round() as u32).max(1);
            let new_h = ((height as f32 * factor).round() as u32).max(1);
            let shrunk = img
                .resize_exact(new_w, new_h, FilterType::Triangle)
                .to_rgb8();

            let mut canvas = RgbImage::new(width, height);
            let x0 = (width - new_w) / 2;
            let y0 = (height - new_h) / 2;
            for (x, y, pixel) in shrunk.enumerate_pixels() {
                canvas.put_pixel(x0 + x, y0 + y, *pixel);
            }

            DynamicImage::ImageRgb8(canvas)
        }
    }

    /// Adjust brightness by adding delta to all pixels
    fn adjust_brightness(&self, img: &DynamicImage, delta: f32) -> DynamicImage {
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        let delta_u8 = (delta * 255.0) as i32;

        let mut output = ImageBuffer::new(width, height);

        for (x, y, pixel) in rgb.enumerate_pixels() {
            let r = (pixel[0] as i32 + delta_u8).clamp(0, 255) as u8;
            let g = (pixel[1] as i32 + delta_u8).clamp(0, 255) as u8;
            let b = (pixel[2] as i32 + delta_u8).clamp(0, 255) as u8;
            output.put_pixel(x, y, Rgb([r, g, b]));
        }

        DynamicImage::ImageRgb8(output)
    }

    /// Adjust contrast by scaling pixel values around the mean luminance
    fn adjust_contrast(&self, img: &DynamicImage, factor: f32) -> DynamicImage {
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();

        let mut sum = 0.0f64;
        let count = (width * height) as f64;
        for pixel in rgb.pixels() {
            let lum = 0.299 * pixel[0] as f64 + 0.587 * pixel[1] as f64 + 0.114 * pixel[2] as f64;
            sum += lum;
        }
        let mean = (sum / count) as f32;

        let mut output = ImageBuffer::new(width, height);

        for (x, y, pixel) in rgb.enumerate_pixels() {
            let r = (mean + factor * (pixel[0] as f32 - mean)).clamp(0.0, 255.0) as u8;
            let g = (mean + factor * (pixel[1] as f32 - mean)).clamp(0.0, 255.0) as u8;
            let b = (mean + factor * (pixel[2] as f32 - mean)).clamp(0.0, 255.0) as u8;
            output.put_pixel(x, y, Rgb([r, g, b]));
        }

        DynamicImage::ImageRgb8(output)
    }

    /// Resize image to target size (always applied, not random)
    pub fn resize(&self, img: DynamicImage) -> DynamicImage {
        img.resize_exact(self.image_size, self.image_size, FilterType::Triangle)
    }

    /// Convert image to CHW float tensor data normalized to [0, 1]
    pub fn to_tensor_data(&self, img: &DynamicImage) -> Vec<f32> {
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        let mut data = Vec::with_capacity(3 * height as usize * width as usize);

        for c in 0..3 {
            for y in 0..height {
                for x in 0..width {
                    let pixel = rgb.get_pixel(x, y);
                    data.push(pixel[c] as f32 / 255.0);
                }
            }
        }

        data
    }

    /// Full preprocessing pipeline: augment (optional), resize, convert to tensor
    pub fn preprocess(&self, img: DynamicImage, rng: Option<&mut ChaCha8Rng>) -> Vec<f32> {
        let mut result = img;

        if let Some(rng) = rng {
            result = self.augment(result, rng);
        }

        result = self.resize(result);

        self.to_tensor_data(&result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn create_test_image() -> DynamicImage {
        let mut img = ImageBuffer::new(64, 64);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = Rgb([(x * 4) as u8, (y * 4) as u8, 128]);
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_augmenter_creation() {
        let aug = Augmenter::with_defaults(128);
        assert_eq!(aug.image_size, 128);
        assert_eq!(aug.config.rotation_degrees, 72.0);
    }

    #[test]
    fn test_no_augmentation() {
        let aug = Augmenter::no_augmentation(128);
        assert_eq!(aug.config.horizontal_flip_prob, 0.0);
        assert_eq!(aug.config.zoom_prob, 0.0);
    }

    #[test]
    fn test_augment_produces_valid_image() {
        let aug = Augmenter::with_defaults(64);
        let img = create_test_image();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let result = aug.augment(img, &mut rng);
        let (w, h) = result.dimensions();

        assert_eq!(w, 64);
        assert_eq!(h, 64);
    }

    #[test]
    fn test_zoom_preserves_dimensions() {
        let aug = Augmenter::with_defaults(64);
        let img = create_test_image();

        let zoomed_in = aug.zoom(&img, 1.2);
        let zoomed_out = aug.zoom(&img, 0.8);

        assert_eq!(zoomed_in.dimensions(), (64, 64));
        assert_eq!(zoomed_out.dimensions(), (64, 64));

        // Zoom out leaves black border pixels at the corners
        let corner = zoomed_out.to_rgb8().get_pixel(0, 0).0;
        assert_eq!(corner, [0, 0, 0]);
    }

    #[test]
    fn test_resize() {
        let aug = Augmenter::with_defaults(32);
        let img = create_test_image();

        let result = aug.resize(img);
        assert_eq!(result.dimensions(), (32, 32));
    }

    #[test]
    fn test_to_tensor_data() {
        let aug = Augmenter::with_defaults(64);
        let img = create_test_image();

        let data = aug.to_tensor_data(&img);

        // CHW format: 3 * 64 * 64
        assert_eq!(data.len(), 3 * 64 * 64);

        for val in &data {
            assert!(*val >= 0.0 && *val <= 1.0);
        }
    }

    #[test]
    fn test_preprocess_with_augmentation() {
        let aug = Augmenter::with_defaults(32);
        let img = create_test_image();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let data = aug.preprocess(img, Some(&mut rng));
        assert_eq!(data.len(), 3 * 32 * 32);
    }

    #[test]
    fn test_preprocess_without_augmentation() {
        let aug = Augmenter::no_augmentation(32);
        let img = create_test_image();

        let data = aug.preprocess(img, None);
        assert_eq!(data.len(), 3 * 32 * 32);
    }

    #[test]
    fn test_brightness_adjustment() {
        let aug = Augmenter::with_defaults(64);
        let img = create_test_image();

        let brighter = aug.adjust_brightness(&img, 0.2);
        let darker = aug.adjust_brightness(&img, -0.2);

        let orig_pixel = img.to_rgb8().get_pixel(32, 32).0;
        let bright_pixel = brighter.to_rgb8().get_pixel(32, 32).0;
        let dark_pixel = darker.to_rgb8().get_pixel(32, 32).0;

        assert!(bright_pixel[0] >= orig_pixel[0] || orig_pixel[0] > 200);
        assert!(dark_pixel[0] <= orig_pixel[0] || orig_pixel[0] < 50);
    }

    #[test]
    fn test_seeded_augmentation_is_reproducible() {
        let aug = Augmenter::with_defaults(32);

        let mut rng_a = ChaCha8Rng::seed_from_u64(9);
        let mut rng_b = ChaCha8Rng::seed_from_u64(9);

        let a = aug.preprocess(create_test_image(), Some(&mut rng_a));
        let b = aug.preprocess(create_test_image(), Some(&mut rng_b));

        assert_eq!(a, b);
    }
}

//! # Classification Image Transforms
//!
//! The standard `ImageNet` evaluation transform:
//!
//! ```text
//! resize short side -> 256 (triangle filter)
//! center crop       -> 224x224
//! to CHW f32 in [0, 1], then (x - mean) / std per channel
//! ```

use anyhow::bail;
use burn::config::Config;
use burn::tensor::TensorData;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage};

/// `ImageNet` per-channel RGB mean.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// `ImageNet` per-channel RGB standard deviation.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Classification transform config.
#[derive(Config, Debug)]
pub struct ClassificationTransformConfig {
    /// Target length of the shorter image side.
    #[config(default = "256")]
    pub resize_short: u32,

    /// Center crop size.
    #[config(default = "224")]
    pub crop: u32,

    /// Per-channel mean.
    #[config(default = "IMAGENET_MEAN")]
    pub mean: [f32; 3],

    /// Per-channel standard deviation.
    #[config(default = "IMAGENET_STD")]
    pub std: [f32; 3],
}

impl Default for ClassificationTransformConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassificationTransformConfig {
    /// Number of f32 values produced per image.
    pub fn item_len(&self) -> usize {
        3 * (self.crop as usize) * (self.crop as usize)
    }

    /// Apply the transform.
    ///
    /// # Returns
    ///
    /// Normalized ``[3, crop, crop]`` f32 values, in CHW order.
    pub fn apply_to_vec(
        &self,
        image: &DynamicImage,
    ) -> anyhow::Result<Vec<f32>> {
        if self.resize_short < self.crop {
            bail!(
                "resize_short ({}) must be >= crop ({})",
                self.resize_short,
                self.crop
            );
        }
        let resized = resize_short_side(image, self.resize_short)?;
        let cropped = center_crop(&resized, self.crop)?;
        Ok(normalize_chw(&cropped.to_rgb8(), self.mean, self.std))
    }

    /// Apply the transform.
    ///
    /// # Returns
    ///
    /// A ``[3, crop, crop]`` f32 [`TensorData`].
    pub fn apply(
        &self,
        image: &DynamicImage,
    ) -> anyhow::Result<TensorData> {
        let crop = self.crop as usize;
        Ok(TensorData::new(self.apply_to_vec(image)?, [3, crop, crop]))
    }
}

/// Resize an image so that its shorter side is `short`, keeping the aspect ratio.
pub fn resize_short_side(
    image: &DynamicImage,
    short: u32,
) -> anyhow::Result<DynamicImage> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || short == 0 {
        bail!("Cannot resize {width}x{height} image to short side {short}");
    }

    let scale = |long: u32, short_in: u32| -> u32 {
        ((long as f64) * (short as f64) / (short_in as f64)).round() as u32
    };
    let (new_width, new_height) = if width <= height {
        (short, scale(height, width))
    } else {
        (scale(width, height), short)
    };

    Ok(image.resize_exact(new_width, new_height, FilterType::Triangle))
}

/// Crop the centered ``size x size`` region of an image.
pub fn center_crop(
    image: &DynamicImage,
    size: u32,
) -> anyhow::Result<DynamicImage> {
    let (width, height) = image.dimensions();
    if width < size || height < size {
        bail!("Cannot center crop {width}x{height} image to {size}x{size}");
    }
    let x = (width - size) / 2;
    let y = (height - size) / 2;
    Ok(image.crop_imm(x, y, size, size))
}

/// Convert an RGB image to normalized CHW f32 values.
///
/// ``out[c, y, x] = (pixel[y, x][c] / 255 - mean[c]) / std[c]``
pub fn normalize_chw(
    image: &RgbImage,
    mean: [f32; 3],
    std: [f32; 3],
) -> Vec<f32> {
    let (width, height) = image.dimensions();
    let plane = (width * height) as usize;
    let mut out = vec![0.0; 3 * plane];

    for (x, y, pixel) in image.enumerate_pixels() {
        let offset = (y * width + x) as usize;
        for c in 0..3 {
            out[c * plane + offset] = (pixel[c] as f32 / 255.0 - mean[c]) / std[c];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_resize_short_side() {
        let image = DynamicImage::new_rgb8(400, 300);
        let resized = resize_short_side(&image, 256).unwrap();
        assert_eq!(resized.dimensions(), (341, 256));

        let image = DynamicImage::new_rgb8(100, 200);
        let resized = resize_short_side(&image, 50).unwrap();
        assert_eq!(resized.dimensions(), (50, 100));

        assert!(resize_short_side(&DynamicImage::new_rgb8(0, 10), 8).is_err());
    }

    #[test]
    fn test_center_crop() {
        let mut rgb = RgbImage::new(5, 3);
        rgb.put_pixel(2, 1, Rgb([9, 9, 9]));
        let image = DynamicImage::ImageRgb8(rgb);

        let cropped = center_crop(&image, 3).unwrap();
        assert_eq!(cropped.dimensions(), (3, 3));
        assert_eq!(cropped.to_rgb8().get_pixel(1, 1), &Rgb([9, 9, 9]));

        assert!(center_crop(&image, 4).is_err());
    }

    #[test]
    fn test_normalize_chw() {
        let mut rgb = RgbImage::new(2, 1);
        rgb.put_pixel(0, 0, Rgb([255, 0, 0]));
        rgb.put_pixel(1, 0, Rgb([0, 255, 0]));

        let out = normalize_chw(&rgb, [0.0; 3], [1.0; 3]);
        assert_eq!(out, vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

        let out = normalize_chw(&rgb, [0.5; 3], [0.5; 3]);
        assert_eq!(out, vec![1.0, -1.0, -1.0, 1.0, -1.0, -1.0]);
    }

    #[test]
    fn test_apply() {
        let config = ClassificationTransformConfig::new()
            .with_resize_short(16)
            .with_crop(8);
        assert_eq!(config.item_len(), 192);

        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 20, Rgb([124, 116, 104])));
        let data = config.apply(&image).unwrap();
        assert_eq!(data.shape, vec![3, 8, 8]);

        let values = data.to_vec::<f32>().unwrap();
        for (c, chunk) in values.chunks(64).enumerate() {
            let expected = ([124.0, 116.0, 104.0][c] / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            assert!(chunk.iter().all(|v| (v - expected).abs() < 1e-4));
        }
    }

    #[test]
    fn test_apply_rejects_bad_config() {
        let config = ClassificationTransformConfig::new()
            .with_resize_short(8)
            .with_crop(16);
        let image = DynamicImage::new_rgb8(32, 32);
        assert!(config.apply(&image).is_err());
    }
}

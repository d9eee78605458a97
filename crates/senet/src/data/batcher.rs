//! # Classification Batcher
//!
//! Decodes [`ImageNetItem`] paths and stacks them into
//! ``images: [B, 3, crop, crop]`` and ``targets: [B]`` tensors.

use crate::data::imagenet::ImageNetItem;
use crate::data::transforms::ClassificationTransformConfig;
use burn::data::dataloader::batcher::Batcher;
use burn::prelude::{Backend, Int, Tensor};
use burn::tensor::TensorData;

/// A batch of classification samples.
#[derive(Debug, Clone)]
pub struct ClassificationBatch<B: Backend> {
    /// ``[B, 3, crop, crop]`` normalized images.
    pub images: Tensor<B, 4>,

    /// ``[B]`` class labels.
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher for [`ImageNetItem`]s.
#[derive(Debug, Clone, Default)]
pub struct ClassificationBatcher {
    /// The per-image transform.
    pub transform: ClassificationTransformConfig,
}

impl ClassificationBatcher {
    /// Create a new batcher.
    pub fn new(transform: ClassificationTransformConfig) -> Self {
        Self { transform }
    }

    /// Decode and transform one item.
    pub fn load_item(
        &self,
        item: &ImageNetItem,
    ) -> anyhow::Result<Vec<f32>> {
        let image = image::open(&item.path)?;
        self.transform.apply_to_vec(&image)
    }
}

impl<B: Backend> Batcher<B, ImageNetItem, ClassificationBatch<B>> for ClassificationBatcher {
    fn batch(
        &self,
        items: Vec<ImageNetItem>,
        device: &B::Device,
    ) -> ClassificationBatch<B> {
        let crop = self.transform.crop as usize;

        let mut pixels = Vec::with_capacity(items.len() * self.transform.item_len());
        let mut labels = Vec::with_capacity(items.len());
        for item in &items {
            match self.load_item(item) {
                Ok(values) => {
                    pixels.extend(values);
                    labels.push(item.label as i64);
                }
                Err(err) => {
                    tracing::warn!(path = %item.path.display(), %err, "skipping undecodable image");
                }
            }
        }

        let n = labels.len();
        let images = Tensor::from_data(TensorData::new(pixels, [n, 3, crop, crop]), device);
        let targets = Tensor::from_data(TensorData::new(labels, [n]), device);

        ClassificationBatch { images, targets }
    }
}

//! # Classification Data
//!
//! * [`imagenet`] - folder-layout `ImageNet` dataset.
//! * [`transforms`] - resize / crop / normalize image transforms.
//! * [`batcher`] - burn batcher producing image and target tensors.
pub mod batcher;
pub mod imagenet;
pub mod transforms;

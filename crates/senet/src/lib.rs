#![warn(missing_docs)]
//!# senet - Squeeze-and-Excitation Networks for Burn
//!
//! ## Notable Components
//!
//! * [`cache`] - prefab registries, and the pretrained weights disk cache.
//! * [`compat`] - layer abstraction wrappers.
//!   * [`compat::activation_wrapper::Activation`] - activation layer abstraction wrapper.
//!   * [`compat::normalization_wrapper::Normalization`] - norm layer abstraction wrapper.
//! * [`data`] - `ImageNet` classification data loading.
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::blocks`] - ``Conv2d + Norm (+ Act)`` blocks.
//!   * [`layers::squeeze_excitation`] - channel-wise squeeze-and-excitation gate.
//! * [`models`] - complete model families.
//!   * [`models::senet`] - `SENet` / SE-ResNeXt.
//! * [`utility`] - shape, probability, and record helpers.

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

pub mod cache;
pub mod compat;
pub mod data;
pub mod layers;
pub mod models;
pub mod utility;

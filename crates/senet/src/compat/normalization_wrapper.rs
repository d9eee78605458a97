//! # Normalization Wrapper
//!
//! Channel normalization for ``[batch, channels, height, width]`` feature maps:
//! * [`Batch`](NormalizationConfig::Batch) - [`BatchNorm`], the SENet default.
//! * [`Group`](NormalizationConfig::Group) - [`GroupNorm`], for small-batch fine-tuning.
//! * [`Instance`](NormalizationConfig::Instance) - [`InstanceNorm`].
//!
//! ``LayerNorm`` is not offered; it normalizes the trailing (width)
//! axis of an NCHW map, not the channel axis.
//!
//! The configs are "abstract" over the feature count; blocks call
//! [`NormalizationConfig::with_num_features`] to size the norm to
//! the preceding convolution.

use burn::nn::{
    BatchNorm, BatchNormConfig, GroupNorm, GroupNormConfig, InstanceNorm, InstanceNormConfig,
};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`Normalization`] Configuration.
#[derive(Config, Debug)]
#[non_exhaustive]
pub enum NormalizationConfig {
    /// [`BatchNorm`] Configuration.
    Batch(BatchNormConfig),

    /// [`GroupNorm`] Configuration.
    Group(GroupNormConfig),

    /// [`InstanceNorm`] Configuration.
    Instance(InstanceNormConfig),
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self::batch()
    }
}

impl From<BatchNormConfig> for NormalizationConfig {
    fn from(config: BatchNormConfig) -> Self {
        Self::Batch(config)
    }
}

impl From<GroupNormConfig> for NormalizationConfig {
    fn from(config: GroupNormConfig) -> Self {
        Self::Group(config)
    }
}

impl From<InstanceNormConfig> for NormalizationConfig {
    fn from(config: InstanceNormConfig) -> Self {
        Self::Instance(config)
    }
}

impl NormalizationConfig {
    /// An unsized [`BatchNorm`] config.
    ///
    /// The feature count is 0 until matched with
    /// [`NormalizationConfig::with_num_features`].
    pub fn batch() -> Self {
        BatchNormConfig::new(0).into()
    }

    /// Initialize a [`Normalization`] layer.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Normalization<B> {
        match self {
            NormalizationConfig::Batch(config) => config.init(device).into(),
            NormalizationConfig::Group(config) => config.init(device).into(),
            NormalizationConfig::Instance(config) => config.init(device).into(),
        }
    }

    /// Adjust a norm config to the feature size.
    ///
    /// # Panics
    ///
    /// For [`GroupNorm`], if `num_features` is not divisible by the group count.
    pub fn with_num_features(
        self,
        num_features: usize,
    ) -> Self {
        match self {
            NormalizationConfig::Batch(config) => BatchNormConfig {
                num_features,
                ..config
            }
            .into(),
            NormalizationConfig::Group(config) => {
                assert_eq!(
                    num_features % config.num_groups,
                    0,
                    "GroupNorm channels ({num_features}) must be divisible by num_groups ({})",
                    config.num_groups
                );
                GroupNormConfig {
                    num_channels: num_features,
                    ..config
                }
                .into()
            }
            NormalizationConfig::Instance(config) => InstanceNormConfig {
                num_channels: num_features,
                ..config
            }
            .into(),
        }
    }

    /// Get the number of features.
    pub fn num_features(&self) -> usize {
        match self {
            NormalizationConfig::Batch(config) => config.num_features,
            NormalizationConfig::Group(config) => config.num_channels,
            NormalizationConfig::Instance(config) => config.num_channels,
        }
    }
}

/// Normalization Layer Wrapper.
///
/// See [`NormalizationConfig`].
#[derive(Module, Debug)]
#[non_exhaustive]
pub enum Normalization<B: Backend> {
    /// [`BatchNorm`] layer; restricted to `BatchNorm<2>`.
    Batch(BatchNorm<B, 2>),

    /// [`GroupNorm`] layer.
    Group(GroupNorm<B>),

    /// [`InstanceNorm`] layer.
    Instance(InstanceNorm<B>),
}

impl<B: Backend> From<BatchNorm<B, 2>> for Normalization<B> {
    fn from(layer: BatchNorm<B, 2>) -> Self {
        Self::Batch(layer)
    }
}

impl<B: Backend> From<GroupNorm<B>> for Normalization<B> {
    fn from(layer: GroupNorm<B>) -> Self {
        Self::Group(layer)
    }
}

impl<B: Backend> From<InstanceNorm<B>> for Normalization<B> {
    fn from(layer: InstanceNorm<B>) -> Self {
        Self::Instance(layer)
    }
}

impl<B: Backend> Normalization<B> {
    /// Applies normalization to a ``[batch, channels, height, width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        match self {
            Normalization::Batch(norm) => norm.forward(input),
            Normalization::Group(norm) => norm.forward(input),
            Normalization::Instance(norm) => norm.forward(input),
        }
    }

    /// Get the number of features.
    pub fn num_features(&self) -> usize {
        match self {
            Normalization::Batch(norm) => norm.gamma.shape().dims[0],
            Normalization::Group(norm) => norm.num_channels,
            Normalization::Instance(norm) => norm.num_channels,
        }
    }

    /// Zero the affine scale of the norm layer.
    ///
    /// Applied to the last norm of a residual body, this makes the
    /// block start out as (close to) its shortcut path.
    pub fn zero_init_gamma(self) -> Self {
        match self {
            Normalization::Batch(mut norm) => {
                norm.gamma = norm.gamma.map(|g| g.zeros_like());
                Normalization::Batch(norm)
            }
            Normalization::Group(mut norm) => {
                norm.gamma = norm.gamma.map(|p| p.map(|g| g.zeros_like()));
                Normalization::Group(norm)
            }
            Normalization::Instance(mut norm) => {
                norm.gamma = norm.gamma.map(|p| p.map(|g| g.zeros_like()));
                Normalization::Instance(norm)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type B = Autodiff<NdArray<f32>>;

    #[test]
    fn test_with_num_features() {
        let config = NormalizationConfig::batch();
        assert_eq!(config.num_features(), 0);

        let config = config.with_num_features(12);
        assert_eq!(config.num_features(), 12);

        let config: NormalizationConfig = GroupNormConfig::new(4, 8).into();
        assert_eq!(config.with_num_features(16).num_features(), 16);
    }

    #[test]
    #[should_panic(expected = "must be divisible by num_groups")]
    fn test_group_norm_indivisible() {
        let config: NormalizationConfig = GroupNormConfig::new(4, 8).into();
        let _ = config.with_num_features(6);
    }

    #[test]
    fn test_batch_norm() {
        let device = Default::default();

        let num_features = 12;
        let input: Tensor<B, 4> = Tensor::ones([2, num_features, 3, 4], &device);

        let layer: Normalization<B> = NormalizationConfig::batch()
            .with_num_features(num_features)
            .init(&device);
        assert_eq!(layer.num_features(), num_features);

        let expected = match &layer {
            Normalization::Batch(inner) => inner.forward(input.clone()),
            _ => panic!("Unexpected layer type"),
        };

        let output = layer.forward(input);

        output.to_data().assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_group_norm() {
        let device = Default::default();

        let num_features = 12;
        let input: Tensor<B, 4> = Tensor::ones([2, num_features, 3, 4], &device);

        let config: NormalizationConfig = GroupNormConfig::new(3, num_features).into();
        let layer: Normalization<B> = config.init(&device);

        let expected = match &layer {
            Normalization::Group(inner) => inner.forward(input.clone()),
            _ => panic!("Unexpected layer type"),
        };

        let output = layer.forward(input);

        output.to_data().assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_zero_init_gamma() {
        let device = Default::default();

        let layer: Normalization<NdArray<f32>> = NormalizationConfig::batch()
            .with_num_features(4)
            .init(&device)
            .zero_init_gamma();

        let input: Tensor<NdArray<f32>, 4> = Tensor::ones([1, 4, 2, 2], &device);
        let output = layer.forward(input);

        // beta is zero-initialized, so a zero scale yields a zero map.
        output
            .to_data()
            .assert_eq(&Tensor::<NdArray<f32>, 4>::zeros([1, 4, 2, 2], &device).to_data(), true);
    }
}

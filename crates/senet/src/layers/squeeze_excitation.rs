//! # Squeeze-Excitation Channel Gate
//!
//! [`SqueezeExcitation`] rescales each channel of a feature map by a learned,
//! input-dependent gate:
//!
//! ```text
//! w = gate(fc2(act(fc1(mean_hw(x)))))   # [batch, channels]
//! y = x * w[:, :, None, None]
//! ```
//!
//! See "Squeeze-and-Excitation Networks" <https://arxiv.org/abs/1709.01507>.

use crate::compat::activation_wrapper::{Activation, ActivationConfig};
use bimm_contracts::unpack_shape_contract;
use burn::config::Config;
use burn::module::Module;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Linear, LinearConfig};
use burn::prelude::{Backend, Tensor};

/// [`SqueezeExcitation`] Meta.
pub trait SqueezeExcitationMeta {
    /// Number of gated channels; input and output.
    fn channels(&self) -> usize;

    /// Width of the squeezed hidden layer.
    fn reduced_channels(&self) -> usize;
}

/// [`SqueezeExcitation`] Config.
#[derive(Config, Debug)]
pub struct SqueezeExcitationConfig {
    /// Number of gated channels.
    pub channels: usize,

    /// Width of the squeezed hidden layer.
    pub reduced_channels: usize,

    /// Use bias in the squeeze / excite projections.
    #[config(default = "false")]
    pub bias: bool,

    /// Hidden activation.
    #[config(default = "ActivationConfig::Relu")]
    pub act: ActivationConfig,

    /// Gate activation.
    #[config(default = "ActivationConfig::Sigmoid")]
    pub gate: ActivationConfig,
}

impl SqueezeExcitationMeta for SqueezeExcitationConfig {
    fn channels(&self) -> usize {
        self.channels
    }

    fn reduced_channels(&self) -> usize {
        self.reduced_channels
    }
}

impl SqueezeExcitationConfig {
    /// Build a config from a reduction ratio.
    ///
    /// ``reduced_channels = max(1, channels / reduction)``
    pub fn with_reduction_ratio(
        channels: usize,
        reduction: usize,
    ) -> Self {
        assert!(reduction > 0, "SE reduction ratio must be > 0");
        Self::new(channels, (channels / reduction).max(1))
    }

    /// Initialize a [`SqueezeExcitation`] layer.
    ///
    /// # Panics
    ///
    /// If either channel count is zero.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> SqueezeExcitation<B> {
        assert!(
            self.channels > 0 && self.reduced_channels > 0,
            "SE channels must be > 0: channels={}, reduced_channels={}",
            self.channels,
            self.reduced_channels,
        );

        SqueezeExcitation {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1: LinearConfig::new(self.channels, self.reduced_channels)
                .with_bias(self.bias)
                .init(device),
            act: self.act.init(device),
            fc2: LinearConfig::new(self.reduced_channels, self.channels)
                .with_bias(self.bias)
                .init(device),
            gate: self.gate.init(device),
        }
    }
}

/// Squeeze-Excitation channel gate.
#[derive(Module, Debug)]
pub struct SqueezeExcitation<B: Backend> {
    /// Global spatial pool.
    pub pool: AdaptiveAvgPool2d,

    /// Squeeze projection.
    pub fc1: Linear<B>,

    /// Hidden activation.
    pub act: Activation<B>,

    /// Excite projection.
    pub fc2: Linear<B>,

    /// Gate activation.
    pub gate: Activation<B>,
}

impl<B: Backend> SqueezeExcitationMeta for SqueezeExcitation<B> {
    fn channels(&self) -> usize {
        self.fc1.weight.shape().dims[0]
    }

    fn reduced_channels(&self) -> usize {
        self.fc1.weight.shape().dims[1]
    }
}

impl<B: Backend> SqueezeExcitation<B> {
    /// Compute the channel gate weights.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, channels]``
    pub fn channel_weights(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [batch] = unpack_shape_contract!(
            ["batch", "channels", "height", "width"],
            &input,
            &["batch"],
            &[("channels", self.channels())]
        );

        let w = self.pool.forward(input);
        let w = w.reshape([batch, self.channels()]);
        let w = self.fc1.forward(w);
        let w = self.act.forward(w);
        let w = self.fc2.forward(w);
        self.gate.forward(w)
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, channels, height, width]``, the gated input.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, channels, _, _] = input.dims();
        let w = self.channel_weights(input.clone());
        input * w.reshape([batch, channels, 1, 1])
    }
}

//! # `CNA2d` - conv/norm/activation block.
//!
//! A [`CNA2d`] module is:
//! * a [`ConvNorm2d`] layer (conv, then norm),
//! * an [`Activation`] layer.
//!
//! With support for hooking the forward method,
//! to run code between the norm and activation layers.
//! The SENet block uses the hook to apply the squeeze-excitation gate
//! and the residual sum before the final activation.

use crate::compat::activation_wrapper::{Activation, ActivationConfig};
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::layers::blocks::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::Conv2dConfig;
use burn::prelude::{Backend, Tensor};

/// Abstract policy for [`CNA2d`] Config.
///
/// Defines a [`NormalizationConfig`] and [`ActivationConfig`],
/// and can be lifted to a [`CNA2dConfig`] to match a [`Conv2dConfig`].
#[derive(Config, Debug)]
pub struct AbstractCNA2dConfig {
    /// The normalization config; the feature size is ignored.
    #[config(default = "NormalizationConfig::batch()")]
    pub norm: NormalizationConfig,

    /// Activation Config.
    #[config(default = "ActivationConfig::Relu")]
    pub act: ActivationConfig,
}

impl Default for AbstractCNA2dConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AbstractCNA2dConfig {
    /// Merge with a [`Conv2dConfig`] to construct a [`CNA2dConfig`].
    ///
    /// The abstract [`NormalizationConfig`] is feature matched
    /// with the target [`Conv2dConfig`].
    pub fn build_config(
        &self,
        conv: Conv2dConfig,
    ) -> CNA2dConfig {
        let features = conv.channels[1];
        CNA2dConfig::new(
            ConvNorm2dConfig::new(conv).with_norm(self.norm.clone().with_num_features(features)),
        )
        .with_act(self.act.clone())
    }
}

/// [`CNA2d`] Config.
///
/// Implements [`ConvNorm2dMeta`].
#[derive(Config, Debug)]
pub struct CNA2dConfig {
    /// The conv/norm config.
    pub conv_norm: ConvNorm2dConfig,

    /// The [`Activation`] config.
    #[config(default = "ActivationConfig::Relu")]
    pub act: ActivationConfig,
}

impl ConvNorm2dMeta for CNA2dConfig {
    fn in_channels(&self) -> usize {
        self.conv_norm.in_channels()
    }

    fn groups(&self) -> usize {
        self.conv_norm.groups()
    }

    fn out_channels(&self) -> usize {
        self.conv_norm.out_channels()
    }

    fn stride(&self) -> [usize; 2] {
        self.conv_norm.stride()
    }
}

impl CNA2dConfig {
    /// Initialize a [`CNA2d`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> CNA2d<B> {
        CNA2d {
            conv_norm: self.conv_norm.init(device),
            act: self.act.init(device),
        }
    }
}

/// Sequenced conv/norm/activation block.
///
/// Implements [`ConvNorm2dMeta`].
#[derive(Module, Debug)]
pub struct CNA2d<B: Backend> {
    /// Internal conv/norm layer.
    pub conv_norm: ConvNorm2d<B>,

    /// Activation layer.
    pub act: Activation<B>,
}

impl<B: Backend> ConvNorm2dMeta for CNA2d<B> {
    fn in_channels(&self) -> usize {
        self.conv_norm.in_channels()
    }

    fn groups(&self) -> usize {
        self.conv_norm.groups()
    }

    fn out_channels(&self) -> usize {
        self.conv_norm.out_channels()
    }

    fn stride(&self) -> [usize; 2] {
        self.conv_norm.stride()
    }
}

impl<B: Backend> CNA2d<B> {
    /// Forward Pass.
    ///
    /// ```rust,ignore
    /// let x = self.conv_norm.forward(input);
    /// let x = self.act.forward(x);
    /// ```
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        self.hook_forward(input, |x| x)
    }

    /// Hooked Forward Pass.
    ///
    /// Applies the hook after normalization but before activation.
    ///
    /// ```rust,ignore
    /// let x = self.conv_norm.forward(input);
    /// let x = hook(x);
    /// let x = self.act.forward(x);
    /// ```
    pub fn hook_forward<F>(
        &self,
        input: Tensor<B, 4>,
        hook: F,
    ) -> Tensor<B, 4>
    where
        F: FnOnce(Tensor<B, 4>) -> Tensor<B, 4>,
    {
        let x = self.conv_norm.forward(input);
        let x = hook(x);
        self.act.forward(x)
    }
}

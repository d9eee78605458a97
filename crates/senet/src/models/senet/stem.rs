//! # `SENet` Input Stem
//!
//! ```text
//! conv3x3(in -> stem_width, stride=2, pad=1)
//! conv3x3(stem_width -> stem_width, stride=1, pad=1)
//! conv3x3(stem_width -> stem_width, stride=1, pad=1), norm, act
//! maxpool(3, stride=2, pad=1)
//! ```
//!
//! There is no normalization between the stem convolutions;
//! the three convs compose linearly into the single norm/act.

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::layers::blocks::cna::{AbstractCNA2dConfig, CNA2d};
use crate::layers::blocks::conv_norm::ConvNorm2dMeta;
use crate::utility::shapes::expect_window_output_resolution;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::PaddingConfig2d;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::prelude::{Backend, Tensor};

/// [`SENetStem`] Meta.
pub trait SENetStemMeta {
    /// Number of input (image) channels.
    fn in_channels(&self) -> usize;

    /// Number of output channels.
    fn stem_width(&self) -> usize;

    /// Output resolution for a given input resolution.
    ///
    /// # Panics
    ///
    /// If the input is too small for the stem windows.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        let conv = expect_window_output_resolution(input_resolution, 3, 2, 1);
        expect_window_output_resolution(conv, 3, 2, 1)
    }
}

/// [`SENetStem`] Config.
#[derive(Config, Debug)]
pub struct SENetStemConfig {
    /// Number of input (image) channels.
    #[config(default = "3")]
    pub in_channels: usize,

    /// Width of all three stem convolutions.
    #[config(default = "64")]
    pub stem_width: usize,

    /// Stem normalization.
    #[config(default = "NormalizationConfig::batch()")]
    pub normalization: NormalizationConfig,

    /// Stem activation.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl SENetStemMeta for SENetStemConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn stem_width(&self) -> usize {
        self.stem_width
    }
}

impl SENetStemConfig {
    /// Initialize a [`SENetStem`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> SENetStem<B> {
        assert!(
            self.in_channels > 0 && self.stem_width > 0,
            "SENetStem channels must be > 0: in_channels={}, stem_width={}",
            self.in_channels,
            self.stem_width,
        );

        let width = self.stem_width;
        let conv3x3 = |in_channels: usize, stride: usize| {
            Conv2dConfig::new([in_channels, width], [3, 3])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
        };

        let cna3 = AbstractCNA2dConfig::new()
            .with_norm(self.normalization)
            .with_act(self.activation)
            .build_config(conv3x3(width, 1));

        SENetStem {
            conv1: conv3x3(self.in_channels, 2).init(device),
            conv2: conv3x3(width, 1).init(device),
            cna3: cna3.init(device),
            pool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
        }
    }
}

/// `SENet` input stem.
#[derive(Module, Debug)]
pub struct SENetStem<B: Backend> {
    /// First conv, stride 2.
    pub conv1: Conv2d<B>,

    /// Second conv.
    pub conv2: Conv2d<B>,

    /// Third conv, with the stem norm and act.
    pub cna3: CNA2d<B>,

    /// Stem pool, stride 2.
    pub pool: MaxPool2d,
}

impl<B: Backend> SENetStemMeta for SENetStem<B> {
    fn in_channels(&self) -> usize {
        self.conv1.weight.shape().dims[1]
    }

    fn stem_width(&self) -> usize {
        self.cna3.out_channels()
    }
}

impl<B: Backend> SENetStem<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, stem_width, ceil(height/4), ceil(width/4)]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, height, width] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch", "height", "width"],
            &[("in_channels", self.in_channels())]
        );
        let [out_height, out_width] = self.output_resolution([height, width]);

        let x = self.conv1.forward(input);
        let x = self.conv2.forward(x);
        let x = self.cna3.forward(x);
        let x = self.pool.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "stem_width", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("stem_width", self.stem_width()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        x
    }
}

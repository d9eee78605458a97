//! # [`SEBlock`] - the SE-ResNeXt residual unit.
//!
//! A bottleneck body, gated by [`SqueezeExcitation`],
//! summed with an (optionally projected) shortcut:
//!
//! ```text
//! body:
//!   conv1x1(in -> group_width/2), norm, act
//!   conv3x3(group_width/2 -> group_width, stride), norm, act
//!   conv1x1(group_width -> channels*4), norm
//! se:
//!   gate(channels*4, reduced=channels/4)
//! out:
//!   act(se(body(x)) + shortcut(x))
//! ```
//!
//! where ``D = floor(channels * bottleneck_width / 64)`` and
//! ``group_width = cardinality * D``.
//!
//! Cardinality scales the body width; the 3x3 body conv is ungrouped,
//! so the block's parameter layout matches the published ``SE_ResNeXt`` weights.
//!
//! [`SEBlockMeta`] defines a common meta-API for [`SEBlock`]
//! and [`SEBlockConfig`].

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::layers::blocks::cna::{AbstractCNA2dConfig, CNA2d, CNA2dConfig};
use crate::layers::blocks::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use crate::layers::squeeze_excitation::{
    SqueezeExcitation, SqueezeExcitationConfig, SqueezeExcitationMeta,
};
use crate::utility::shapes::stride_div_output_resolution;
use burn::nn::PaddingConfig2d;
use burn::nn::conv::Conv2dConfig;
use burn::prelude::{Backend, Config, Module, Tensor};

/// Channel expansion of the block output, relative to `channels`.
pub const SE_BLOCK_EXPANSION: usize = 4;

/// SE hidden width divisor, relative to `channels`.
///
/// ``reduced = channels / 4 = out_channels / 16``.
pub const SE_BLOCK_SQUEEZE_DIVISOR: usize = 4;

/// [`SEBlock`] Meta trait.
pub trait SEBlockMeta {
    /// The number of input channels.
    fn in_channels(&self) -> usize;

    /// The base channel count of the block's stage.
    fn channels(&self) -> usize;

    /// Cardinality; a multiplier on the body width.
    fn cardinality(&self) -> usize;

    /// Width of each group, relative to 64 base channels.
    fn bottleneck_width(&self) -> usize;

    /// The stride of the block.
    fn stride(&self) -> usize;

    /// Does the block project its shortcut?
    fn has_downsample(&self) -> bool;

    /// Per-group depth.
    ///
    /// ``D = floor(channels * bottleneck_width / 64)``
    fn group_depth(&self) -> usize {
        self.channels() * self.bottleneck_width() / 64
    }

    /// Width of the 3x3 body conv.
    ///
    /// ``cardinality * D``
    fn group_width(&self) -> usize {
        self.cardinality() * self.group_depth()
    }

    /// Output channels of the first 1x1 conv.
    fn first_width(&self) -> usize {
        self.group_width() / 2
    }

    /// The number of output channels.
    fn out_channels(&self) -> usize {
        self.channels() * SE_BLOCK_EXPANSION
    }

    /// Hidden width of the squeeze-excitation gate.
    fn se_reduced_channels(&self) -> usize {
        self.channels() / SE_BLOCK_SQUEEZE_DIVISOR
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// # Panics
    ///
    /// If the input resolution is not a multiple of the stride.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        stride_div_output_resolution(input_resolution, self.stride())
    }
}

/// [`SEBlock`] Config.
///
/// Implements [`SEBlockMeta`].
#[derive(Config, Debug)]
pub struct SEBlockConfig {
    /// The number of input channels.
    pub in_channels: usize,

    /// The base channel count of the block's stage.
    pub channels: usize,

    /// Cardinality; a multiplier on the body width.
    #[config(default = "64")]
    pub cardinality: usize,

    /// Width of each group, relative to 64 base channels.
    #[config(default = "4")]
    pub bottleneck_width: usize,

    /// The stride of the block.
    #[config(default = "1")]
    pub stride: usize,

    /// Project the shortcut with a strided 1x1 conv/norm.
    #[config(default = "false")]
    pub downsample: bool,

    /// Zero-init the last body norm, so the block starts as its shortcut.
    #[config(default = "false")]
    pub zero_init_last_norm: bool,

    /// Normalization layers config; feature sizes are matched at init.
    #[config(default = "NormalizationConfig::batch()")]
    pub normalization: NormalizationConfig,

    /// Body and output activation.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,

    /// Squeeze-excitation gate activation.
    #[config(default = "ActivationConfig::Sigmoid")]
    pub se_gate: ActivationConfig,
}

impl SEBlockMeta for SEBlockConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn cardinality(&self) -> usize {
        self.cardinality
    }

    fn bottleneck_width(&self) -> usize {
        self.bottleneck_width
    }

    fn stride(&self) -> usize {
        self.stride
    }

    fn has_downsample(&self) -> bool {
        self.downsample
    }
}

impl SEBlockConfig {
    /// Check the structural constraints of the block.
    pub fn try_validate(&self) -> Result<(), String> {
        if self.stride == 0 {
            return Err("stride must be > 0".to_string());
        }
        if self.cardinality == 0 {
            return Err("cardinality must be > 0".to_string());
        }
        if self.first_width() == 0 {
            return Err(format!(
                "group_width/2 must be > 0: channels={}, cardinality={}, bottleneck_width={}",
                self.channels, self.cardinality, self.bottleneck_width,
            ));
        }
        if self.se_reduced_channels() == 0 {
            return Err(format!(
                "channels ({}) too small for SE squeeze divisor ({})",
                self.channels, SE_BLOCK_SQUEEZE_DIVISOR,
            ));
        }
        if !self.downsample && (self.in_channels != self.out_channels() || self.stride != 1) {
            return Err(format!(
                "identity shortcut requires in_channels ({}) == out_channels ({}) and stride ({}) == 1",
                self.in_channels,
                self.out_channels(),
                self.stride,
            ));
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("Invalid SEBlockConfig: {err}");
        }
    }

    /// Initialize a [`SEBlock`].
    ///
    /// # Panics
    ///
    /// If the config is not valid; see [`SEBlockConfig::try_validate`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> SEBlock<B> {
        self.expect_valid();

        let stride = self.stride;
        let cna_builder = AbstractCNA2dConfig::new()
            .with_norm(self.normalization.clone())
            .with_act(self.activation.clone());

        let cna1: CNA2dConfig = cna_builder.build_config(
            Conv2dConfig::new([self.in_channels, self.first_width()], [1, 1]).with_bias(false),
        );

        let cna2: CNA2dConfig = cna_builder.build_config(
            Conv2dConfig::new([self.first_width(), self.group_width()], [3, 3])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false),
        );

        let mut cna3: CNA2dConfig = cna_builder.build_config(
            Conv2dConfig::new([self.group_width(), self.out_channels()], [1, 1]).with_bias(false),
        );
        cna3.conv_norm.zero_init_norm = self.zero_init_last_norm;

        let se = SqueezeExcitationConfig::new(self.out_channels(), self.se_reduced_channels())
            .with_gate(self.se_gate.clone());

        let downsample = self.downsample.then(|| {
            ConvNorm2dConfig::new(
                Conv2dConfig::new([self.in_channels, self.out_channels()], [1, 1])
                    .with_stride([stride, stride])
                    .with_bias(false),
            )
            .with_norm(self.normalization.clone())
        });

        SEBlock {
            channels: self.channels,
            cardinality: self.cardinality,
            bottleneck_width: self.bottleneck_width,
            cna1: cna1.init(device),
            cna2: cna2.init(device),
            cna3: cna3.init(device),
            se: se.init(device),
            downsample: downsample.map(|c| c.init(device)),
        }
    }
}

/// SE-ResNeXt residual unit.
///
/// Implements [`SEBlockMeta`].
#[derive(Module, Debug)]
pub struct SEBlock<B: Backend> {
    /// Base channel count.
    pub channels: usize,

    /// Cardinality.
    pub cardinality: usize,

    /// Bottleneck width.
    pub bottleneck_width: usize,

    /// 1x1 reduce conv/norm/act.
    pub cna1: CNA2d<B>,

    /// 3x3 conv/norm/act.
    pub cna2: CNA2d<B>,

    /// 1x1 expand conv/norm; its activation is applied after the residual sum.
    pub cna3: CNA2d<B>,

    /// Squeeze-excitation gate.
    pub se: SqueezeExcitation<B>,

    /// Optional shortcut projection.
    pub downsample: Option<ConvNorm2d<B>>,
}

impl<B: Backend> SEBlockMeta for SEBlock<B> {
    fn in_channels(&self) -> usize {
        self.cna1.in_channels()
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn cardinality(&self) -> usize {
        self.cardinality
    }

    fn bottleneck_width(&self) -> usize {
        self.bottleneck_width
    }

    fn stride(&self) -> usize {
        self.cna2.stride()[0]
    }

    fn has_downsample(&self) -> bool {
        self.downsample.is_some()
    }

    fn group_width(&self) -> usize {
        self.cna2.out_channels()
    }

    fn first_width(&self) -> usize {
        self.cna1.out_channels()
    }

    fn out_channels(&self) -> usize {
        self.cna3.out_channels()
    }

    fn se_reduced_channels(&self) -> usize {
        self.se.reduced_channels()
    }
}

impl<B: Backend> SEBlock<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height=out_height*stride, in_width=out_width*stride]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_channels, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        #[cfg(debug_assertions)]
        let [batch, out_height, out_width] = bimm_contracts::unpack_shape_contract!(
            [
                "batch",
                "in_channels",
                "in_height" = "out_height" * "stride",
                "in_width" = "out_width" * "stride"
            ],
            &input,
            &["batch", "out_height", "out_width"],
            &[("in_channels", self.in_channels()), ("stride", self.stride())]
        );

        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        #[cfg(debug_assertions)]
        bimm_contracts::assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &identity,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        let x = self.cna1.forward(input);
        let x = self.cna2.forward(x);

        self.cna3
            .hook_forward(x, |x| self.se.forward(x) + identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;
    use hamcrest::prelude::*;

    type B = NdArray<f32>;

    #[test]
    fn test_resnext_widths() {
        // SE-ResNeXt-50 32x4d, first stage.
        let config = SEBlockConfig::new(64, 64)
            .with_cardinality(32)
            .with_bottleneck_width(4)
            .with_downsample(true);

        assert_that!(config.group_depth(), is(equal_to(4)));
        assert_that!(config.group_width(), is(equal_to(128)));
        assert_that!(config.first_width(), is(equal_to(64)));
        assert_that!(config.out_channels(), is(equal_to(256)));
        assert_that!(config.se_reduced_channels(), is(equal_to(16)));
        assert!(config.try_validate().is_ok());

        // SENet-154 64x4d, last stage.
        let config = SEBlockConfig::new(2048, 512)
            .with_cardinality(64)
            .with_bottleneck_width(4);
        assert_eq!(config.group_depth(), 32);
        assert_eq!(config.group_width(), 2048);
        assert_eq!(config.out_channels(), 2048);
        assert!(config.try_validate().is_ok());
    }

    #[test]
    fn test_output_resolution() {
        let config = SEBlockConfig::new(16, 16)
            .with_stride(2)
            .with_downsample(true);
        assert_eq!(config.output_resolution([16, 16]), [8, 8]);
    }

    #[test]
    fn test_validate_identity_shortcut() {
        // Body widths are valid (group_width = 8, first_width = 4);
        // only the shortcut is wrong.
        let config = SEBlockConfig::new(16, 8)
            .with_cardinality(2)
            .with_bottleneck_width(32);
        let err = config.try_validate().unwrap_err();
        assert!(err.contains("identity shortcut"), "{err}");
        let mut fixed = config.clone();
        fixed.in_channels = 32;
        assert!(fixed.try_validate().is_ok());

        let config = SEBlockConfig::new(32, 8)
            .with_cardinality(2)
            .with_bottleneck_width(32)
            .with_stride(2);
        let err = config.try_validate().unwrap_err();
        assert!(err.contains("identity shortcut"), "{err}");
        assert!(config.with_downsample(true).try_validate().is_ok());
    }

    #[test]
    fn test_validate_accepts_uneven_cardinality() {
        // D = 16 * 4 / 64 = 1; group_width = 3; first_width = 1.
        let config = SEBlockConfig::new(16, 16)
            .with_cardinality(3)
            .with_downsample(true);
        assert!(config.try_validate().is_ok());
    }

    #[test]
    #[should_panic(expected = "Invalid SEBlockConfig: group_width/2 must be > 0")]
    fn test_init_panics_on_empty_body() {
        let device = Default::default();
        let _block: SEBlock<B> = SEBlockConfig::new(16, 8)
            .with_cardinality(1)
            .with_bottleneck_width(4)
            .with_downsample(true)
            .init(&device);
    }

    #[test]
    fn test_block_meta() {
        let device = Default::default();

        let block: SEBlock<B> = SEBlockConfig::new(16, 16)
            .with_cardinality(4)
            .with_bottleneck_width(16)
            .with_stride(2)
            .with_downsample(true)
            .init(&device);

        assert_eq!(block.in_channels(), 16);
        assert_eq!(block.channels(), 16);
        assert_eq!(block.cardinality(), 4);
        assert_eq!(block.bottleneck_width(), 16);
        assert_eq!(block.group_width(), 16);
        assert_eq!(block.first_width(), 8);
        assert_eq!(block.out_channels(), 64);
        assert_eq!(block.se_reduced_channels(), 4);
        assert_eq!(block.stride(), 2);
        assert!(block.has_downsample());

        // Cardinality widens the body; the 3x3 conv itself is ungrouped.
        assert_eq!(block.cna2.groups(), 1);
    }

    #[test]
    fn test_forward_wide_body() {
        let device = Default::default();

        // group_width = 2 * 32 = 64, first_width = 32.
        let block: SEBlock<B> = SEBlockConfig::new(64, 64)
            .with_cardinality(2)
            .with_bottleneck_width(32)
            .with_stride(2)
            .with_downsample(true)
            .init(&device);
        assert_eq!(block.first_width(), 32);
        assert_eq!(block.group_width(), 64);
        assert_eq!(block.cna2.groups(), 1);
        assert_eq!(block.cna2.conv_norm.conv.weight.dims(), [64, 32, 3, 3]);

        let input = Tensor::random([1, 64, 4, 4], Distribution::Default, &device);
        let output = block.forward(input);

        assert_shape_contract!(
            ["batch", "channels", "height", "width"],
            &output,
            &[("batch", 1), ("channels", 256), ("height", 2), ("width", 2)]
        );
    }

    #[test]
    fn test_forward_downsample() {
        let device = Default::default();

        let block: SEBlock<B> = SEBlockConfig::new(8, 8)
            .with_cardinality(2)
            .with_bottleneck_width(32)
            .with_stride(2)
            .with_downsample(true)
            .init(&device);

        let input = Tensor::random([2, 8, 8, 8], Distribution::Default, &device);
        let output = block.forward(input);

        assert_shape_contract!(
            ["batch", "channels", "height", "width"],
            &output,
            &[("batch", 2), ("channels", 32), ("height", 4), ("width", 4)]
        );

        // Final activation is ReLU.
        let min = output.min().into_scalar();
        assert!(min >= 0.0);
    }

    #[test]
    fn test_forward_identity_zero_body() {
        let device = Default::default();

        // With a zeroed last norm, the SE-gated body is exactly zero,
        // and the block reduces to relu(x).
        let block: SEBlock<B> = SEBlockConfig::new(32, 8)
            .with_cardinality(2)
            .with_bottleneck_width(32)
            .with_zero_init_last_norm(true)
            .init(&device);
        assert!(!block.has_downsample());

        let input: Tensor<B, 4> =
            Tensor::random([1, 32, 4, 4], Distribution::Uniform(-1.0, 1.0), &device);
        let output = block.forward(input.clone());

        output
            .to_data()
            .assert_eq(&input.clamp_min(0.0).to_data(), true);
    }
}

//! # `SENet` Stage
//!
//! A [`SEStage`] is a sequence of [`SEBlock`]s at one resolution.
//! The first block carries the stage stride and the shortcut projection;
//! the remaining blocks are identity-shortcut blocks at stride 1.

use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::models::senet::se_block::{SE_BLOCK_EXPANSION, SEBlock, SEBlockConfig, SEBlockMeta};
use crate::utility::shapes::stride_div_output_resolution;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::prelude::{Backend, Module, Tensor};

/// [`SEStage`] Meta API.
pub trait SEStageMeta {
    /// The number of blocks.
    fn len(&self) -> usize;

    /// Check if the stage is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of input channels.
    ///
    /// # Panics
    ///
    /// If the stage has no blocks.
    fn in_channels(&self) -> usize;

    /// The number of output channels.
    ///
    /// # Panics
    ///
    /// If the stage has no blocks.
    fn out_channels(&self) -> usize;

    /// Get the effective stride of the stage.
    fn stride(&self) -> usize;

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

/// [`SEStage`] Configuration.
#[derive(Config, Debug)]
pub struct SEStageConfig {
    /// The component blocks.
    pub blocks: Vec<SEBlockConfig>,
}

impl From<Vec<SEBlockConfig>> for SEStageConfig {
    fn from(blocks: Vec<SEBlockConfig>) -> Self {
        Self { blocks }
    }
}

impl SEStageMeta for SEStageConfig {
    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn in_channels(&self) -> usize {
        match self.blocks.first() {
            Some(block) => block.in_channels(),
            None => panic!("SEStageConfig has no blocks"),
        }
    }

    fn out_channels(&self) -> usize {
        match self.blocks.last() {
            Some(block) => block.out_channels(),
            None => panic!("SEStageConfig has no blocks"),
        }
    }

    fn stride(&self) -> usize {
        self.blocks.iter().map(|b| b.stride()).product()
    }
}

impl SEStageConfig {
    /// Build a stage config.
    ///
    /// # Arguments
    ///
    /// - `num_blocks`: the number of blocks; must be > 0.
    /// - `in_channels`: the stage input channels.
    /// - `channels`: the stage base channels; the stage outputs ``channels * 4``.
    /// - `cardinality`: body width multiplier.
    /// - `bottleneck_width`: per-group width, relative to 64 base channels.
    /// - `stride`: the stride of the first block.
    pub fn build(
        num_blocks: usize,
        in_channels: usize,
        channels: usize,
        cardinality: usize,
        bottleneck_width: usize,
        stride: usize,
    ) -> Self {
        let block = |in_channels: usize, stride: usize, downsample: bool| {
            SEBlockConfig::new(in_channels, channels)
                .with_cardinality(cardinality)
                .with_bottleneck_width(bottleneck_width)
                .with_stride(stride)
                .with_downsample(downsample)
        };

        let out_channels = channels * SE_BLOCK_EXPANSION;
        let blocks = (0..num_blocks)
            .map(|idx| match idx {
                0 => block(in_channels, stride, true),
                _ => block(out_channels, 1, false),
            })
            .collect();

        Self { blocks }
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err("blocks is empty".to_string());
        }

        for (idx, block) in self.blocks.iter().enumerate() {
            block
                .try_validate()
                .map_err(|err| format!("block[{idx}]: {err}"))?;
        }

        for idx in 1..self.blocks.len() {
            let prev = &self.blocks[idx - 1];
            let curr = &self.blocks[idx];
            if prev.out_channels() != curr.in_channels() {
                return Err(format!(
                    "block[{}].out_channels({}) != block[{}].in_channels({})",
                    idx - 1,
                    prev.out_channels(),
                    idx,
                    curr.in_channels(),
                ));
            }
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("Invalid SEStageConfig: {err}");
        }
    }

    /// Initialize a new [`SEStage`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> SEStage<B> {
        self.expect_valid();

        SEStage {
            blocks: self
                .blocks
                .into_iter()
                .map(|block| block.init(device))
                .collect(),
        }
    }

    /// Apply a mapping over the blocks.
    pub fn map_blocks<F>(
        self,
        f: &mut F,
    ) -> Self
    where
        F: FnMut(usize, SEBlockConfig) -> SEBlockConfig,
    {
        Self {
            blocks: self
                .blocks
                .into_iter()
                .enumerate()
                .map(|(idx, block)| f(idx, block))
                .collect(),
        }
    }

    /// Set the normalization config of every block.
    pub fn with_normalization(
        self,
        normalization: NormalizationConfig,
    ) -> Self {
        self.map_blocks(&mut |_, block| block.with_normalization(normalization.clone()))
    }
}

/// A sequence of [`SEBlock`]s.
///
/// Implements [`SEStageMeta`].
#[derive(Module, Debug)]
pub struct SEStage<B: Backend> {
    /// The component blocks.
    pub blocks: Vec<SEBlock<B>>,
}

impl<B: Backend> SEStageMeta for SEStage<B> {
    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn in_channels(&self) -> usize {
        match self.blocks.first() {
            Some(block) => block.in_channels(),
            None => panic!("SEStage has no blocks"),
        }
    }

    fn out_channels(&self) -> usize {
        match self.blocks.last() {
            Some(block) => block.out_channels(),
            None => panic!("SEStage has no blocks"),
        }
    }

    fn stride(&self) -> usize {
        self.blocks.iter().map(|b| b.stride()).product()
    }
}

impl<B: Backend> SEStage<B> {
    /// Forward pass.
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
        let [batch, out_height, out_width] = unpack_shape_contract!(
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

        let x = self
            .blocks
            .iter()
            .fold(input, |x, block| block.forward(x));

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        x
    }
}

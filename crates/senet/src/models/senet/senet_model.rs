//! # `SENet` Core Model
//!
//! [`SENet`] is the core `SENet` / SE-ResNeXt module.
//!
//! [`SENetAbstractConfig`] implements [`Config`], and provides
//! a high-level configuration interface.
//! It provides [`SENetAbstractConfig::to_structure`] to convert
//! to a [`SENetConfig`].
//!
//! [`SENetConfig`] implements [`Config`], and provides
//! [`SENetConfig::init`] to initialize a [`SENet`].
//!
//! [`SENet`] implements [`Module`], and provides
//! [`SENet::forward`] and [`SENet::forward_features`].

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::models::senet::stage::{SEStage, SEStageConfig, SEStageMeta};
use crate::models::senet::stem::{SENetStem, SENetStemConfig, SENetStemMeta};
use crate::utility::probability::expect_probability;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::module::Module;
use burn::nn::pool::{
    AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, AvgPool2d, AvgPool2dConfig,
};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::{Backend, Config, Tensor};

/// Default body width cardinality.
pub const SENET_DEFAULT_CARDINALITY: usize = 64;

/// Default per-group width, relative to 64 base channels.
pub const SENET_DEFAULT_BOTTLENECK_WIDTH: usize = 4;

/// Default number of classes (`ImageNet`).
pub const SENET_DEFAULT_NUM_CLASSES: usize = 1000;

/// Default head dropout probability.
pub const SENET_DEFAULT_DROPOUT: f64 = 0.2;

/// Stem width, and the base channel count of the first stage.
pub const SENET_STEM_WIDTH: usize = 64;

/// Total stride of the feature extractor.
pub const SENET_FEATURE_STRIDE: usize = 32;

/// Head pooling policy.
#[derive(Config, Debug, Copy, PartialEq, Eq)]
pub enum SENetHeadPool {
    /// Fixed ``k x k`` average pool; the final feature map must pool to ``1x1``.
    ///
    /// ``Fixed(7)`` requires a ``224x224`` input at full scale.
    Fixed(usize),

    /// Global average pool; accepts any input divisible by 32.
    Adaptive,
}

impl Default for SENetHeadPool {
    fn default() -> Self {
        Self::Fixed(7)
    }
}

/// High-level `SENet` model configuration.
#[derive(Config, Debug)]
pub struct SENetAbstractConfig {
    /// Stage block depths.
    pub layers: [usize; 4],

    /// Cardinality; a multiplier on the body widths.
    #[config(default = "SENET_DEFAULT_CARDINALITY")]
    pub cardinality: usize,

    /// Per-group width, relative to 64 base channels.
    #[config(default = "SENET_DEFAULT_BOTTLENECK_WIDTH")]
    pub bottleneck_width: usize,

    /// Number of classification classes.
    #[config(default = "SENET_DEFAULT_NUM_CLASSES")]
    pub num_classes: usize,

    /// Stem width; stage ``i`` uses ``stem_width * 2^i`` base channels.
    #[config(default = "SENET_STEM_WIDTH")]
    pub stem_width: usize,

    /// Head dropout probability.
    #[config(default = "SENET_DEFAULT_DROPOUT")]
    pub dropout: f64,

    /// Head pooling policy.
    #[config(default = "SENetHeadPool::Fixed(7)")]
    pub head_pool: SENetHeadPool,

    /// Normalization layers config.
    #[config(default = "NormalizationConfig::batch()")]
    pub normalization: NormalizationConfig,

    /// Body and output activation.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl From<SENetAbstractConfig> for SENetConfig {
    /// # Panics
    ///
    /// If any stage has zero layers.
    fn from(config: SENetAbstractConfig) -> Self {
        assert!(
            config.layers.iter().all(|&n| n > 0),
            "SENetAbstractConfig layers must all be > 0: {:?}",
            config.layers
        );

        let stem = SENetStemConfig::new()
            .with_stem_width(config.stem_width)
            .with_normalization(config.normalization.clone())
            .with_activation(config.activation.clone());

        let mut in_channels = config.stem_width;
        let stages = config
            .layers
            .iter()
            .enumerate()
            .map(|(idx, &num_blocks)| {
                let stride = if idx == 0 { 1 } else { 2 };
                let stage = SEStageConfig::build(
                    num_blocks,
                    in_channels,
                    config.stem_width << idx,
                    config.cardinality,
                    config.bottleneck_width,
                    stride,
                )
                .map_blocks(&mut |_, block| {
                    block
                        .with_normalization(config.normalization.clone())
                        .with_activation(config.activation.clone())
                });
                in_channels = stage.out_channels();
                stage
            })
            .collect();

        SENetConfig::new(stem, stages, config.num_classes)
            .with_dropout(config.dropout)
            .with_head_pool(config.head_pool)
    }
}

impl SENetAbstractConfig {
    /// Convert to a [`SENetConfig`].
    pub fn to_structure(self) -> SENetConfig {
        self.into()
    }
}

/// [`SENet`] Structure Config.
///
/// Describes the concrete layer structure of a model;
/// see [`SENetConfig::try_validate`] for the checked constraints.
#[derive(Config, Debug)]
pub struct SENetConfig {
    /// The input stem.
    pub stem: SENetStemConfig,

    /// The residual stages.
    pub stages: Vec<SEStageConfig>,

    /// The number of classes.
    pub num_classes: usize,

    /// Head dropout probability.
    #[config(default = "SENET_DEFAULT_DROPOUT")]
    pub dropout: f64,

    /// Head pooling policy.
    #[config(default = "SENetHeadPool::Fixed(7)")]
    pub head_pool: SENetHeadPool,
}

impl SENetConfig {
    /// Number of features entering the classifier.
    pub fn num_features(&self) -> usize {
        match self.stages.last() {
            Some(stage) => stage.out_channels(),
            None => self.stem.stem_width(),
        }
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        if self.stages.is_empty() {
            return Err("stages is empty".to_string());
        }
        if self.num_classes == 0 {
            return Err("num_classes must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.dropout) {
            return Err(format!("dropout must be in [0, 1]: {}", self.dropout));
        }
        if let SENetHeadPool::Fixed(0) = self.head_pool {
            return Err("head pool size must be > 0".to_string());
        }

        let mut in_channels = self.stem.stem_width();
        for (idx, stage) in self.stages.iter().enumerate() {
            stage
                .try_validate()
                .map_err(|err| format!("stage[{idx}]: {err}"))?;
            if stage.in_channels() != in_channels {
                return Err(format!(
                    "stage[{idx}].in_channels({}) != {in_channels}",
                    stage.in_channels()
                ));
            }
            in_channels = stage.out_channels();
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("Invalid SENetConfig: {err}");
        }
    }

    /// Initialize a [`SENet`] model.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> SENet<B> {
        self.expect_valid();

        let num_features = self.num_features();
        let fixed_pool = match self.head_pool {
            SENetHeadPool::Fixed(size) => Some(
                AvgPool2dConfig::new([size, size])
                    .with_strides([size, size])
                    .init(),
            ),
            SENetHeadPool::Adaptive => None,
        };

        SENet {
            stem: self.stem.init(device),
            stages: self
                .stages
                .into_iter()
                .map(|stage| stage.init(device))
                .collect(),
            fixed_pool,
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(expect_probability(self.dropout)).init(),
            fc: LinearConfig::new(num_features, self.num_classes).init(device),
        }
    }

    /// Apply a mapping over the stages.
    pub fn map_stages<F>(
        self,
        f: &mut F,
    ) -> Self
    where
        F: FnMut(usize, SEStageConfig) -> SEStageConfig,
    {
        Self {
            stages: self
                .stages
                .into_iter()
                .enumerate()
                .map(|(idx, stage)| f(idx, stage))
                .collect(),
            ..self
        }
    }

    /// Zero-init the last body norm of every block.
    pub fn with_zero_init_last_norm(
        self,
        zero_init: bool,
    ) -> Self {
        self.map_stages(&mut |_, stage| {
            stage.map_blocks(&mut |_, block| block.with_zero_init_last_norm(zero_init))
        })
    }
}

/// `SENet` model.
#[derive(Module, Debug)]
pub struct SENet<B: Backend> {
    /// Input stem.
    pub stem: SENetStem<B>,

    /// Residual stages.
    pub stages: Vec<SEStage<B>>,

    /// Fixed-window head pool; when absent, `global_pool` is used.
    pub fixed_pool: Option<AvgPool2d>,

    /// Global head pool.
    pub global_pool: AdaptiveAvgPool2d,

    /// Head dropout.
    pub dropout: Dropout,

    /// Head classifier.
    pub fc: Linear<B>,
}

impl<B: Backend> SENet<B> {
    /// Number of features entering the classifier.
    pub fn num_features(&self) -> usize {
        self.fc.weight.dims()[0]
    }

    /// Number of output classes.
    pub fn num_classes(&self) -> usize {
        self.fc.weight.dims()[1]
    }

    /// Total stride of [`SENet::forward_features`].
    pub fn feature_stride(&self) -> usize {
        4 * self.stages.iter().map(|s| s.stride()).product::<usize>()
    }

    /// Forward pass of the feature extractor.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, 3, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, num_features, height/32, width/32]``, the pre-pool feature map.
    pub fn forward_features(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, out_height, out_width] = unpack_shape_contract!(
            [
                "batch",
                "in_channels",
                "height" = "out_height" * "stride",
                "width" = "out_width" * "stride"
            ],
            &input,
            &["batch", "out_height", "out_width"],
            &[
                ("in_channels", self.stem.in_channels()),
                ("stride", self.feature_stride())
            ]
        );

        let x = self.stem.forward(input);
        let x = self
            .stages
            .iter()
            .fold(x, |x, stage| stage.forward(x));

        assert_shape_contract_periodically!(
            ["batch", "features", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("features", self.num_features()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        x
    }

    /// Forward pass of the head.
    ///
    /// # Arguments
    ///
    /// - `features`: ``[batch, num_features, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, num_classes]`` logits.
    ///
    /// # Panics
    ///
    /// If the fixed head pool does not reduce the features to ``1x1``.
    pub fn forward_head(
        &self,
        features: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let x = match &self.fixed_pool {
            Some(pool) => pool.forward(features),
            None => self.global_pool.forward(features),
        };
        let [batch] = unpack_shape_contract!(
            ["batch", "features", "height", "width"],
            &x,
            &["batch"],
            &[("features", self.num_features()), ("height", 1), ("width", 1)]
        );

        let x = x.reshape([batch, self.num_features()]);
        let x = self.dropout.forward(x);
        self.fc.forward(x)
    }

    /// `SENet` forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, 3, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, num_classes]`` logits.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let x = self.forward_features(input);
        self.forward_head(x)
    }

    /// Re-initialize the last layer with the specified number of output classes.
    pub fn with_classes(
        mut self,
        num_classes: usize,
    ) -> Self {
        let [d_input, _d_output] = self.fc.weight.dims();
        self.fc = LinearConfig::new(d_input, num_classes).init(&self.fc.weight.device());
        self
    }

    /// Apply a mapping over stages.
    pub fn map_stages<F>(
        self,
        f: F,
    ) -> Self
    where
        F: Fn(Vec<SEStage<B>>) -> Vec<SEStage<B>>,
    {
        Self {
            stages: f(self.stages),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::senet::se_block::SEBlockMeta;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    fn tiny_config() -> SENetAbstractConfig {
        SENetAbstractConfig::new([1, 1, 1, 1])
            .with_cardinality(2)
            .with_bottleneck_width(32)
            .with_stem_width(8)
            .with_num_classes(5)
            .with_head_pool(SENetHeadPool::Adaptive)
    }

    #[test]
    fn test_abstract_defaults() {
        let config = SENetAbstractConfig::new([3, 4, 6, 3]);
        assert_eq!(config.cardinality, 64);
        assert_eq!(config.bottleneck_width, 4);
        assert_eq!(config.num_classes, 1000);
        assert_eq!(config.stem_width, 64);
        assert_eq!(config.dropout, 0.2);
        assert_eq!(config.head_pool, SENetHeadPool::Fixed(7));
        assert_eq!(SENetHeadPool::default(), SENetHeadPool::Fixed(7));
    }

    #[test]
    fn test_to_structure() {
        let config = SENetAbstractConfig::new([3, 4, 6, 3])
            .with_cardinality(32)
            .to_structure();

        assert!(config.try_validate().is_ok());
        assert_eq!(config.stem.stem_width, 64);
        assert_eq!(config.stages.len(), 4);
        assert_eq!(
            config.stages.iter().map(|s| s.len()).collect::<Vec<_>>(),
            vec![3, 4, 6, 3]
        );
        assert_eq!(
            config
                .stages
                .iter()
                .map(|s| (s.in_channels(), s.out_channels(), s.stride()))
                .collect::<Vec<_>>(),
            vec![(64, 256, 1), (256, 512, 2), (512, 1024, 2), (1024, 2048, 2)]
        );

        // Every stage projects its first shortcut, including stage 0.
        for stage in &config.stages {
            assert!(stage.blocks[0].downsample);
            assert!(stage.blocks[1..].iter().all(|b| !b.downsample));
        }

        let block = &config.stages[3].blocks[0];
        assert_eq!(block.group_width(), 1024);
        assert_eq!(block.cardinality(), 32);

        assert_eq!(config.num_features(), 2048);
        assert_eq!(config.num_classes, 1000);
    }

    #[test]
    fn test_validate() {
        let config = tiny_config().to_structure();
        assert!(config.try_validate().is_ok());

        let err = config
            .clone()
            .with_dropout(1.5)
            .try_validate()
            .unwrap_err();
        assert!(err.contains("dropout"), "{err}");

        let err = config
            .clone()
            .with_head_pool(SENetHeadPool::Fixed(0))
            .try_validate()
            .unwrap_err();
        assert!(err.contains("head pool"), "{err}");

        let err = SENetConfig {
            stages: vec![],
            ..config.clone()
        }
        .try_validate()
        .unwrap_err();
        assert_eq!(err, "stages is empty");

        let mut bad = config;
        bad.stem.stem_width = 16;
        let err = bad.try_validate().unwrap_err();
        assert!(err.contains("stage[0].in_channels(8) != 16"), "{err}");
    }

    #[test]
    fn test_tiny_forward() {
        let device = Default::default();
        let model: SENet<B> = tiny_config().to_structure().init(&device);

        assert_eq!(model.num_features(), 256);
        assert_eq!(model.num_classes(), 5);
        assert_eq!(model.feature_stride(), SENET_FEATURE_STRIDE);

        let input = Tensor::random([2, 3, 64, 32], Distribution::Default, &device);

        let features = model.forward_features(input.clone());
        assert_eq!(features.dims(), [2, 256, 2, 1]);

        let output = model.forward(input);
        assert_eq!(output.dims(), [2, 5]);
    }

    #[test]
    fn test_fixed_pool_forward() {
        let device = Default::default();
        let model: SENet<B> = tiny_config()
            .with_head_pool(SENetHeadPool::Fixed(7))
            .to_structure()
            .init(&device);
        assert!(model.fixed_pool.is_some());

        let input = Tensor::random([1, 3, 224, 224], Distribution::Default, &device);
        let output = model.forward(input);
        assert_eq!(output.dims(), [1, 5]);
    }

    #[test]
    #[should_panic(expected = "Shape Error:: 2 !~ height :: Value MissMatch.")]
    fn test_fixed_pool_rejects_large_features() {
        let device = Default::default();
        let model: SENet<B> = tiny_config()
            .with_head_pool(SENetHeadPool::Fixed(1))
            .to_structure()
            .init(&device);

        // 64x64 passes the feature extractor as a 2x2 map;
        // the 1x1 fixed pool leaves it 2x2 at the head.
        let input = Tensor::random([1, 3, 64, 64], Distribution::Default, &device);
        let features = model.forward_features(input.clone());
        assert_eq!(features.dims(), [1, 256, 2, 2]);

        let _ = model.forward(input);
    }

    #[test]
    #[should_panic(expected = "SENetAbstractConfig layers must all be > 0: [0, 1, 1, 1]")]
    fn test_to_structure_rejects_empty_stage() {
        let _ = SENetAbstractConfig::new([0, 1, 1, 1]).to_structure();
    }

    #[test]
    fn test_with_classes() {
        let device = Default::default();
        let model: SENet<B> = tiny_config().to_structure().init(&device).with_classes(3);
        assert_eq!(model.num_classes(), 3);
        assert_eq!(model.num_features(), 256);

        let input = Tensor::random([1, 3, 32, 32], Distribution::Default, &device);
        assert_eq!(model.forward(input).dims(), [1, 3]);
    }

    #[test]
    fn test_zero_init_last_norm() {
        let config = tiny_config().to_structure().with_zero_init_last_norm(true);
        assert!(
            config
                .stages
                .iter()
                .flat_map(|s| s.blocks.iter())
                .all(|b| b.zero_init_last_norm)
        );
    }

    #[test]
    fn test_autodiff_forward() {
        type AB = Autodiff<B>;
        let device = Default::default();
        let model: SENet<AB> = tiny_config().to_structure().init(&device);

        let input: Tensor<AB, 4> = Tensor::random([2, 3, 32, 32], Distribution::Default, &device);
        let output = model.forward(input);
        assert_eq!(output.dims(), [2, 5]);

        let grads = output.sum().backward();
        assert!(model.fc.weight.grad(&grads).is_some());
    }

    #[test]
    fn test_config_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("senet.json");

        let config = tiny_config();
        config.save(&path).unwrap();

        let loaded = SENetAbstractConfig::load(&path).unwrap();
        assert_eq!(loaded.layers, config.layers);
        assert_eq!(loaded.cardinality, config.cardinality);
        assert_eq!(loaded.head_pool, SENetHeadPool::Adaptive);
    }
}

#![allow(missing_docs)]
//! # `SENet` PyTorch Stubs.
//!
//! Stub modules for loading ``torch`` checkpoints with `burn-import`.
//! The loaded weights carry no information about stateless modules
//! (such as ``Activation::Relu``), so checkpoints are loaded onto stubs
//! mirroring the parameter layout, and copied onto a configured [`SENet`].
//!
//! Expected checkpoint layout:
//! ```text
//! stem.{conv1, conv2, conv3, bn}
//! stages.{i}.blocks.{j}.{conv1, bn1, conv2, bn2, conv3, bn3}
//! stages.{i}.blocks.{j}.se.{fc1, fc2}
//! stages.{i}.blocks.{j}.downsample.{0, 1}
//! fc
//! ```
//! ``downsample.{0, 1}`` and ``se_module`` are remapped by default.

use crate::compat::normalization_wrapper::Normalization;
use crate::layers::blocks::cna::CNA2d;
use crate::layers::blocks::conv_norm::ConvNorm2d;
use crate::layers::squeeze_excitation::SqueezeExcitation;
use crate::models::senet::se_block::SEBlock;
use crate::models::senet::senet_model::SENet;
use crate::models::senet::stage::SEStage;
use crate::models::senet::stem::SENetStem;
use anyhow::bail;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dRecord};
use burn::nn::{BatchNorm, BatchNormRecord, Linear};
use burn::prelude::Backend;
use burn::record::{FullPrecisionSettings, Recorder};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use std::path::PathBuf;

/// Default ``(pattern, replacement)`` key remaps.
pub const DEFAULT_KEY_REMAPS: &[(&str, &str)] = &[
    (r"downsample\.0", "downsample.conv"),
    (r"downsample\.1", "downsample.bn"),
    (r"se_module\.", "se."),
];

/// Load weights from ``torch`` weights path onto a [`SENet`] model.
///
/// # Arguments
///
/// - `senet`: the target model.
/// - `path`: the checkpoint path.
/// - `key_remaps`: extra ``(pattern, replacement)`` remaps, applied after the defaults.
pub fn load_pytorch_weights<B: Backend>(
    senet: SENet<B>,
    path: PathBuf,
    key_remaps: &[(&str, &str)],
) -> anyhow::Result<SENet<B>> {
    let device = senet.fc.weight.device();
    let record = load_senet_stub_record::<B>(path, key_remaps, &device)?;
    record.copy_weights(senet)
}

/// Load a [`SENetStubRecord`] from ``torch`` weights path.
pub fn load_senet_stub_record<B: Backend>(
    path: PathBuf,
    key_remaps: &[(&str, &str)],
    device: &B::Device,
) -> anyhow::Result<SENetStubRecord<B>> {
    let load_args = DEFAULT_KEY_REMAPS
        .iter()
        .chain(key_remaps.iter())
        .fold(LoadArgs::new(path), |args, (pattern, replacement)| {
            args.with_key_remap(pattern, replacement)
        });

    let record = PyTorchFileRecorder::<FullPrecisionSettings>::new().load(load_args, device)?;

    Ok(record)
}

fn check_len(
    what: &str,
    stub: usize,
    target: usize,
) -> anyhow::Result<()> {
    if stub != target {
        bail!("Checkpoint has {stub} {what}, model has {target}");
    }
    Ok(())
}

pub fn copy_conv_norm_weights<B: Backend>(
    conv: Conv2dRecord<B>,
    bn: BatchNormRecord<B, 2>,
    target: ConvNorm2d<B>,
) -> anyhow::Result<ConvNorm2d<B>> {
    let norm = match target.norm {
        Normalization::Batch(norm) => Normalization::Batch(norm.load_record(bn)),
        norm => bail!("BatchNorm weights cannot be applied to {norm:?}"),
    };
    Ok(ConvNorm2d {
        conv: target.conv.load_record(conv),
        norm,
    })
}

pub fn copy_cna_weights<B: Backend>(
    conv: Conv2dRecord<B>,
    bn: BatchNormRecord<B, 2>,
    target: CNA2d<B>,
) -> anyhow::Result<CNA2d<B>> {
    Ok(CNA2d {
        conv_norm: copy_conv_norm_weights(conv, bn, target.conv_norm)?,
        ..target
    })
}

#[derive(Module, Debug)]
pub struct SENetStub<B: Backend> {
    pub stem: StemStub<B>,
    pub stages: Vec<StageStub<B>>,
    pub fc: Linear<B>,
}

impl<B: Backend> SENetStubRecord<B> {
    pub fn copy_weights(
        self,
        target: SENet<B>,
    ) -> anyhow::Result<SENet<B>> {
        check_len("stages", self.stages.len(), target.stages.len())?;
        Ok(SENet {
            stem: self.stem.copy_weights(target.stem)?,
            stages: self
                .stages
                .into_iter()
                .zip(target.stages)
                .map(|(s, t)| s.copy_weights(t))
                .collect::<anyhow::Result<Vec<_>>>()?,
            fc: target.fc.load_record(self.fc),
            ..target
        })
    }
}

#[derive(Module, Debug)]
pub struct StemStub<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pub conv3: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
}

impl<B: Backend> StemStubRecord<B> {
    pub fn copy_weights(
        self,
        target: SENetStem<B>,
    ) -> anyhow::Result<SENetStem<B>> {
        Ok(SENetStem {
            conv1: target.conv1.load_record(self.conv1),
            conv2: target.conv2.load_record(self.conv2),
            cna3: copy_cna_weights(self.conv3, self.bn, target.cna3)?,
            ..target
        })
    }
}

#[derive(Module, Debug)]
pub struct StageStub<B: Backend> {
    pub blocks: Vec<BlockStub<B>>,
}

impl<B: Backend> StageStubRecord<B> {
    pub fn copy_weights(
        self,
        target: SEStage<B>,
    ) -> anyhow::Result<SEStage<B>> {
        check_len("blocks", self.blocks.len(), target.blocks.len())?;
        Ok(SEStage {
            blocks: self
                .blocks
                .into_iter()
                .zip(target.blocks)
                .map(|(s, t)| s.copy_weights(t))
                .collect::<anyhow::Result<Vec<_>>>()?,
        })
    }
}

#[derive(Module, Debug)]
pub struct SEStub<B: Backend> {
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
}

impl<B: Backend> SEStubRecord<B> {
    pub fn copy_weights(
        self,
        target: SqueezeExcitation<B>,
    ) -> SqueezeExcitation<B> {
        SqueezeExcitation {
            fc1: target.fc1.load_record(self.fc1),
            fc2: target.fc2.load_record(self.fc2),
            ..target
        }
    }
}

#[derive(Module, Debug)]
pub struct DownsampleStub<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
}

pub fn copy_downsample_weights<B: Backend>(
    downsample: Option<DownsampleStubRecord<B>>,
    target: Option<ConvNorm2d<B>>,
) -> anyhow::Result<Option<ConvNorm2d<B>>> {
    match (downsample, target) {
        (Some(stub), Some(target)) => Ok(Some(copy_conv_norm_weights(stub.conv, stub.bn, target)?)),
        (None, None) => Ok(None),
        (None, Some(_)) => bail!("Checkpoint block has no downsample, model block does"),
        (Some(_), None) => bail!("Checkpoint block has a downsample, model block does not"),
    }
}

#[derive(Module, Debug)]
pub struct BlockStub<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B, 2>,
    pub conv2: Conv2d<B>,
    pub bn2: BatchNorm<B, 2>,
    pub conv3: Conv2d<B>,
    pub bn3: BatchNorm<B, 2>,
    pub se: SEStub<B>,
    pub downsample: Option<DownsampleStub<B>>,
}

impl<B: Backend> BlockStubRecord<B> {
    pub fn copy_weights(
        self,
        target: SEBlock<B>,
    ) -> anyhow::Result<SEBlock<B>> {
        Ok(SEBlock {
            cna1: copy_cna_weights(self.conv1, self.bn1, target.cna1)?,
            cna2: copy_cna_weights(self.conv2, self.bn2, target.cna2)?,
            cna3: copy_cna_weights(self.conv3, self.bn3, target.cna3)?,
            se: self.se.copy_weights(target.se),
            downsample: copy_downsample_weights(self.downsample, target.downsample)?,
            ..target
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::normalization_wrapper::NormalizationConfig;
    use crate::models::senet::senet_model::{SENetAbstractConfig, SENetHeadPool};
    use burn::backend::NdArray;
    use burn::nn::GroupNormConfig;
    use burn::nn::conv::Conv2dConfig;
    use burn::prelude::Tensor;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    fn tiny_senet(normalization: NormalizationConfig) -> SENet<B> {
        SENetAbstractConfig::new([1, 2, 1, 1])
            .with_cardinality(2)
            .with_bottleneck_width(32)
            .with_stem_width(8)
            .with_num_classes(4)
            .with_head_pool(SENetHeadPool::Adaptive)
            .with_normalization(normalization)
            .to_structure()
            .init(&Default::default())
    }

    /// Build a stub record with the same parameter layout as a model.
    fn stub_record_for(model: &SENet<B>) -> SENetStubRecord<B> {
        let device = Default::default();
        let conv_record = |conv: &Conv2d<B>| conv.clone().into_record();
        let bn_record = |norm: &Normalization<B>| match norm {
            Normalization::Batch(bn) => {
                let bn = bn.clone();
                let gamma = Tensor::random(bn.gamma.dims(), Distribution::Default, &device);
                BatchNorm {
                    gamma: bn.gamma.map(|_| gamma),
                    ..bn
                }
                .into_record()
            }
            _ => unreachable!(),
        };

        SENetStubRecord {
            stem: StemStubRecord {
                conv1: conv_record(&model.stem.conv1),
                conv2: conv_record(&model.stem.conv2),
                conv3: conv_record(&model.stem.cna3.conv_norm.conv),
                bn: bn_record(&model.stem.cna3.conv_norm.norm),
            },
            stages: model
                .stages
                .iter()
                .map(|stage| StageStubRecord {
                    blocks: stage
                        .blocks
                        .iter()
                        .map(|block| BlockStubRecord {
                            conv1: conv_record(&block.cna1.conv_norm.conv),
                            bn1: bn_record(&block.cna1.conv_norm.norm),
                            conv2: conv_record(&block.cna2.conv_norm.conv),
                            bn2: bn_record(&block.cna2.conv_norm.norm),
                            conv3: conv_record(&block.cna3.conv_norm.conv),
                            bn3: bn_record(&block.cna3.conv_norm.norm),
                            se: SEStubRecord {
                                fc1: block.se.fc1.clone().into_record(),
                                fc2: block.se.fc2.clone().into_record(),
                            },
                            downsample: block.downsample.as_ref().map(|d| DownsampleStubRecord {
                                conv: conv_record(&d.conv),
                                bn: bn_record(&d.norm),
                            }),
                        })
                        .collect(),
                })
                .collect(),
            fc: model.fc.clone().into_record(),
        }
    }

    #[test]
    fn test_copy_weights() {
        let source = tiny_senet(NormalizationConfig::batch());
        let record = stub_record_for(&source);

        let expected_gamma = record.stages[1].blocks[1].bn2.gamma.val();
        let expected_fc = record.fc.weight.val();

        let target = tiny_senet(NormalizationConfig::batch());
        let target = record.copy_weights(target).unwrap();

        match &target.stages[1].blocks[1].cna2.conv_norm.norm {
            Normalization::Batch(bn) => bn
                .gamma
                .val()
                .into_data()
                .assert_eq(&expected_gamma.into_data(), true),
            _ => unreachable!(),
        }
        target
            .fc
            .weight
            .val()
            .into_data()
            .assert_eq(&expected_fc.into_data(), true);
    }

    #[test]
    fn test_copy_weights_stage_mismatch() {
        let source = tiny_senet(NormalizationConfig::batch());
        let mut record = stub_record_for(&source);
        record.stages.pop();

        let err = record
            .copy_weights(tiny_senet(NormalizationConfig::batch()))
            .unwrap_err();
        assert!(err.to_string().contains("Checkpoint has 3 stages"), "{err}");
    }

    #[test]
    fn test_copy_weights_rejects_non_batch_norm() {
        let source = tiny_senet(NormalizationConfig::batch());
        let record = stub_record_for(&source);

        let device = Default::default();
        let target: ConvNorm2d<B> = crate::layers::blocks::conv_norm::ConvNorm2dConfig::new(
            Conv2dConfig::new([3, 8], [3, 3]),
        )
        .with_norm(GroupNormConfig::new(2, 8).into())
        .init(&device);

        let err = copy_conv_norm_weights(record.stem.conv1, record.stem.bn, target).unwrap_err();
        assert!(err.to_string().contains("cannot be applied"), "{err}");
    }
}

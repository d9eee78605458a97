//! # `SENet` / SE-ResNeXt
//!
//! See "Squeeze-and-Excitation Networks" <https://arxiv.org/abs/1709.01507>,
//! and "Aggregated Residual Transformations for Deep Neural Networks"
//! <https://arxiv.org/abs/1611.05431>.
//!
//! * [`se_block`] - the bottleneck residual unit, gated by SE.
//! * [`stage`] - a sequence of blocks at one resolution.
//! * [`stem`] - the 3-conv input stem.
//! * [`senet_model`] - the full model, and its configs.
//! * [`zoo`] - named constructors.
//! * [`prefabs`] - the prefab registry.
//! * [`loader`] - initialize, and load weights.

pub mod loader;
pub mod prefabs;
pub mod se_block;
pub mod senet_io;
pub mod senet_model;
pub mod stage;
pub mod stem;
pub mod zoo;

pub use loader::SENetLoader;
pub use prefabs::PREFAB_SENET_MAP;
pub use senet_io::{WeightsFormat, WeightsSource};
pub use senet_model::{SENet, SENetAbstractConfig, SENetConfig, SENetHeadPool};
pub use zoo::{get_senet, pretrained_weights_name, senet_52, senet_103, senet_154};

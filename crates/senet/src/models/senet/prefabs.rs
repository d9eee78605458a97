//! # Well-Known `SENet` Configs

use crate::cache::prefabs::{PreFabConfig, StaticPreFabConfig, StaticPreFabMap};
use crate::models::senet::senet_model::{SENetAbstractConfig, SENetConfig};
use crate::models::senet::zoo::{senet_52, senet_103, senet_154};
use std::sync::Arc;

impl PreFabConfig<SENetAbstractConfig> {
    /// Convert to a prefab for [`SENetConfig`].
    pub fn to_structure_prefab(&self) -> PreFabConfig<SENetConfig> {
        let builder = self.builder.clone();
        PreFabConfig {
            name: self.name.clone(),
            description: self.description.clone(),
            builder: Arc::new(move || builder().to_structure()),
            weights: self.weights.clone(),
        }
    }
}

impl From<&StaticPreFabConfig<SENetAbstractConfig>> for PreFabConfig<SENetConfig> {
    fn from(config: &StaticPreFabConfig<SENetAbstractConfig>) -> Self {
        config.to_prefab().to_structure_prefab()
    }
}

/// Well-known [`super::SENet`] configs.
///
/// No weights are registered; pass a file or URL to the loader.
pub static PREFAB_SENET_MAP: StaticPreFabMap<SENetAbstractConfig> = StaticPreFabMap {
    name: "senet",
    description: "Well-Known SENet configs",

    items: &[
        &StaticPreFabConfig {
            name: "senet_52",
            description: "SE-ResNeXt-50 32x4d [3, 4, 6, 3]",
            builder: senet_52,
            weights: None,
        },
        &StaticPreFabConfig {
            name: "senet_103",
            description: "SE-ResNeXt-101 32x4d [3, 4, 23, 3]",
            builder: senet_103,
            weights: None,
        },
        &StaticPreFabConfig {
            name: "senet_154",
            description: "SENet-154 64x4d [3, 8, 36, 3]",
            builder: senet_154,
            weights: None,
        },
    ],
};

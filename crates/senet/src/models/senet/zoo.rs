//! # `SENet` Model Zoo Constructors
//!
//! | constructor   | layers | cardinality | bottleneck width |
//! |---------------|--------|-------------|------------------|
//! | [`senet_52`]  | 50     | 32          | 4                |
//! | [`senet_103`] | 101    | 32          | 4                |
//! | [`senet_154`] | 152    | 64          | 4                |

use crate::models::senet::senet_model::{
    SENET_DEFAULT_BOTTLENECK_WIDTH, SENET_DEFAULT_CARDINALITY, SENetAbstractConfig,
};
use anyhow::bail;

/// SENet-50 stage depths.
pub const SENET50_LAYERS: [usize; 4] = [3, 4, 6, 3];
/// SENet-101 stage depths.
pub const SENET101_LAYERS: [usize; 4] = [3, 4, 23, 3];
/// SENet-152 stage depths.
pub const SENET152_LAYERS: [usize; 4] = [3, 8, 36, 3];

/// Supported ``(num_layers, stage depths)`` pairs.
pub const SENET_LAYER_SPECS: [(usize, [usize; 4]); 3] = [
    (50, SENET50_LAYERS),
    (101, SENET101_LAYERS),
    (152, SENET152_LAYERS),
];

/// Lookup the stage depths for a layer count.
pub fn senet_layer_spec(num_layers: usize) -> Option<[usize; 4]> {
    SENET_LAYER_SPECS
        .iter()
        .find(|(n, _)| *n == num_layers)
        .map(|(_, layers)| *layers)
}

/// Build a [`SENetAbstractConfig`] for a layer count.
///
/// # Arguments
///
/// - `num_layers`: one of ``[50, 101, 152]``.
/// - `cardinality`: conv groups of the 3x3 body convs.
/// - `bottleneck_width`: per-group width, relative to 64 base channels.
///
/// # Errors
///
/// If `num_layers` is not a supported layer count.
pub fn get_senet(
    num_layers: usize,
    cardinality: usize,
    bottleneck_width: usize,
) -> anyhow::Result<SENetAbstractConfig> {
    let Some(layers) = senet_layer_spec(num_layers) else {
        let options = SENET_LAYER_SPECS
            .iter()
            .map(|(n, _)| n.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        bail!("Invalid number of layers: {num_layers}. Options are [{options}]");
    };

    Ok(SENetAbstractConfig::new(layers)
        .with_cardinality(cardinality)
        .with_bottleneck_width(bottleneck_width))
}

/// Name of the published weights file for a config.
///
/// ``resnext{num_layers}_{cardinality}x{bottleneck_width}d``
pub fn pretrained_weights_name(
    num_layers: usize,
    cardinality: usize,
    bottleneck_width: usize,
) -> String {
    format!("resnext{num_layers}_{cardinality}x{bottleneck_width}d")
}

/// SENet-52: 50 layers, 32x4d.
pub fn senet_52() -> SENetAbstractConfig {
    SENetAbstractConfig::new(SENET50_LAYERS)
        .with_cardinality(32)
        .with_bottleneck_width(4)
}

/// SENet-103: 101 layers, 32x4d.
pub fn senet_103() -> SENetAbstractConfig {
    SENetAbstractConfig::new(SENET101_LAYERS)
        .with_cardinality(32)
        .with_bottleneck_width(4)
}

/// SENet-154: 152 layers, 64x4d.
pub fn senet_154() -> SENetAbstractConfig {
    SENetAbstractConfig::new(SENET152_LAYERS)
        .with_cardinality(SENET_DEFAULT_CARDINALITY)
        .with_bottleneck_width(SENET_DEFAULT_BOTTLENECK_WIDTH)
}

//! # `SENet` Model Loader
//!
//! ```rust,ignore
//! let model: SENet<B> = SENetLoader::new(senet_52())
//!     .with_pretrained(Some("weights/senet_52.mpk".parse()?))
//!     .with_classes(Some(10))
//!     .load(&device)?;
//! ```

use crate::cache::disk::DiskCacheConfig;
use crate::models::senet::senet_io::WeightsSource;
use crate::models::senet::senet_model::{SENet, SENetConfig};
use burn::prelude::Backend;

/// Builder for initialized, optionally pretrained, [`SENet`] models.
#[derive(Debug, Clone)]
pub struct SENetLoader {
    /// The model structure.
    pub config: SENetConfig,

    /// Weights to load after initialization.
    pub pretrained: Option<WeightsSource>,

    /// Cache for remote weights.
    pub disk_cache: DiskCacheConfig,

    /// Re-initialize the classifier for this many classes, after loading.
    pub num_classes: Option<usize>,
}

impl SENetLoader {
    /// Create a loader for a config.
    pub fn new<C: Into<SENetConfig>>(config: C) -> Self {
        Self {
            config: config.into(),
            pretrained: None,
            disk_cache: DiskCacheConfig::default(),
            num_classes: None,
        }
    }

    /// Set the weights source.
    pub fn with_pretrained(
        self,
        pretrained: Option<WeightsSource>,
    ) -> Self {
        Self { pretrained, ..self }
    }

    /// Set the disk cache.
    pub fn with_disk_cache(
        self,
        disk_cache: DiskCacheConfig,
    ) -> Self {
        Self { disk_cache, ..self }
    }

    /// Set the number of output classes, applied after loading.
    ///
    /// The config's own class count must match the pretrained weights.
    pub fn with_classes(
        self,
        num_classes: Option<usize>,
    ) -> Self {
        Self {
            num_classes,
            ..self
        }
    }

    /// Initialize the model, and load any pretrained weights.
    pub fn load<B: Backend>(
        self,
        device: &B::Device,
    ) -> anyhow::Result<SENet<B>> {
        let model: SENet<B> = self.config.init(device);

        let model = match &self.pretrained {
            None => model,
            Some(source) => {
                tracing::debug!(%source, "resolving SENet weights");
                let path = source.fetch(&self.disk_cache)?;
                model.load_weights(path)?
            }
        };

        Ok(match self.num_classes {
            Some(num_classes) => model.with_classes(num_classes),
            None => model,
        })
    }
}

//! # `SENet` Weights I/O
//!
//! Weights files are dispatched on their extension; see [`WeightsFormat`].
//! Remote sources are read through the disk cache; see [`WeightsSource`].

#[cfg(feature = "pytorch")]
pub mod pytorch_stubs;

use crate::cache::disk::DiskCacheConfig;
use crate::cache::weights::{PretrainedWeightsDescriptor, fetch_url_weights_to_disk_cache};
use crate::models::senet::senet_model::SENet;
use crate::utility::record::{check_tensor_shapes, module_tensor_shapes};
use anyhow::{Context, bail};
use burn::module::Module;
use burn::prelude::Backend;
use burn::record::{BinFileRecorder, FullPrecisionSettings, NamedMpkFileRecorder};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Supported weights file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightsFormat {
    /// ``.mpk``: burn named message-pack record.
    NamedMpk,

    /// ``.bin``: burn binary record.
    Bin,

    /// ``.pt`` / ``.pth``: PyTorch checkpoint.
    PyTorch,
}

impl WeightsFormat {
    /// Infer the format from a path extension.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());
        match ext.as_deref() {
            Some("mpk") => Ok(Self::NamedMpk),
            Some("bin") => Ok(Self::Bin),
            Some("pt") | Some("pth") => Ok(Self::PyTorch),
            _ => bail!(
                "Unsupported weights format: {} (expected .mpk, .bin, .pt, or .pth)",
                path.display()
            ),
        }
    }
}

/// A source of model weights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightsSource {
    /// A local weights file.
    File(PathBuf),

    /// A remote weights file, read through the disk cache.
    Url(String),

    /// A registered weights descriptor, read through the disk cache.
    Descriptor(PretrainedWeightsDescriptor),
}

impl FromStr for WeightsSource {
    type Err = anyhow::Error;

    /// Parse ``http(s)://`` sources as URLs, and anything else as a file path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            bail!("Empty weights source");
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            Ok(Self::Url(s.to_string()))
        } else {
            Ok(Self::File(PathBuf::from(s)))
        }
    }
}

impl From<PathBuf> for WeightsSource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

impl From<PretrainedWeightsDescriptor> for WeightsSource {
    fn from(descriptor: PretrainedWeightsDescriptor) -> Self {
        Self::Descriptor(descriptor)
    }
}

impl Display for WeightsSource {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Url(url) => write!(f, "{url}"),
            Self::Descriptor(desc) => write!(f, "{}", desc.name),
        }
    }
}

impl WeightsSource {
    /// Resolve the source to a local file, downloading if needed.
    pub fn fetch(
        &self,
        disk_cache: &DiskCacheConfig,
    ) -> anyhow::Result<PathBuf> {
        match self {
            Self::File(path) => {
                if !path.is_file() {
                    bail!("Weights file not found: {}", path.display());
                }
                Ok(path.clone())
            }
            Self::Url(url) => fetch_url_weights_to_disk_cache(url, disk_cache),
            Self::Descriptor(desc) => desc.fetch_weights(disk_cache),
        }
    }
}

impl<B: Backend> SENet<B> {
    /// Load weights from a file, dispatching on its [`WeightsFormat`].
    ///
    /// # Errors
    ///
    /// If the file can't be read, or if its tensor shapes don't match the model's,
    /// such as a checkpoint with a different number of classes.
    pub fn load_weights<P: AsRef<Path>>(
        self,
        path: P,
    ) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let format = WeightsFormat::from_path(path)?;
        let device = self.fc.weight.device();
        let expected_shapes = module_tensor_shapes(&self);

        tracing::info!(path = %path.display(), ?format, "loading SENet weights");

        let model = match format {
            WeightsFormat::NamedMpk => self.load_file(
                path.to_path_buf(),
                &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
                &device,
            )?,
            WeightsFormat::Bin => self.load_file(
                path.to_path_buf(),
                &BinFileRecorder::<FullPrecisionSettings>::new(),
                &device,
            )?,
            WeightsFormat::PyTorch => self.load_pytorch_weights(path.to_path_buf())?,
        };

        check_tensor_shapes(&expected_shapes, &module_tensor_shapes(&model)).with_context(|| {
            format!(
                "Weights do not match the model structure: {}",
                path.display()
            )
        })?;

        Ok(model)
    }

    /// Load weights from a PyTorch checkpoint.
    #[cfg(feature = "pytorch")]
    pub fn load_pytorch_weights(
        self,
        path: PathBuf,
    ) -> anyhow::Result<Self> {
        pytorch_stubs::load_pytorch_weights(self, path, &[])
    }

    /// Load weights from a PyTorch checkpoint.
    #[cfg(not(feature = "pytorch"))]
    pub fn load_pytorch_weights(
        self,
        path: PathBuf,
    ) -> anyhow::Result<Self> {
        bail!(
            "PyTorch weights require the \"pytorch\" feature: {}",
            path.display()
        )
    }

    /// Save weights to a file.
    ///
    /// Only the burn record formats (``.mpk``, ``.bin``) can be written.
    pub fn save_weights<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> anyhow::Result<()> {
        let path = path.as_ref();
        let format = WeightsFormat::from_path(path)?;

        tracing::info!(path = %path.display(), ?format, "saving SENet weights");

        match format {
            WeightsFormat::NamedMpk => self.clone().save_file(
                path.to_path_buf(),
                &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
            ),
            WeightsFormat::Bin => self
                .clone()
                .save_file(path.to_path_buf(), &BinFileRecorder::<FullPrecisionSettings>::new()),
            WeightsFormat::PyTorch => {
                bail!("Saving PyTorch checkpoints is not supported: {}", path.display())
            }
        }
        .with_context(|| format!("Failed to save weights: {}", path.display()))
    }
}

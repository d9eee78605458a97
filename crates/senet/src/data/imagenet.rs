//! # `ImageNet` Folder Dataset
//!
//! Expected layout:
//!
//! ```text
//! {root}/train/{class}/*.{jpeg,jpg,png}
//! {root}/val/{class}/*.{jpeg,jpg,png}
//! ```
//!
//! Classes are the sorted class directory names (the synset ids,
//! such as ``n01440764``, for `ImageNet`), and labels are class indices.

use anyhow::{Context, bail};
use burn::config::Config;
use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// [`ImageNet`] Config.
#[derive(Config, Debug)]
pub struct ImageNetConfig {
    /// Dataset root; contains the ``train`` and ``val`` splits.
    pub root: PathBuf,

    /// Select the ``train`` split, or the ``val`` split.
    #[config(default = "true")]
    pub train: bool,

    /// Accepted image file extensions, matched case-insensitively.
    #[config(default = "vec![\"jpeg\".to_string(), \"jpg\".to_string(), \"png\".to_string()]")]
    pub extensions: Vec<String>,
}

impl ImageNetConfig {
    /// The split directory.
    pub fn split_dir(&self) -> PathBuf {
        self.root.join(if self.train { "train" } else { "val" })
    }

    /// Scan the split directory.
    pub fn init(&self) -> anyhow::Result<ImageNet> {
        ImageNet::scan(self)
    }
}

/// A lazily decoded [`ImageNet`] sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageNetItem {
    /// Image file path.
    pub path: PathBuf,

    /// Class index.
    pub label: usize,
}

/// `ImageNet` classification dataset.
#[derive(Debug, Clone)]
pub struct ImageNet {
    split_dir: PathBuf,
    classes: Vec<String>,
    items: Vec<ImageNetItem>,
}

fn list_class_dirs(split_dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut classes = Vec::new();
    for entry in std::fs::read_dir(split_dir)
        .with_context(|| format!("Failed to read split dir: {}", split_dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            classes.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    classes.sort();
    Ok(classes)
}

fn list_class_images(
    class_dir: &Path,
    extensions: &[String],
) -> anyhow::Result<Vec<PathBuf>> {
    let pattern = format!("*.{{{}}}", extensions.join(","));
    let walker = globwalk::GlobWalkerBuilder::from_patterns(class_dir, &[pattern.as_str()])
        .max_depth(1)
        .case_insensitive(true)
        .file_type(globwalk::FileType::FILE)
        .build()?;

    let mut paths = walker
        .filter_map(Result::ok)
        .map(|entry| entry.into_path())
        .collect::<Vec<_>>();
    paths.sort();
    Ok(paths)
}

impl ImageNet {
    /// Scan a dataset split.
    ///
    /// # Errors
    ///
    /// If the split directory is missing, or contains no images.
    pub fn scan(config: &ImageNetConfig) -> anyhow::Result<Self> {
        let split_dir = config.split_dir();
        if !split_dir.is_dir() {
            bail!("Dataset split not found: {}", split_dir.display());
        }
        if config.extensions.is_empty() {
            bail!("No image extensions configured");
        }

        let classes = list_class_dirs(&split_dir)?;

        let mut items = Vec::new();
        for (label, class) in classes.iter().enumerate() {
            let images = list_class_images(&split_dir.join(class), &config.extensions)?;
            if images.is_empty() {
                tracing::warn!(class, "class directory has no images");
            }
            items.extend(images.into_iter().map(|path| ImageNetItem { path, label }));
        }

        if items.is_empty() {
            bail!("No images found in split: {}", split_dir.display());
        }

        tracing::info!(
            split = %split_dir.display(),
            classes = classes.len(),
            samples = items.len(),
            "scanned ImageNet split"
        );

        Ok(Self {
            split_dir,
            classes,
            items,
        })
    }

    /// The scanned split directory.
    pub fn split_dir(&self) -> &Path {
        &self.split_dir
    }

    /// Class names, indexed by label.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// The class synset ids; the class directory names.
    pub fn synsets(&self) -> &[String] {
        self.classes()
    }

    /// Number of classes.
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }
}

impl Dataset<ImageNetItem> for ImageNet {
    fn get(
        &self,
        index: usize,
    ) -> Option<ImageNetItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::fs;

    /// Write ``{root}/{split}/{class}/{name}`` fixture images.
    pub(crate) fn write_fixture(
        root: &Path,
        split: &str,
        files: &[(&str, &str)],
    ) {
        for (idx, (class, name)) in files.iter().enumerate() {
            let dir = root.join(split).join(class);
            fs::create_dir_all(&dir).unwrap();
            let shade = (idx * 40 % 256) as u8;
            RgbImage::from_pixel(12, 10, Rgb([shade, 64, 128]))
                .save(dir.join(name))
                .unwrap();
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = ImageNetConfig::new(PathBuf::from("/data/imagenet"));
        assert!(config.train);
        assert_eq!(config.extensions, vec!["jpeg", "jpg", "png"]);
        assert_eq!(config.split_dir(), PathBuf::from("/data/imagenet/train"));
        assert_eq!(
            config.with_train(false).split_dir(),
            PathBuf::from("/data/imagenet/val")
        );
    }

    #[test]
    fn test_scan() {
        let tmp = tempfile::tempdir().unwrap();
        write_fixture(
            tmp.path(),
            "train",
            &[
                ("n02", "b.png"),
                ("n01", "z.png"),
                ("n01", "a.PNG"),
                ("n03", "c.jpg"),
            ],
        );
        fs::write(tmp.path().join("train/n01/notes.txt"), "not an image").unwrap();

        let dataset = ImageNetConfig::new(tmp.path().to_path_buf())
            .init()
            .unwrap();

        assert_eq!(dataset.classes(), &["n01", "n02", "n03"]);
        assert_eq!(dataset.synsets(), dataset.classes());
        assert_eq!(dataset.num_classes(), 3);
        assert_eq!(dataset.len(), 4);

        let labels = dataset.iter().map(|item| item.label).collect::<Vec<_>>();
        assert_eq!(labels, vec![0, 0, 1, 2]);

        let first = dataset.get(0).unwrap();
        assert!(first.path.ends_with("n01/a.PNG"));
        assert!(dataset.get(4).is_none());
    }

    #[test]
    fn test_scan_val_split() {
        let tmp = tempfile::tempdir().unwrap();
        write_fixture(tmp.path(), "val", &[("n01", "a.png")]);

        let config = ImageNetConfig::new(tmp.path().to_path_buf());
        assert!(config.init().is_err());

        let dataset = config.with_train(false).init().unwrap();
        assert_eq!(dataset.len(), 1);
        assert!(dataset.split_dir().ends_with("val"));
    }

    #[test]
    fn test_scan_empty_split() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("train/n01")).unwrap();

        let err = ImageNetConfig::new(tmp.path().to_path_buf())
            .init()
            .unwrap_err();
        assert!(err.to_string().contains("No images found"), "{err}");
    }
}

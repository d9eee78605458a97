#![recursion_limit = "256"]

use burn::backend::NdArray;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};
use burn::tensor::activation::softmax;
use clap::{Parser, ValueEnum};
use senet::cache::disk::DiskCacheConfig;
use senet::data::transforms::ClassificationTransformConfig;
use senet::models::senet::{
    PREFAB_SENET_MAP, SENet, SENetHeadPool, SENetLoader, WeightsSource,
};
use senet::utility::record::record_tensor_shapes;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(ValueEnum, Debug, Clone, Copy)]
enum HeadPool {
    /// 7x7 average pool; needs 224x224 inputs.
    Fixed,
    /// Global average pool.
    Adaptive,
}

impl From<HeadPool> for SENetHeadPool {
    fn from(pool: HeadPool) -> Self {
        match pool {
            HeadPool::Fixed => SENetHeadPool::Fixed(7),
            HeadPool::Adaptive => SENetHeadPool::Adaptive,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Prefab name, ``{prefab}`` or ``{prefab}.{weights}``; or ``list``.
    #[arg(long, default_value = "senet_52")]
    prefab: String,

    /// Weights file path or URL.
    #[arg(long)]
    weights: Option<String>,

    /// Re-initialize the classifier for this many classes, after loading.
    ///
    /// The model is built with the prefab's class count, to match its weights.
    #[arg(long)]
    num_classes: Option<usize>,

    #[arg(long, value_enum, default_value = "fixed")]
    head_pool: HeadPool,

    /// Directory of images to classify.
    #[arg(long)]
    images: Option<PathBuf>,

    /// Number of predictions to print per image.
    #[arg(long, default_value = "5")]
    top_k: usize,

    /// Override the weights cache directory.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Print the tensor shapes of the model record.
    #[arg(long)]
    describe: bool,
}

fn list_prefabs() {
    println!("{}: {}", PREFAB_SENET_MAP.name, PREFAB_SENET_MAP.description);
    for prefab in PREFAB_SENET_MAP.items {
        println!("  {:<12} {}", prefab.name, prefab.description);
    }
}

fn list_images(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let walker = globwalk::GlobWalkerBuilder::from_patterns(dir, &["*.{jpeg,jpg,png}"])
        .case_insensitive(true)
        .build()?;
    let mut paths = walker
        .filter_map(Result::ok)
        .map(|entry| entry.into_path())
        .collect::<Vec<_>>();
    paths.sort();
    Ok(paths)
}

fn classify<B: Backend>(
    model: &SENet<B>,
    dir: &Path,
    top_k: usize,
    device: &B::Device,
) -> anyhow::Result<()> {
    let transform = ClassificationTransformConfig::new();
    let crop = transform.crop as usize;

    for path in list_images(dir)? {
        let image = match image::open(&path) {
            Ok(image) => image,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "skipping image");
                continue;
            }
        };

        let input: Tensor<B, 4> = Tensor::<B, 3>::from_data(transform.apply(&image)?, device)
            .reshape([1, 3, crop, crop]);
        let probs = softmax(model.forward(input), 1)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("{e:?}"))?;

        let mut ranked = probs.iter().copied().enumerate().collect::<Vec<_>>();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        println!("{}", path.display());
        for (class, prob) in ranked.into_iter().take(top_k) {
            println!("  class {class:>4}: {prob:.4}");
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if args.prefab == "list" {
        list_prefabs();
        return Ok(());
    }

    type B = NdArray<f32>;
    let device = Default::default();

    let (prefab, descriptor) = PREFAB_SENET_MAP.try_lookup_prefab_and_weights(&args.prefab)?;
    let config = prefab.to_config().with_head_pool(args.head_pool.into());

    let pretrained = match &args.weights {
        Some(weights) => Some(weights.parse::<WeightsSource>()?),
        None => descriptor.map(WeightsSource::from),
    };

    let disk_cache = DiskCacheConfig::new().with_root_dir(args.cache_dir.clone());

    tracing::info!(prefab = %prefab.name, "building model");
    let model: SENet<B> = SENetLoader::new(config)
        .with_pretrained(pretrained)
        .with_disk_cache(disk_cache)
        .with_classes(args.num_classes)
        .load(&device)?;

    println!(
        "{}: {} params, {} features, {} classes",
        prefab.name,
        model.num_params(),
        model.num_features(),
        model.num_classes()
    );

    if args.describe {
        for (path, shape) in record_tensor_shapes::<B, _>(model.clone().into_record())? {
            println!("  {path}: {shape:?}");
        }
    }

    if let Some(dir) = &args.images {
        classify(&model, dir, args.top_k, &device)?;
    }

    Ok(())
}

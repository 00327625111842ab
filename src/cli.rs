use std::path::PathBuf;

use burn::backend::wgpu::WgpuDevice;
use clap::{Args, ValueEnum};

use crate::{
    config::{Architecture, DatasetKind, RunPaths, TrainingConfig},
    error::Result,
};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Wgpu,
    Ndarray,
}

/// Flags shared by the binaries. Every flag left out keeps the value from
/// `--config`, or the built-in default when no file is given.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// JSON configuration to start from (as written next to checkpoints).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Directory holding `data/` and `ckpt/`.
    #[arg(long = "project-dir")]
    pub project_dir: Option<PathBuf>,
    /// cifar10 or cifar100.
    #[arg(long)]
    pub dataset: Option<DatasetKind>,
    /// Path to the dataset folder.
    #[arg(long)]
    pub dataroot: Option<PathBuf>,
    /// vgg, vgg11, vgg13, vgg16, vgg19, resnet20, resnet32, resnet56, ...
    #[arg(long)]
    pub model: Option<Architecture>,
    /// 1 to start from pretrained weights.
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=1))]
    pub pretrained: Option<u8>,
    /// Pretrained checkpoint to load instead of the default one.
    #[arg(long = "pretrained-path")]
    pub pretrained_path: Option<PathBuf>,
    #[arg(long = "batch_size", alias = "batch-size")]
    pub batch_size: Option<usize>,
    #[arg(long = "test_batch_size", alias = "test-batch-size")]
    pub test_batch_size: Option<usize>,
    /// Index of the GPU to use.
    #[arg(long)]
    pub gpus: Option<usize>,
    /// Number of data loading workers for evaluation.
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long)]
    pub epochs: Option<usize>,
    #[arg(long)]
    pub lr: Option<f64>,
    /// Test accuracy (percent) to beat before checkpoints are written.
    #[arg(long = "save_acc", alias = "save-acc")]
    pub save_acc: Option<f64>,
    #[arg(long = "label_smoothing", alias = "label-smoothing")]
    pub label_smoothing: Option<f64>,
    /// Warm-up epochs.
    #[arg(long = "warmup_step", alias = "warmup-step")]
    pub warmup_step: Option<usize>,
    #[arg(long = "warm_lr", alias = "warm-lr")]
    pub warm_lr: Option<f64>,
}

impl ConfigArgs {
    pub fn apply(&self, mut config: TrainingConfig) -> TrainingConfig {
        if let Some(dataset) = self.dataset {
            config.dataset = dataset;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(pretrained) = self.pretrained {
            config.pretrained = pretrained == 1;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(test_batch_size) = self.test_batch_size {
            config.test_batch_size = test_batch_size;
        }
        if self.gpus.is_some() {
            config.gpu = self.gpus;
        }
        if let Some(workers) = self.workers {
            config.num_workers = workers;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(epochs) = self.epochs {
            config.num_epochs = epochs;
        }
        if let Some(lr) = self.lr {
            config.learning_rate = lr;
        }
        if let Some(save_acc) = self.save_acc {
            config.save_acc = save_acc;
        }
        if let Some(label_smoothing) = self.label_smoothing {
            config.label_smoothing = label_smoothing;
        }
        if let Some(warmup_step) = self.warmup_step {
            config.warmup_step = warmup_step;
        }
        if let Some(warm_lr) = self.warm_lr {
            config.warm_lr = warm_lr;
        }
        config
    }

    /// Builds the validated configuration and the paths it implies.
    pub fn resolve(&self) -> Result<(TrainingConfig, RunPaths)> {
        let base = match &self.config {
            Some(path) => TrainingConfig::load_json(path)?,
            None => TrainingConfig::new(),
        };
        let config = self.apply(base);
        config.validate()?;

        let mut paths = RunPaths::resolve(self.project_dir.clone(), &config)?;
        if let Some(root) = &self.dataroot {
            paths = paths.with_dataset_root(root);
        }
        if let Some(pretrained) = &self.pretrained_path {
            paths = paths.with_pretrained(pretrained);
        }
        Ok((config, paths))
    }
}

pub fn wgpu_device(gpu: Option<usize>) -> WgpuDevice {
    match gpu {
        Some(index) => WgpuDevice::DiscreteGpu(index),
        None => WgpuDevice::default(),
    }
}

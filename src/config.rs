use std::{
    env, fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use burn::config::Config;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable naming the directory that holds `data/` and `ckpt/`.
pub const PROJECT_DIR_VAR: &str = "CIFAR_VGG_PROJECT_DIR";

/// Environment variable overriding the dataset root.
pub const DATASET_DIR_VAR: &str = "CIFAR_VGG_DATASET_DIR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Cifar10,
    Cifar100,
}

impl DatasetKind {
    pub fn name(&self) -> &'static str {
        match self {
            DatasetKind::Cifar10 => "cifar10",
            DatasetKind::Cifar100 => "cifar100",
        }
    }

    pub fn num_classes(&self) -> usize {
        match self {
            DatasetKind::Cifar10 => 10,
            DatasetKind::Cifar100 => 100,
        }
    }
}

impl FromStr for DatasetKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cifar10" => Ok(DatasetKind::Cifar10),
            "cifar100" => Ok(DatasetKind::Cifar100),
            _ => Err(Error::UnknownDataset(s.to_string())),
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VggVariant {
    Vgg11,
    Vgg13,
    Vgg16,
    Vgg19,
}

impl VggVariant {
    pub fn depth(&self) -> usize {
        match self {
            VggVariant::Vgg11 => 11,
            VggVariant::Vgg13 => 13,
            VggVariant::Vgg16 => 16,
            VggVariant::Vgg19 => 19,
        }
    }
}

/// Network family and size, parsed from names such as `vgg13` or `resnet56`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Architecture {
    Vgg(VggVariant),
    ResNet { depth: usize },
}

impl Architecture {
    pub fn name(&self) -> String {
        match self {
            Architecture::Vgg(variant) => format!("vgg{}", variant.depth()),
            Architecture::ResNet { depth } => format!("resnet{depth}"),
        }
    }
}

impl FromStr for Architecture {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        let unknown = || Error::UnknownModel(s.to_string());

        if let Some(depth) = name.strip_prefix("resnet") {
            let depth: usize = depth.parse().map_err(|_| unknown())?;
            // CIFAR ResNets stack 3 stages of n two-conv blocks plus stem and head.
            if depth < 8 || (depth - 2) % 6 != 0 {
                return Err(unknown());
            }
            return Ok(Architecture::ResNet { depth });
        }

        let variant = match name.as_str() {
            "vgg" | "vgg16" => VggVariant::Vgg16,
            "vgg11" => VggVariant::Vgg11,
            "vgg13" => VggVariant::Vgg13,
            "vgg19" => VggVariant::Vgg19,
            _ => return Err(unknown()),
        };
        Ok(Architecture::Vgg(variant))
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[derive(Config, Debug)]
pub struct TrainingConfig {
    #[config(default = "DatasetKind::Cifar100")]
    pub dataset: DatasetKind,
    #[config(default = "Architecture::Vgg(VggVariant::Vgg13)")]
    pub model: Architecture,
    #[config(default = false)]
    pub pretrained: bool,
    #[config(default = 128)]
    pub batch_size: usize,
    #[config(default = 256)]
    pub test_batch_size: usize,
    /// Index of the discrete GPU to train on; `None` picks the default device.
    pub gpu: Option<usize>,
    /// Loader threads for evaluation; training batches are always loaded in order.
    #[config(default = 4)]
    pub num_workers: usize,
    #[config(default = 0)]
    pub seed: u64,
    #[config(default = 30)]
    pub num_epochs: usize,
    #[config(default = 0.1)]
    pub learning_rate: f64,
    #[config(default = 0.0)]
    pub min_learning_rate: f64,
    #[config(default = 0.9)]
    pub momentum: f64,
    #[config(default = 5.0e-4)]
    pub weight_decay: f64,
    /// Test accuracy (percent) a run has to beat before anything is saved.
    #[config(default = 0.0)]
    pub save_acc: f64,
    #[config(default = 0.0)]
    pub label_smoothing: f64,
    /// Warm-up length in epochs.
    #[config(default = 0)]
    pub warmup_step: usize,
    #[config(default = 1.0e-4)]
    pub warm_lr: f64,
    #[config(default = false)]
    pub shuffle_train: bool,
}

impl TrainingConfig {
    pub fn num_classes(&self) -> usize {
        self.dataset.num_classes()
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));

        if self.batch_size == 0 || self.test_batch_size == 0 {
            return invalid("batch sizes must be positive".into());
        }
        if self.num_epochs == 0 {
            return invalid("epoch count must be positive".into());
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return invalid(format!("learning rate {} must lie in (0, 1]", self.learning_rate));
        }
        if self.min_learning_rate < 0.0 || self.min_learning_rate > self.learning_rate {
            return invalid(format!(
                "minimum learning rate {} must lie in [0, {}]",
                self.min_learning_rate, self.learning_rate
            ));
        }
        if !(0.0..1.0).contains(&self.label_smoothing) {
            return invalid(format!(
                "label smoothing {} must lie in [0, 1)",
                self.label_smoothing
            ));
        }
        if self.warmup_step >= self.num_epochs && self.warmup_step > 0 {
            return invalid(format!(
                "warm-up of {} epochs leaves nothing of a {}-epoch run",
                self.warmup_step, self.num_epochs
            ));
        }
        if self.warmup_step > 0 && !(self.warm_lr > 0.0 && self.warm_lr <= 1.0) {
            return invalid(format!("warm-up learning rate {} must lie in (0, 1]", self.warm_lr));
        }
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        TrainingConfig::load(path)
            .map_err(|err| Error::Config(format!("{}: {err:?}", path.display())))
    }
}

/// Filesystem locations a run reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub project_dir: PathBuf,
    pub dataset_root: PathBuf,
    pub save_dir: PathBuf,
    pub pretrained: PathBuf,
}

impl RunPaths {
    pub fn new(project_dir: impl Into<PathBuf>, config: &TrainingConfig) -> Self {
        let project_dir = project_dir.into();
        let model_dir = project_dir.join("ckpt").join(config.model.name());
        Self {
            dataset_root: project_dir.join("data"),
            save_dir: model_dir.join(config.dataset.name()),
            pretrained: model_dir.join("seed_0_acc_49.65.mpk"),
            project_dir,
        }
    }

    /// Resolves the project directory from the explicit argument, then the
    /// environment (including `.env`), then the current directory.
    pub fn resolve(project_dir: Option<PathBuf>, config: &TrainingConfig) -> Result<Self> {
        let project_dir = match project_dir {
            Some(dir) => dir,
            None => match dotenvy::var(PROJECT_DIR_VAR) {
                Ok(dir) => PathBuf::from(dir),
                Err(_) => env::current_dir().map_err(|err| Error::io(".", err))?,
            },
        };

        let mut paths = Self::new(project_dir, config);
        if let Ok(root) = dotenvy::var(DATASET_DIR_VAR) {
            paths.dataset_root = PathBuf::from(root);
        }
        Ok(paths)
    }

    pub fn with_dataset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.dataset_root = root.into();
        self
    }

    pub fn with_pretrained(mut self, path: impl Into<PathBuf>) -> Self {
        self.pretrained = path.into();
        self
    }
}

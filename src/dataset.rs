use std::{
    fs,
    path::{Path, PathBuf},
};

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::Backend,
    tensor::{Device, Int, Tensor, TensorData},
};

use crate::{
    config::DatasetKind,
    error::{Error, Result},
};

pub const IMG_SIZE: usize = 32;

pub const CHANNELS: usize = 3;

pub const IMAGE_BYTES: usize = CHANNELS * IMG_SIZE * IMG_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

/// Per-channel mean and standard deviation of the training images, in `[0, 1]` units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormStats {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl DatasetKind {
    pub fn norm_stats(&self) -> NormStats {
        match self {
            DatasetKind::Cifar10 => NormStats {
                mean: [125.31 / 255.0, 122.95 / 255.0, 113.87 / 255.0],
                std: [63.0 / 255.0, 62.09 / 255.0, 66.70 / 255.0],
            },
            DatasetKind::Cifar100 => NormStats {
                mean: [129.3 / 255.0, 124.1 / 255.0, 112.4 / 255.0],
                std: [68.2 / 255.0, 65.4 / 255.0, 70.4 / 255.0],
            },
        }
    }

    /// Directory the binary distribution unpacks to.
    fn binary_dir(&self) -> &'static str {
        match self {
            DatasetKind::Cifar10 => "cifar-10-batches-bin",
            DatasetKind::Cifar100 => "cifar-100-binary",
        }
    }

    fn files(&self, split: Split) -> Vec<&'static str> {
        match (self, split) {
            (DatasetKind::Cifar10, Split::Train) => vec![
                "data_batch_1.bin",
                "data_batch_2.bin",
                "data_batch_3.bin",
                "data_batch_4.bin",
                "data_batch_5.bin",
            ],
            (DatasetKind::Cifar10, Split::Test) => vec!["test_batch.bin"],
            (DatasetKind::Cifar100, Split::Train) => vec!["train.bin"],
            (DatasetKind::Cifar100, Split::Test) => vec!["test.bin"],
        }
    }

    /// Label bytes preceding the pixels of every record. CIFAR-100 stores the
    /// coarse label first and the fine label second.
    fn label_bytes(&self) -> usize {
        match self {
            DatasetKind::Cifar10 => 1,
            DatasetKind::Cifar100 => 2,
        }
    }

    pub fn record_len(&self) -> usize {
        self.label_bytes() + IMAGE_BYTES
    }

    pub fn split_paths(&self, root: &Path, split: Split) -> Vec<PathBuf> {
        let dir = root.join(self.binary_dir());
        self.files(split).into_iter().map(|f| dir.join(f)).collect()
    }
}

/// One 32x32 RGB image stored channel-planar, as in the CIFAR binary files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CifarItem {
    pub pixels: Vec<u8>,
    pub label: usize,
}

pub struct CifarDataset {
    kind: DatasetKind,
    items: Vec<CifarItem>,
}

impl CifarDataset {
    pub fn load(kind: DatasetKind, root: &Path, split: Split) -> Result<Self> {
        let mut items = Vec::new();
        for path in kind.split_paths(root, split) {
            let bytes = fs::read(&path).map_err(|err| Error::io(&path, err))?;
            items.extend(parse_records(kind, &bytes).map_err(|msg| {
                Error::Dataset(format!("{}: {msg}", path.display()))
            })?);
        }
        log::info!(
            "loaded {} {:?} images of {kind} from {}",
            items.len(),
            split,
            root.display()
        );
        Ok(Self { kind, items })
    }

    /// Wraps in-memory items, rejecting any that a file of `kind` could not hold.
    pub fn from_items(kind: DatasetKind, items: Vec<CifarItem>) -> Result<Self> {
        for (i, item) in items.iter().enumerate() {
            if item.pixels.len() != IMAGE_BYTES {
                return Err(Error::Dataset(format!(
                    "item {i} has {} pixel bytes, expected {IMAGE_BYTES}",
                    item.pixels.len()
                )));
            }
            if item.label >= kind.num_classes() {
                return Err(Error::Dataset(format!(
                    "item {i} has label {} outside {kind}",
                    item.label
                )));
            }
        }
        Ok(Self { kind, items })
    }

    pub fn kind(&self) -> DatasetKind {
        self.kind
    }
}

fn parse_records(kind: DatasetKind, bytes: &[u8]) -> std::result::Result<Vec<CifarItem>, String> {
    let record_len = kind.record_len();
    if bytes.len() % record_len != 0 {
        return Err(format!(
            "{} bytes is not a whole number of {record_len}-byte records",
            bytes.len()
        ));
    }

    let label_offset = kind.label_bytes() - 1;
    bytes
        .chunks_exact(record_len)
        .enumerate()
        .map(|(i, record)| {
            let label = record[label_offset] as usize;
            if label >= kind.num_classes() {
                return Err(format!("record {i} has label {label} outside {kind}"));
            }
            Ok(CifarItem {
                pixels: record[kind.label_bytes()..].to_vec(),
                label,
            })
        })
        .collect()
}

impl Dataset<CifarItem> for CifarDataset {
    fn get(&self, index: usize) -> Option<CifarItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

#[derive(Clone)]
pub struct Normalizer<B: Backend> {
    pub mean: Tensor<B, 4>,
    pub std: Tensor<B, 4>,
}

impl<B: Backend> Normalizer<B> {
    pub fn new(stats: NormStats, device: &Device<B>) -> Self {
        let mean = Tensor::<B, 1>::from_floats(stats.mean, device).reshape([1, 3, 1, 1]);
        let std = Tensor::<B, 1>::from_floats(stats.std, device).reshape([1, 3, 1, 1]);
        Self { mean, std }
    }

    pub fn normalize(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        (input - self.mean.clone()) / self.std.clone()
    }
}

#[derive(Clone)]
pub struct ClassificationBatcher<B: Backend> {
    normalizer: Normalizer<B>,
    device: B::Device,
}

#[derive(Debug, Clone)]
pub struct ClassificationBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> ClassificationBatcher<B> {
    pub fn new(stats: NormStats, device: B::Device) -> Self {
        Self {
            normalizer: Normalizer::<B>::new(stats, &device),
            device,
        }
    }
}

impl<B: Backend> Batcher<CifarItem, ClassificationBatch<B>> for ClassificationBatcher<B> {
    fn batch(&self, items: Vec<CifarItem>) -> ClassificationBatch<B> {
        let batch_size = items.len();
        let mut pixels = Vec::with_capacity(batch_size * IMAGE_BYTES);
        let mut labels = Vec::with_capacity(batch_size);

        for item in items {
            pixels.extend(item.pixels.iter().map(|&v| v as f32 / 255.0));
            labels.push(item.label as i64);
        }

        let images = TensorData::new(pixels, [batch_size, CHANNELS, IMG_SIZE, IMG_SIZE]);
        let images = Tensor::<B, 4>::from_data(images.convert::<B::FloatElem>(), &self.device);
        let images = self.normalizer.normalize(images);

        let targets = TensorData::new(labels, [batch_size]);
        let targets = Tensor::<B, 1, Int>::from_data(targets.convert::<B::IntElem>(), &self.device);

        ClassificationBatch { images, targets }
    }
}

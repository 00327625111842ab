use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use burn::data::dataset::Dataset;
use image::{imageops, Rgb, RgbImage};
use rand::Rng;

use crate::{
    dataset::{CifarItem, Split, IMG_SIZE},
    seed::SeedSequence,
};

/// Epoch counter shared between the training loop and the augmenting dataset.
#[derive(Debug, Clone, Default)]
pub struct EpochHandle(Arc<AtomicUsize>);

impl EpochHandle {
    pub fn set(&self, epoch: usize) {
        self.0.store(epoch, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomCrop {
    pub size: u32,
    pub padding: u32,
}

impl RandomCrop {
    pub fn apply(&self, img: &RgbImage, rng: &mut impl Rng) -> RgbImage {
        let padded_w = img.width() + 2 * self.padding;
        let padded_h = img.height() + 2 * self.padding;
        let mut padded = RgbImage::from_pixel(padded_w, padded_h, Rgb([0, 0, 0]));
        imageops::overlay(&mut padded, img, self.padding.into(), self.padding.into());

        let x = rng.gen_range(0..=padded_w - self.size);
        let y = rng.gen_range(0..=padded_h - self.size);
        imageops::crop_imm(&padded, x, y, self.size, self.size).to_image()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HorizontalFlip {
    pub probability: f64,
}

impl HorizontalFlip {
    pub fn apply(&self, img: RgbImage, rng: &mut impl Rng) -> RgbImage {
        if rng.gen_bool(self.probability) {
            imageops::flip_horizontal(&img)
        } else {
            img
        }
    }
}

/// Geometric augmentation applied before the batcher turns pixels into
/// normalized tensors.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TransformPipeline {
    pub crop: Option<RandomCrop>,
    pub flip: Option<HorizontalFlip>,
}

impl TransformPipeline {
    pub fn for_split(split: Split) -> Self {
        match split {
            Split::Train => Self {
                crop: Some(RandomCrop {
                    size: IMG_SIZE as u32,
                    padding: 4,
                }),
                flip: Some(HorizontalFlip { probability: 0.5 }),
            },
            Split::Test => Self::default(),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.crop.is_none() && self.flip.is_none()
    }

    pub fn apply(&self, item: CifarItem, rng: &mut impl Rng) -> CifarItem {
        if self.is_identity() {
            return item;
        }

        let mut img = to_image(&item.pixels);
        if let Some(crop) = &self.crop {
            img = crop.apply(&img, rng);
        }
        if let Some(flip) = &self.flip {
            img = flip.apply(img, rng);
        }

        CifarItem {
            pixels: to_planar(&img),
            label: item.label,
        }
    }
}

fn to_image(planar: &[u8]) -> RgbImage {
    let side = IMG_SIZE as u32;
    let plane = IMG_SIZE * IMG_SIZE;
    RgbImage::from_fn(side, side, |x, y| {
        let i = y as usize * IMG_SIZE + x as usize;
        Rgb([planar[i], planar[plane + i], planar[2 * plane + i]])
    })
}

fn to_planar(img: &RgbImage) -> Vec<u8> {
    let plane = (img.width() * img.height()) as usize;
    let mut planar = vec![0; 3 * plane];
    for (i, pixel) in img.pixels().enumerate() {
        for c in 0..3 {
            planar[c * plane + i] = pixel.0[c];
        }
    }
    planar
}

pub struct AugmentedDataset<D> {
    inner: D,
    pipeline: TransformPipeline,
    seeds: SeedSequence,
    epoch: EpochHandle,
}

impl<D> AugmentedDataset<D> {
    pub fn new(inner: D, pipeline: TransformPipeline, seeds: SeedSequence, epoch: EpochHandle) -> Self {
        Self {
            inner,
            pipeline,
            seeds,
            epoch,
        }
    }
}

impl<D: Dataset<CifarItem>> Dataset<CifarItem> for AugmentedDataset<D> {
    fn get(&self, index: usize) -> Option<CifarItem> {
        let item = self.inner.get(index)?;
        let mut rng = self.seeds.for_sample(self.epoch.get(), index);
        Some(self.pipeline.apply(item, &mut rng))
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};

use crate::{config::VggVariant, model::ImageClassifier};

impl VggVariant {
    /// Output channels of every 3x3 convolution, grouped by the stage that a
    /// 2x2 max-pool closes.
    pub fn stages(&self) -> &'static [&'static [usize]] {
        match self {
            VggVariant::Vgg11 => &[&[64], &[128], &[256, 256], &[512, 512], &[512, 512]],
            VggVariant::Vgg13 => &[
                &[64, 64],
                &[128, 128],
                &[256, 256],
                &[512, 512],
                &[512, 512],
            ],
            VggVariant::Vgg16 => &[
                &[64, 64],
                &[128, 128],
                &[256, 256, 256],
                &[512, 512, 512],
                &[512, 512, 512],
            ],
            VggVariant::Vgg19 => &[
                &[64, 64],
                &[128, 128],
                &[256, 256, 256, 256],
                &[512, 512, 512, 512],
                &[512, 512, 512, 512],
            ],
        }
    }
}

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B, 2>,
    activation: Relu,
}

impl<B: Backend> ConvBlock<B> {
    fn new(channels: [usize; 2], device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new(channels, [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device),
            norm: BatchNormConfig::new(channels[1]).init(device),
            activation: Relu::new(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.norm.forward(x);
        self.activation.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct VggStage<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
    pool: MaxPool2d,
}

#[derive(Module, Debug)]
pub struct Vgg<B: Backend> {
    stages: Vec<VggStage<B>>,
    classifier: Linear<B>,
    num_classes: usize,
}

#[derive(Config, Debug)]
pub struct VggConfig {
    variant: VggVariant,
    num_classes: usize,
}

impl VggConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Vgg<B> {
        let mut in_channels = 3;
        let mut stages = Vec::new();

        for widths in self.variant.stages() {
            let blocks = widths
                .iter()
                .map(|&out_channels| {
                    let block = ConvBlock::new([in_channels, out_channels], device);
                    in_channels = out_channels;
                    block
                })
                .collect();
            stages.push(VggStage {
                blocks,
                pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            });
        }

        Vgg {
            stages,
            classifier: LinearConfig::new(in_channels, self.num_classes).init(device),
            num_classes: self.num_classes,
        }
    }
}

impl<B: Backend> Vgg<B> {
    /// # Shapes
    ///   - `images` [batch_size, 3, 32, 32]
    ///   - output [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = images;
        for stage in &self.stages {
            for block in &stage.blocks {
                x = block.forward(x);
            }
            x = stage.pool.forward(x);
        }

        // Five halvings leave a 1x1 map for 32x32 inputs.
        let x = x.flatten::<2>(1, 3);
        self.classifier.forward(x)
    }

    pub fn conv_layers(&self) -> usize {
        self.stages.iter().map(|stage| stage.blocks.len()).sum()
    }
}

impl<B: Backend> ImageClassifier<B> for Vgg<B> {
    fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward(images)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;

    use super::*;

    type B = NdArray<f32>;

    #[test]
    fn variants_have_expected_depth() {
        for variant in [
            VggVariant::Vgg11,
            VggVariant::Vgg13,
            VggVariant::Vgg16,
            VggVariant::Vgg19,
        ] {
            let convs: usize = variant.stages().iter().map(|s| s.len()).sum();
            // The classic networks count three fully connected layers on top.
            assert_eq!(convs + 3, variant.depth());
        }
    }

    #[test]
    fn vgg13_for_cifar100_emits_100_logits() {
        let device = Default::default();
        let model = VggConfig::new(VggVariant::Vgg13, 100).init::<B>(&device);

        assert_eq!(model.conv_layers(), 10);
        assert_eq!(model.num_classes(), 100);

        let images = Tensor::<B, 4>::zeros([2, 3, 32, 32], &device);
        assert_eq!(model.forward(images).dims(), [2, 100]);
    }
}

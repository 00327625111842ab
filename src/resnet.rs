use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};

use crate::model::ImageClassifier;

const STAGE_WIDTHS: [usize; 3] = [16, 32, 64];

fn conv3x3<B: Backend>(channels: [usize; 2], stride: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new(channels, [3, 3])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_bias(false)
        .init(device)
}

/// 1x1 projection used when a block changes resolution or width.
#[derive(Module, Debug)]
pub struct Projection<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B, 2>,
}

#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    norm1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    norm2: BatchNorm<B, 2>,
    shortcut: Option<Projection<B>>,
    activation: Relu,
}

impl<B: Backend> BasicBlock<B> {
    fn new(channels: [usize; 2], stride: usize, device: &B::Device) -> Self {
        let [in_channels, out_channels] = channels;
        let shortcut = (stride != 1 || in_channels != out_channels).then(|| Projection {
            conv: Conv2dConfig::new(channels, [1, 1])
                .with_stride([stride, stride])
                .with_bias(false)
                .init(device),
            norm: BatchNormConfig::new(out_channels).init(device),
        });

        Self {
            conv1: conv3x3(channels, stride, device),
            norm1: BatchNormConfig::new(out_channels).init(device),
            conv2: conv3x3([out_channels, out_channels], 1, device),
            norm2: BatchNormConfig::new(out_channels).init(device),
            shortcut,
            activation: Relu::new(),
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.shortcut {
            Some(projection) => projection.norm.forward(projection.conv.forward(input.clone())),
            None => input.clone(),
        };

        let x = self.conv1.forward(input);
        let x = self.activation.forward(self.norm1.forward(x));
        let x = self.norm2.forward(self.conv2.forward(x));
        self.activation.forward(x + identity)
    }
}

#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    stem: Conv2d<B>,
    stem_norm: BatchNorm<B, 2>,
    blocks: Vec<BasicBlock<B>>,
    pool: AdaptiveAvgPool2d,
    fc: Linear<B>,
    activation: Relu,
    num_classes: usize,
}

/// CIFAR ResNet of depth `6n + 2`.
#[derive(Config, Debug)]
pub struct ResNetConfig {
    depth: usize,
    num_classes: usize,
}

impl ResNetConfig {
    pub fn blocks_per_stage(&self) -> usize {
        self.depth.saturating_sub(2) / 6
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNet<B> {
        let n = self.blocks_per_stage().max(1);
        let mut blocks = Vec::with_capacity(3 * n);
        let mut in_channels = STAGE_WIDTHS[0];

        for (stage, &width) in STAGE_WIDTHS.iter().enumerate() {
            for i in 0..n {
                let stride = if stage > 0 && i == 0 { 2 } else { 1 };
                blocks.push(BasicBlock::new([in_channels, width], stride, device));
                in_channels = width;
            }
        }

        ResNet {
            stem: conv3x3([3, STAGE_WIDTHS[0]], 1, device),
            stem_norm: BatchNormConfig::new(STAGE_WIDTHS[0]).init(device),
            blocks,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(in_channels, self.num_classes).init(device),
            activation: Relu::new(),
            num_classes: self.num_classes,
        }
    }
}

impl<B: Backend> ResNet<B> {
    /// # Shapes
    ///   - `images` [batch_size, 3, height, width]
    ///   - output [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.stem_norm.forward(self.stem.forward(images));
        let mut x = self.activation.forward(x);
        for block in &self.blocks {
            x = block.forward(x);
        }

        let x = self.pool.forward(x); // [batch_size, 64, 1, 1]
        self.fc.forward(x.flatten::<2>(1, 3))
    }

    pub fn depth(&self) -> usize {
        // Two convolutions per block, plus the stem and the classifier.
        2 * self.blocks.len() + 2
    }
}

impl<B: Backend> ImageClassifier<B> for ResNet<B> {
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
    fn depth_follows_config() {
        let device = Default::default();
        for depth in [20, 32, 56] {
            let model = ResNetConfig::new(depth, 10).init::<B>(&device);
            assert_eq!(model.depth(), depth);
        }
    }

    #[test]
    fn resnet20_forward_shape() {
        let device = Default::default();
        let model = ResNetConfig::new(20, 100).init::<B>(&device);
        let images = Tensor::<B, 4>::zeros([3, 3, 32, 32], &device);

        assert_eq!(model.forward(images).dims(), [3, 100]);
        assert_eq!(model.num_classes(), 100);
    }
}

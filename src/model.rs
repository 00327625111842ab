use burn::{
    nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig},
    prelude::*,
    train::ClassificationOutput,
};

use crate::dataset::ClassificationBatch;

/// A network mapping normalized images to one logit per class.
pub trait ImageClassifier<B: Backend> {
    /// # Shapes
    ///   - `images` [batch_size, channels, height, width]
    ///   - output [batch_size, num_classes]
    fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    fn num_classes(&self) -> usize;
}

/// Cross-entropy, softened when `label_smoothing` is positive.
pub fn cross_entropy<B: Backend>(label_smoothing: f64, device: &B::Device) -> CrossEntropyLoss<B> {
    let smoothing = (label_smoothing > 0.0).then_some(label_smoothing as f32);
    CrossEntropyLossConfig::new()
        .with_smoothing(smoothing)
        .init(device)
}

pub fn classification_step<B: Backend, M: ImageClassifier<B>>(
    model: &M,
    batch: ClassificationBatch<B>,
    loss: &CrossEntropyLoss<B>,
) -> ClassificationOutput<B> {
    let output = model.logits(batch.images);
    let loss = loss.forward(output.clone(), batch.targets.clone());

    ClassificationOutput {
        loss,
        output,
        targets: batch.targets,
    }
}

use std::path::Path;

use burn::prelude::Backend;

use crate::{
    checkpoint::load_pretrained,
    config::{Architecture, RunPaths, TrainingConfig},
    dataset::{CifarDataset, Split},
    error::Result,
    metric::AccuracyMeter,
    model::{cross_entropy, ImageClassifier},
    resnet::ResNetConfig,
    training::{run_eval, test_loader},
    vgg::VggConfig,
};

#[derive(Debug, Clone, PartialEq)]
pub struct EvalSummary {
    pub samples: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub top5: f64,
}

impl<B: Backend> From<AccuracyMeter<B>> for EvalSummary {
    fn from(meter: AccuracyMeter<B>) -> Self {
        Self {
            samples: meter.samples(),
            loss: meter.mean_loss(),
            accuracy: meter.accuracy(),
            top5: meter.top5_accuracy(),
        }
    }
}

/// Scores the weights stored at `checkpoint` on the test split of the
/// configured dataset.
pub fn evaluate<B: Backend>(
    config: &TrainingConfig,
    paths: &RunPaths,
    checkpoint: &Path,
    device: B::Device,
) -> Result<EvalSummary> {
    let test_set = CifarDataset::load(config.dataset, &paths.dataset_root, Split::Test)?;
    let num_classes = config.num_classes();

    match config.model {
        Architecture::Vgg(variant) => {
            let model = VggConfig::new(variant, num_classes).init::<B>(&device);
            let model = load_pretrained::<B, _>(model, checkpoint, &device)?;
            Ok(score(&model, config, test_set, &device))
        }
        Architecture::ResNet { depth } => {
            let model = ResNetConfig::new(depth, num_classes).init::<B>(&device);
            let model = load_pretrained::<B, _>(model, checkpoint, &device)?;
            Ok(score(&model, config, test_set, &device))
        }
    }
}

fn score<B: Backend, M: ImageClassifier<B>>(
    model: &M,
    config: &TrainingConfig,
    test_set: CifarDataset,
    device: &B::Device,
) -> EvalSummary {
    let loader = test_loader::<B>(config, config.dataset.norm_stats(), test_set, device);
    let meter = run_eval(model, &loader, &cross_entropy::<B>(0.0, device), 1, 1);
    let summary = EvalSummary::from(meter);
    log::info!(
        "{} on {}: loss={:.4} acc={:.2}% top5={:.2}% over {} images",
        config.model,
        config.dataset,
        summary.loss,
        summary.accuracy,
        summary.top5,
        summary.samples
    );
    summary
}

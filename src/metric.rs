use std::fmt;

use burn::{
    data::dataloader::Progress,
    prelude::Backend,
    train::{
        metric::{
            AccuracyMetric, Adaptor, LossMetric, Metric, MetricMetadata, Numeric,
            TopKAccuracyInput, TopKAccuracyMetric,
        },
        ClassificationOutput,
    },
    LearningRate,
};

/// Largest `k` reported as top-k accuracy.
pub const TOP_K: usize = 5;

/// Loss plus top-1 and top-5 accuracy over one pass of a data loader.
///
/// burn's numeric metrics report the latest batch, so the meter keeps the
/// sample-weighted epoch means itself.
pub struct AccuracyMeter<B: Backend> {
    loss: LossMetric<B>,
    accuracy: AccuracyMetric<B>,
    top_k: TopKAccuracyMetric<B>,
    loss_sum: f64,
    top1_sum: f64,
    top_k_sum: f64,
    samples: usize,
}

impl<B: Backend> AccuracyMeter<B> {
    pub fn new(num_classes: usize) -> Self {
        Self {
            loss: LossMetric::new(),
            accuracy: AccuracyMetric::new(),
            top_k: TopKAccuracyMetric::new(TOP_K.min(num_classes).max(1)),
            loss_sum: 0.0,
            top1_sum: 0.0,
            top_k_sum: 0.0,
            samples: 0,
        }
    }

    pub fn update(&mut self, output: &ClassificationOutput<B>, metadata: &MetricMetadata) {
        let [batch_size, _] = output.output.dims();
        if batch_size == 0 {
            return;
        }

        self.loss.update(&output.adapt(), metadata);
        self.accuracy.update(&output.adapt(), metadata);
        self.top_k.update(
            &TopKAccuracyInput::new(output.output.clone(), output.targets.clone()),
            metadata,
        );

        let weight = batch_size as f64;
        self.loss_sum += self.loss.value() * weight;
        self.top1_sum += self.accuracy.value() * weight;
        self.top_k_sum += self.top_k.value() * weight;
        self.samples += batch_size;
    }

    /// Mean loss per sample; NaN before the first batch.
    pub fn mean_loss(&self) -> f64 {
        if self.samples == 0 {
            f64::NAN
        } else {
            self.loss_sum / self.samples as f64
        }
    }

    /// Top-1 accuracy in percent.
    pub fn accuracy(&self) -> f64 {
        self.mean(self.top1_sum)
    }

    pub fn top5_accuracy(&self) -> f64 {
        self.mean(self.top_k_sum)
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    fn mean(&self, sum: f64) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            sum / self.samples as f64
        }
    }
}

/// Metadata handed to burn's metrics for one batch.
pub fn batch_metadata(
    progress: Progress,
    epoch: usize,
    epoch_total: usize,
    iteration: usize,
    lr: Option<LearningRate>,
) -> MetricMetadata {
    MetricMetadata {
        progress,
        epoch,
        epoch_total,
        iteration,
        lr,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    pub learning_rate: f64,
    pub train_loss: f64,
    pub train_acc: f64,
    pub test_loss: f64,
    pub test_acc: f64,
    pub test_top5: f64,
}

impl fmt::Display for EpochSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "epoch {:>3} | lr={:.5} | train_loss={:.4} | train_acc={:.2}% | test_loss={:.4} | test_acc={:.2}% | top5={:.2}%",
            self.epoch,
            self.learning_rate,
            self.train_loss,
            self.train_acc,
            self.test_loss,
            self.test_acc,
            self.test_top5
        )
    }
}

#[cfg(test)]
mod tests {
    use burn::{
        backend::NdArray,
        tensor::{Tensor, TensorData},
    };

    use super::*;

    type B = NdArray<f32>;

    fn output(loss: f32, logits: Vec<f32>, targets: Vec<i64>) -> ClassificationOutput<B> {
        let device = Default::default();
        let batch_size = targets.len();
        let num_classes = logits.len() / batch_size;
        ClassificationOutput::new(
            Tensor::from_floats([loss], &device),
            Tensor::from_data(TensorData::new(logits, [batch_size, num_classes]), &device),
            Tensor::from_data(TensorData::new(targets, [batch_size]), &device),
        )
    }

    fn metadata() -> MetricMetadata {
        let progress = Progress {
            items_processed: 1,
            items_total: 1,
        };
        batch_metadata(progress, 1, 1, 1, None)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn empty_meter_reports_zero_accuracy() {
        let meter = AccuracyMeter::<B>::new(100);

        assert_eq!(meter.accuracy(), 0.0);
        assert_eq!(meter.top5_accuracy(), 0.0);
        assert!(meter.mean_loss().is_nan());
        assert_eq!(meter.samples(), 0);
    }

    #[test]
    fn averages_top1_top5_and_loss_per_sample() {
        let mut meter = AccuracyMeter::<B>::new(7);
        #[rustfmt::skip]
        let logits = vec![
            // target 0 ranked first
            9.0, 1.0, 2.0, 3.0, 4.0, 5.0, 0.0,
            // target 1 ranked third
            9.0, 7.0, 8.0, 1.0, 2.0, 3.0, 0.0,
            // target 6 ranked last
            9.0, 7.0, 8.0, 1.0, 2.0, 3.0, 0.0,
        ];

        meter.update(&output(1.5, logits.clone(), vec![0, 1, 6]), &metadata());
        meter.update(&output(0.5, logits[..7].to_vec(), vec![0]), &metadata());

        assert_eq!(meter.samples(), 4);
        assert!(close(meter.accuracy(), 50.0), "{}", meter.accuracy());
        assert!(close(meter.top5_accuracy(), 75.0), "{}", meter.top5_accuracy());
        assert!(close(meter.mean_loss(), 1.25), "{}", meter.mean_loss());
    }

    #[test]
    fn top_k_is_capped_by_class_count() {
        let mut meter = AccuracyMeter::<B>::new(3);

        meter.update(&output(0.1, vec![3.0, 2.0, 1.0], vec![2]), &metadata());

        assert_eq!(meter.accuracy(), 0.0);
        assert!(close(meter.top5_accuracy(), 100.0));
    }
}

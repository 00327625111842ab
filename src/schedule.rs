use burn::{
    lr_scheduler::{
        cosine::{CosineAnnealingLrScheduler, CosineAnnealingLrSchedulerConfig},
        linear::{LinearLrScheduler, LinearLrSchedulerConfig},
        LrScheduler,
    },
    tensor::backend::Backend,
    LearningRate,
};

use crate::config::TrainingConfig;

/// Per-iteration learning rate: a linear ramp from `warm_lr` to the base rate
/// over the warm-up epochs, then cosine annealing down to `min_lr` over the
/// rest of the run.
///
/// `step` returns the rate for the iteration about to run, so the first
/// iteration trains at `warm_lr` (or the base rate without warm-up).
#[derive(Debug, Clone, Copy)]
pub struct WarmupCosine {
    warmup: Option<LinearLrScheduler>,
    anneal: CosineAnnealingLrScheduler,
    warmup_iters: usize,
    iteration: usize,
    current: LearningRate,
}

impl WarmupCosine {
    /// `config` must have passed [`TrainingConfig::validate`]; burn's
    /// schedulers reject rates outside `(0, 1]`.
    pub fn new(config: &TrainingConfig, iters_per_epoch: usize) -> Self {
        let iters_per_epoch = iters_per_epoch.max(1);
        let warmup_iters = config.warmup_step * iters_per_epoch;
        let total_iters = config.num_epochs * iters_per_epoch;

        let warmup = (warmup_iters > 0).then(|| {
            LinearLrSchedulerConfig::new(config.warm_lr, config.learning_rate, warmup_iters).init()
        });
        let anneal = CosineAnnealingLrSchedulerConfig::new(
            config.learning_rate,
            total_iters.saturating_sub(warmup_iters).max(1),
        )
        .with_min_lr(config.min_learning_rate)
        .init();

        Self {
            warmup,
            anneal,
            warmup_iters,
            iteration: 0,
            current: if warmup_iters > 0 {
                config.warm_lr
            } else {
                config.learning_rate
            },
        }
    }

    /// Rate the next call to `step` hands out.
    pub fn current(&self) -> LearningRate {
        self.current
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }
}

impl<B: Backend> LrScheduler<B> for WarmupCosine {
    type Record = (
        Option<<LinearLrScheduler as LrScheduler<B>>::Record>,
        <CosineAnnealingLrScheduler as LrScheduler<B>>::Record,
        usize,
        LearningRate,
    );

    fn step(&mut self) -> LearningRate {
        let lr = self.current;
        self.iteration += 1;
        self.current = match self.warmup.as_mut() {
            Some(warmup) if self.iteration <= self.warmup_iters => {
                LrScheduler::<B>::step(warmup)
            }
            _ => LrScheduler::<B>::step(&mut self.anneal),
        };
        lr
    }

    fn to_record(&self) -> Self::Record {
        (
            self.warmup.as_ref().map(|warmup| LrScheduler::<B>::to_record(warmup)),
            LrScheduler::<B>::to_record(&self.anneal),
            self.iteration,
            self.current,
        )
    }

    fn load_record(mut self, record: Self::Record) -> Self {
        let (warmup, anneal, iteration, current) = record;
        self.warmup = match (self.warmup, warmup) {
            (Some(scheduler), Some(record)) => {
                Some(LrScheduler::<B>::load_record(scheduler, record))
            }
            (scheduler, _) => scheduler,
        };
        self.anneal = LrScheduler::<B>::load_record(self.anneal, anneal);
        self.iteration = iteration;
        self.current = current;
        self
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;

    use super::*;

    type B = NdArray<f32>;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn rates(schedule: &mut WarmupCosine, n: usize) -> Vec<f64> {
        (0..n).map(|_| LrScheduler::<B>::step(schedule)).collect()
    }

    #[test]
    fn without_warmup_starts_at_base_and_anneals() {
        let config = TrainingConfig::new().with_num_epochs(4);
        let mut schedule = WarmupCosine::new(&config, 10);

        let lrs = rates(&mut schedule, 40);
        assert!(close(lrs[0], 0.1));
        assert!(close(lrs[20], 0.05));
        assert!(lrs[39] > 0.0);
        assert!(close(schedule.current(), 0.0));
        assert_eq!(schedule.iteration(), 40);
    }

    #[test]
    fn warmup_ramps_from_warm_lr() {
        let config = TrainingConfig::new()
            .with_num_epochs(10)
            .with_warmup_step(2)
            .with_warm_lr(0.01);
        let mut schedule = WarmupCosine::new(&config, 5);
        assert!(close(schedule.current(), 0.01));

        let lrs = rates(&mut schedule, 12);
        assert!(close(lrs[0], 0.01));
        assert!(close(lrs[5], 0.055));
        assert!(close(lrs[10], 0.1));
        for i in 1..=10 {
            assert!(lrs[i] > lrs[i - 1]);
        }
        assert!(lrs[11] < lrs[10]);
    }

    #[test]
    fn annealing_is_monotone_and_respects_floor() {
        let config = TrainingConfig::new()
            .with_num_epochs(3)
            .with_min_learning_rate(0.001);
        let mut schedule = WarmupCosine::new(&config, 7);

        let lrs = rates(&mut schedule, 21);
        for pair in lrs.windows(2) {
            assert!(pair[1] <= pair[0]);
        }
        assert!(lrs.iter().all(|&lr| lr >= 0.001 - 1e-12));
        assert!(close(schedule.current(), 0.001));
    }

    #[test]
    fn record_resumes_mid_warmup() {
        let config = TrainingConfig::new()
            .with_num_epochs(4)
            .with_warmup_step(1)
            .with_warm_lr(0.02);
        let mut schedule = WarmupCosine::new(&config, 4);
        rates(&mut schedule, 3);
        let record = LrScheduler::<B>::to_record(&schedule);
        let expected = rates(&mut schedule.clone(), 6);

        let resumed = LrScheduler::<B>::load_record(WarmupCosine::new(&config, 4), record);
        assert_eq!(resumed.iteration(), 3);
        assert_eq!(rates(&mut resumed.clone(), 6), expected);
    }
}

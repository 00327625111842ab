use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use burn::{
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    lr_scheduler::LrScheduler,
    module::AutodiffModule,
    nn::loss::CrossEntropyLoss,
    optim::{
        decay::WeightDecayConfig, momentum::MomentumConfig, GradientsParams, Optimizer, SgdConfig,
    },
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::{
    augment::{AugmentedDataset, EpochHandle, TransformPipeline},
    checkpoint::{self, SavePolicy},
    config::{Architecture, RunPaths, TrainingConfig},
    dataset::{
        CifarDataset, CifarItem, ClassificationBatch, ClassificationBatcher, NormStats, Split,
    },
    error::{Error, Result},
    metric::{batch_metadata, AccuracyMeter, EpochSummary},
    model::{classification_step, cross_entropy, ImageClassifier},
    resnet::ResNetConfig,
    schedule::WarmupCosine,
    seed::{seed_everything, SeedSequence},
    vgg::VggConfig,
};

#[derive(Debug, Clone, Default)]
pub struct TrainingReport {
    pub epochs: Vec<EpochSummary>,
    /// Checkpoints written, in the order they were saved.
    pub saved: Vec<PathBuf>,
}

impl TrainingReport {
    pub fn best_accuracy(&self) -> Option<f64> {
        self.epochs
            .iter()
            .map(|summary| summary.test_acc)
            .fold(None, |best, acc| Some(best.map_or(acc, |b: f64| b.max(acc))))
    }
}

pub fn train<B: AutodiffBackend>(
    config: &TrainingConfig,
    paths: &RunPaths,
    device: B::Device,
) -> Result<TrainingReport> {
    config.validate()?;
    log::info!("{config:?}");

    create_artifact_dir(&paths.save_dir)?;
    let config_path = paths.save_dir.join("config.json");
    config
        .save(&config_path)
        .map_err(|err| Error::io(config_path, err))?;

    let seeds = seed_everything::<B>(config.seed);

    let train_set = CifarDataset::load(config.dataset, &paths.dataset_root, Split::Train)?;
    let test_set = CifarDataset::load(config.dataset, &paths.dataset_root, Split::Test)?;
    if train_set.is_empty() {
        return Err(Error::Dataset(format!(
            "no training images under {}",
            paths.dataset_root.display()
        )));
    }

    let num_classes = config.num_classes();
    log::info!("building {} for {num_classes} classes", config.model);
    let report = match config.model {
        Architecture::Vgg(variant) => {
            let model = VggConfig::new(variant, num_classes).init::<B>(&device);
            fit(model, config, paths, seeds, train_set, test_set, device)?
        }
        Architecture::ResNet { depth } => {
            let model = ResNetConfig::new(depth, num_classes).init::<B>(&device);
            fit(model, config, paths, seeds, train_set, test_set, device)?
        }
    };

    log::info!("finished");
    Ok(report)
}

fn fit<B, M>(
    mut model: M,
    config: &TrainingConfig,
    paths: &RunPaths,
    seeds: SeedSequence,
    train_set: CifarDataset,
    test_set: CifarDataset,
    device: B::Device,
) -> Result<TrainingReport>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + ImageClassifier<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
{
    if config.pretrained {
        model = checkpoint::load_pretrained::<B, M>(model, &paths.pretrained, &device)?;
    }

    let stats = config.dataset.norm_stats();
    let epoch = EpochHandle::default();
    let iters_per_epoch = train_set.len().div_ceil(config.batch_size);

    let train_set = AugmentedDataset::new(
        train_set,
        TransformPipeline::for_split(Split::Train),
        seeds,
        epoch.clone(),
    );
    // burn's worker pool hands batches over in completion order, so the
    // training loader stays on one thread to keep the SGD order fixed.
    let loader_train = data_loader(
        ClassificationBatcher::<B>::new(stats, device.clone()),
        config.batch_size,
        0,
        config.shuffle_train.then_some(config.seed),
        train_set,
    );
    let loader_test = test_loader::<B::InnerBackend>(config, stats, test_set, &device);

    let mut optim = sgd(config).init::<B, M>();
    let mut schedule = WarmupCosine::new(config, iters_per_epoch);
    let mut policy = SavePolicy::new(&paths.save_dir, config.seed, config.save_acc);
    let loss_train = cross_entropy::<B>(config.label_smoothing, &device);
    let loss_test = cross_entropy::<B::InnerBackend>(0.0, &device);
    let num_classes = model.num_classes();

    let mut report = TrainingReport::default();
    for epoch_idx in 1..=config.num_epochs {
        epoch.set(epoch_idx);
        let learning_rate = schedule.current();

        let mut train_meter = AccuracyMeter::<B>::new(num_classes);
        let mut iterator = loader_train.iter();
        while let Some(batch) = iterator.next() {
            let lr = LrScheduler::<B>::step(&mut schedule);
            let output = classification_step(&model, batch, &loss_train);
            let grads = GradientsParams::from_grads(output.loss.backward(), &model);
            let metadata = batch_metadata(
                iterator.progress(),
                epoch_idx,
                config.num_epochs,
                schedule.iteration(),
                Some(lr),
            );
            train_meter.update(&output, &metadata);
            model = optim.step(lr, model, grads);
        }

        let test_meter = run_eval(
            &model.valid(),
            &loader_test,
            &loss_test,
            epoch_idx,
            config.num_epochs,
        );

        let summary = EpochSummary {
            epoch: epoch_idx,
            learning_rate,
            train_loss: train_meter.mean_loss(),
            train_acc: train_meter.accuracy(),
            test_loss: test_meter.mean_loss(),
            test_acc: test_meter.accuracy(),
            test_top5: test_meter.top5_accuracy(),
        };
        log::info!("{summary}");

        if let Some(path) = policy.consider(summary.test_acc) {
            checkpoint::save::<B, M>(model.clone(), &path)?;
            log::info!("saved {}", path.display());
            report.saved.push(path);
        }
        report.epochs.push(summary);
    }

    Ok(report)
}

fn sgd(config: &TrainingConfig) -> SgdConfig {
    let momentum = (config.momentum > 0.0).then(|| {
        MomentumConfig::new()
            .with_momentum(config.momentum)
            .with_dampening(0.0)
    });
    let weight_decay =
        (config.weight_decay > 0.0).then(|| WeightDecayConfig::new(config.weight_decay));

    SgdConfig::new()
        .with_momentum(momentum)
        .with_weight_decay(weight_decay)
}

fn data_loader<B, D>(
    batcher: ClassificationBatcher<B>,
    batch_size: usize,
    num_workers: usize,
    shuffle: Option<u64>,
    dataset: D,
) -> Arc<dyn DataLoader<ClassificationBatch<B>>>
where
    B: Backend,
    D: Dataset<CifarItem> + 'static,
{
    let mut builder = DataLoaderBuilder::new(batcher).batch_size(batch_size);
    if let Some(seed) = shuffle {
        builder = builder.shuffle(seed);
    }
    if num_workers > 0 {
        builder = builder.num_workers(num_workers);
    }
    builder.build(dataset)
}

pub(crate) fn test_loader<B: Backend>(
    config: &TrainingConfig,
    stats: NormStats,
    test_set: CifarDataset,
    device: &B::Device,
) -> Arc<dyn DataLoader<ClassificationBatch<B>>> {
    data_loader(
        ClassificationBatcher::<B>::new(stats, device.clone()),
        config.test_batch_size,
        config.num_workers,
        None,
        test_set,
    )
}

/// One evaluation pass over `loader`.
pub(crate) fn run_eval<B: Backend, M: ImageClassifier<B>>(
    model: &M,
    loader: &Arc<dyn DataLoader<ClassificationBatch<B>>>,
    loss: &CrossEntropyLoss<B>,
    epoch: usize,
    epoch_total: usize,
) -> AccuracyMeter<B> {
    let mut meter = AccuracyMeter::new(model.num_classes());
    let mut iterator = loader.iter();
    let mut iteration = 0;
    while let Some(batch) = iterator.next() {
        iteration += 1;
        let output = classification_step(model, batch, loss);
        let metadata = batch_metadata(iterator.progress(), epoch, epoch_total, iteration, None);
        meter.update(&output, &metadata);
    }
    meter
}

fn create_artifact_dir(artifact_dir: &Path) -> Result<()> {
    fs::create_dir_all(artifact_dir).map_err(|err| Error::io(artifact_dir, err))
}

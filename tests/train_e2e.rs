mod common;

use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};
use cifar_vgg::{
    evaluate, train, Architecture, DatasetKind, Error, RunPaths, TrainingConfig, VggVariant,
};
use common::write_cifar100;

type B = NdArray<f32>;
type AB = Autodiff<B>;

fn small_config() -> TrainingConfig {
    TrainingConfig::new()
        .with_model(Architecture::ResNet { depth: 20 })
        .with_batch_size(2)
        .with_test_batch_size(4)
        .with_num_workers(0)
        .with_num_epochs(2)
        .with_learning_rate(0.01)
}

#[test]
fn runs_exactly_the_configured_epochs_and_respects_save_threshold() {
    let dir = tempfile::tempdir().unwrap();
    write_cifar100(dir.path(), 6, 4);

    let config = small_config().with_save_acc(100.0);
    let paths = RunPaths::new(dir.path(), &config);

    let report = train::<AB>(&config, &paths, NdArrayDevice::Cpu).unwrap();

    assert_eq!(report.epochs.len(), 2);
    assert_eq!(
        report.epochs.iter().map(|e| e.epoch).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert!(report.saved.is_empty());
    assert!(paths.save_dir.join("config.json").is_file());
    assert!(report.best_accuracy().unwrap() <= 100.0);
}

#[test]
fn saved_checkpoint_can_seed_a_new_run_and_be_evaluated() {
    let dir = tempfile::tempdir().unwrap();
    write_cifar100(dir.path(), 4, 4);

    let config = small_config().with_num_epochs(1).with_save_acc(-1.0);
    let paths = RunPaths::new(dir.path(), &config);

    let report = train::<AB>(&config, &paths, NdArrayDevice::Cpu).unwrap();
    assert_eq!(report.saved.len(), 1);
    let saved = &report.saved[0];
    assert!(saved.is_file(), "{} missing", saved.display());
    assert!(saved.starts_with(dir.path().join("ckpt/resnet20/cifar100")));

    let resumed = small_config().with_num_epochs(1).with_pretrained(true);
    let resumed_paths = RunPaths::new(dir.path(), &resumed).with_pretrained(saved);
    let report = train::<AB>(&resumed, &resumed_paths, NdArrayDevice::Cpu).unwrap();
    assert_eq!(report.epochs.len(), 1);

    let summary = evaluate::<B>(&config, &paths, saved, NdArrayDevice::Cpu).unwrap();
    assert_eq!(summary.samples, 4);
    assert!((0.0..=100.0).contains(&summary.accuracy));
    assert!(summary.top5 >= summary.accuracy);
}

#[test]
fn default_vgg13_trains_on_cifar100() {
    let dir = tempfile::tempdir().unwrap();
    write_cifar100(dir.path(), 2, 2);

    let config = TrainingConfig::new()
        .with_batch_size(2)
        .with_test_batch_size(2)
        .with_num_workers(0)
        .with_num_epochs(1)
        .with_learning_rate(0.01)
        .with_save_acc(-1.0);
    assert_eq!(config.model, Architecture::Vgg(VggVariant::Vgg13));
    assert_eq!(config.dataset, DatasetKind::Cifar100);
    let paths = RunPaths::new(dir.path(), &config);

    let report = train::<AB>(&config, &paths, NdArrayDevice::Cpu).unwrap();

    assert_eq!(report.epochs.len(), 1);
    assert!(report.epochs[0].train_loss.is_finite());
    assert_eq!(report.saved.len(), 1);
    assert!(report.saved[0].starts_with(dir.path().join("ckpt/vgg13/cifar100")));
}

#[test]
fn warmup_and_label_smoothing_shape_the_run() {
    let dir = tempfile::tempdir().unwrap();
    write_cifar100(dir.path(), 4, 4);

    let config = small_config()
        .with_model(Architecture::ResNet { depth: 8 })
        .with_num_epochs(3)
        .with_warmup_step(1)
        .with_warm_lr(0.001)
        .with_label_smoothing(0.1);
    let paths = RunPaths::new(dir.path(), &config);

    let report = train::<AB>(&config, &paths, NdArrayDevice::Cpu).unwrap();

    let lrs: Vec<f64> = report.epochs.iter().map(|e| e.learning_rate).collect();
    assert_eq!(lrs.len(), 3);
    assert!((lrs[0] - 0.001).abs() < 1e-9, "{lrs:?}");
    assert!((lrs[1] - 0.01).abs() < 1e-9, "{lrs:?}");
    assert!(lrs[2] < lrs[1], "{lrs:?}");
    assert!(report
        .epochs
        .iter()
        .all(|e| e.train_loss.is_finite() && e.test_loss.is_finite()));
}

#[test]
fn missing_pretrained_weights_fail_before_training() {
    let dir = tempfile::tempdir().unwrap();
    write_cifar100(dir.path(), 2, 2);

    let config = small_config().with_pretrained(true);
    let paths = RunPaths::new(dir.path(), &config);

    let err = train::<AB>(&config, &paths, NdArrayDevice::Cpu).unwrap_err();
    assert!(matches!(err, Error::Checkpoint { .. }));
}

#[test]
fn missing_dataset_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config().with_dataset(DatasetKind::Cifar10);
    let paths = RunPaths::new(dir.path(), &config);

    let err = train::<AB>(&config, &paths, NdArrayDevice::Cpu).unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
}

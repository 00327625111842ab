use anyhow::Context;
use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};
use cifar_vgg::cli::{wgpu_device, BackendKind, ConfigArgs};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "train", about = "Train a CIFAR image classifier")]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,
    /// Tensor backend to train on.
    #[arg(long, value_enum, default_value_t = BackendKind::Wgpu)]
    backend: BackendKind,
}

fn main() -> anyhow::Result<()> {
    type MyBackend = burn::backend::Wgpu<f32, i32>;
    type MyAutodiffBackend = Autodiff<MyBackend>;

    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let (config, paths) = cli.config.resolve().context("invalid training configuration")?;

    let report = match cli.backend {
        BackendKind::Wgpu => {
            cifar_vgg::train::<MyAutodiffBackend>(&config, &paths, wgpu_device(config.gpu))
        }
        BackendKind::Ndarray => {
            if config.gpu.is_some() {
                log::warn!("--gpus is ignored by the ndarray backend");
            }
            cifar_vgg::train::<Autodiff<NdArray<f32>>>(&config, &paths, NdArrayDevice::Cpu)
        }
    }
    .with_context(|| format!("training {} on {} failed", config.model, config.dataset))?;

    match report.best_accuracy() {
        Some(best) => println!("best test accuracy {best:.2}% after {} epochs", report.epochs.len()),
        None => println!("no epochs were run"),
    }
    for path in &report.saved {
        println!("checkpoint: {}", path.display());
    }
    Ok(())
}

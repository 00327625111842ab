use std::path::PathBuf;

use anyhow::Context;
use burn::backend::{ndarray::NdArrayDevice, NdArray};
use cifar_vgg::cli::{wgpu_device, BackendKind, ConfigArgs};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "eval", about = "Score saved weights on the CIFAR test split")]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,
    /// Record to evaluate; defaults to the pretrained checkpoint path.
    #[arg(long)]
    checkpoint: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = BackendKind::Wgpu)]
    backend: BackendKind,
}

fn main() -> anyhow::Result<()> {
    type MyBackend = burn::backend::Wgpu<f32, i32>;

    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let (config, paths) = cli.config.resolve().context("invalid configuration")?;
    let checkpoint = cli.checkpoint.unwrap_or_else(|| paths.pretrained.clone());

    let summary = match cli.backend {
        BackendKind::Wgpu => {
            cifar_vgg::evaluate::<MyBackend>(&config, &paths, &checkpoint, wgpu_device(config.gpu))
        }
        BackendKind::Ndarray => {
            cifar_vgg::evaluate::<NdArray<f32>>(&config, &paths, &checkpoint, NdArrayDevice::Cpu)
        }
    }
    .with_context(|| format!("evaluating {}", checkpoint.display()))?;

    println!(
        "{}: acc {:.2}% | top5 {:.2}% | loss {:.4} | {} images",
        checkpoint.display(),
        summary.accuracy,
        summary.top5,
        summary.loss,
        summary.samples
    );
    Ok(())
}

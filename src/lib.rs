pub mod augment;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod dataset;
mod error;
mod inference;
pub mod metric;
pub mod model;
pub mod resnet;
pub mod schedule;
pub mod seed;
mod training;
pub mod vgg;

pub use config::{Architecture, DatasetKind, RunPaths, TrainingConfig, VggVariant};
pub use error::{Error, Result};
pub use inference::{evaluate, EvalSummary};
pub use metric::EpochSummary;
pub use training::{train, TrainingReport};

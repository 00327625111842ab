use std::path::{Path, PathBuf};

use burn::{module::Module, prelude::Backend, record::CompactRecorder};

use crate::error::{Error, Result};

/// Extension the compact recorder writes. Spelled out in file names so the
/// accuracy's decimal point is not mistaken for one.
pub const RECORD_EXTENSION: &str = "mpk";

/// Loads weights saved with [`CompactRecorder`] into `model`. The recorder
/// replaces whatever extension `path` carries with `.mpk`.
pub fn load_pretrained<B: Backend, M: Module<B>>(
    model: M,
    path: &Path,
    device: &B::Device,
) -> Result<M> {
    let model = model
        .load_file(path.to_path_buf(), &CompactRecorder::new(), device)
        .map_err(|err| Error::Checkpoint {
            path: path.to_path_buf(),
            reason: format!("{err:?}"),
        })?;
    log::info!("loaded pretrained weights from {}", path.display());
    Ok(model)
}

pub fn save<B: Backend, M: Module<B>>(model: M, path: &Path) -> Result<()> {
    model
        .save_file(path.to_path_buf(), &CompactRecorder::new())
        .map_err(|err| Error::Checkpoint {
            path: path.to_path_buf(),
            reason: format!("{err:?}"),
        })
}

/// Decides after each evaluation whether the model is worth persisting.
#[derive(Debug, Clone)]
pub struct SavePolicy {
    dir: PathBuf,
    seed: u64,
    threshold: f64,
    best: Option<f64>,
}

impl SavePolicy {
    pub fn new(dir: impl Into<PathBuf>, seed: u64, threshold: f64) -> Self {
        Self {
            dir: dir.into(),
            seed,
            threshold,
            best: None,
        }
    }

    /// Returns where to save when `accuracy` beats both the threshold and
    /// every accuracy accepted so far.
    pub fn consider(&mut self, accuracy: f64) -> Option<PathBuf> {
        if !(accuracy > self.threshold) || self.best.is_some_and(|best| accuracy <= best) {
            return None;
        }
        self.best = Some(accuracy);
        let name = format!("seed_{}_acc_{accuracy:.2}.{RECORD_EXTENSION}", self.seed);
        Some(self.dir.join(name))
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }
}

#[cfg(test)]
mod tests {
    use burn::{
        backend::NdArray,
        nn::{Linear, LinearConfig},
        tensor::Tensor,
    };

    use super::*;

    type B = NdArray<f32>;

    #[test]
    fn saves_only_improvements_above_threshold() {
        let mut policy = SavePolicy::new("/ckpt", 0, 40.0);

        assert_eq!(policy.consider(39.0), None);
        assert_eq!(policy.consider(40.0), None);
        assert_eq!(
            policy.consider(49.654),
            Some(PathBuf::from("/ckpt/seed_0_acc_49.65.mpk"))
        );
        assert_eq!(policy.consider(45.0), None);
        assert_eq!(policy.consider(49.654), None);
        assert!(policy.consider(51.0).is_some());
        assert_eq!(policy.best(), Some(51.0));
    }

    #[test]
    fn nan_accuracy_is_never_saved() {
        let mut policy = SavePolicy::new("/ckpt", 3, 0.0);
        assert_eq!(policy.consider(f64::NAN), None);
    }

    #[test]
    fn saved_weights_load_back() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linear");
        let model: Linear<B> = LinearConfig::new(4, 2).init(&device);
        let input = Tensor::<B, 2>::ones([1, 4], &device);
        let expected: Vec<f32> = model.forward(input.clone()).into_data().iter::<f32>().collect();

        save::<B, _>(model, &path).unwrap();
        let fresh: Linear<B> = LinearConfig::new(4, 2).init(&device);
        let loaded = load_pretrained::<B, _>(fresh, &path, &device).unwrap();
        let actual: Vec<f32> = loaded.forward(input).into_data().iter::<f32>().collect();

        // Compact records store half precision.
        for (a, e) in actual.iter().zip(&expected) {
            assert!((a - e).abs() < 1e-2, "{a} vs {e}");
        }
    }

    #[test]
    fn missing_checkpoint_is_reported_with_path() {
        let device = Default::default();
        let model: Linear<B> = LinearConfig::new(4, 2).init(&device);

        let path = Path::new("/nonexistent/seed_0_acc_49.65.mpk");

        let err = load_pretrained::<B, _>(model, path, &device).unwrap_err();
        assert!(matches!(err, Error::Checkpoint { .. }));
        assert!(err.to_string().contains("seed_0_acc_49.65"));
    }
}

use burn::tensor::backend::Backend;
use rand::{rngs::StdRng, SeedableRng};

const EPOCH_MIX: u64 = 0x9E37_79B9_7F4A_7C15;
const INDEX_MIX: u64 = 0xBF58_476D_1CE4_E5B9;

/// Root of every host-side random stream used by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSequence {
    seed: u64,
}

impl SeedSequence {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generator for augmenting sample `index` during `epoch`. Depends only on
    /// its arguments, never on the order in which loader workers ask for it.
    pub fn for_sample(&self, epoch: usize, index: usize) -> StdRng {
        let mixed = self.seed
            ^ (epoch as u64).wrapping_add(1).wrapping_mul(EPOCH_MIX)
            ^ (index as u64).wrapping_add(1).wrapping_mul(INDEX_MIX);
        StdRng::seed_from_u64(mixed)
    }
}

/// Seeds the tensor backend and hands back the host-side seed sequence.
pub fn seed_everything<B: Backend>(seed: u64) -> SeedSequence {
    B::seed(seed);
    log::debug!("seeded backend {} with {seed}", B::name());
    SeedSequence::new(seed)
}

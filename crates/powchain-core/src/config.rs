use crate::constants::{GENESIS_PROOF, MINING_PACE_MS, POW_DEFAULT_DIFFICULTY};
use crate::pow::ProofOfWork;
use std::time::Duration;

/// Tunables for a [`crate::Ledger`]. Difficulty is fixed for the life of a chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Required leading zero hex digits in a proof digest.
    pub difficulty: usize,
    /// Proof stored in the genesis block.
    pub genesis_proof: u64,
    /// Delay between streamed mining attempts. Zero disables pacing.
    pub pace: Duration,
    /// Search the proof space on the rayon pool when mining synchronously.
    pub parallel: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: POW_DEFAULT_DIFFICULTY,
            genesis_proof: GENESIS_PROOF,
            pace: Duration::from_millis(MINING_PACE_MS),
            parallel: false,
        }
    }
}

impl LedgerConfig {
    pub fn with_difficulty(mut self, difficulty: usize) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_genesis_proof(mut self, proof: u64) -> Self {
        self.genesis_proof = proof;
        self
    }

    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn proof_of_work(&self) -> ProofOfWork {
        ProofOfWork::new(self.difficulty).parallel(self.parallel)
    }
}

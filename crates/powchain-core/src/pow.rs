//! Proof-of-work: find the smallest `proof` such that
//! `sha256(decimal(last_proof) ++ decimal(proof))` starts with `difficulty`
//! zero hex digits.
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Hex digest of the concatenated decimal renderings of both proofs.
pub fn hash_proof(last_proof: u64, proof: u64) -> String {
    let guess = format!("{last_proof}{proof}");
    hex::encode(Sha256::digest(guess.as_bytes()))
}

pub fn count_leading_zero_digits(hex_digest: &str) -> usize {
    hex_digest.bytes().take_while(|b| *b == b'0').count()
}

pub fn meets_difficulty(hex_digest: &str, difficulty: usize) -> bool {
    count_leading_zero_digits(hex_digest) >= difficulty
}

pub fn valid_proof(last_proof: u64, proof: u64, difficulty: usize) -> bool {
    meets_difficulty(&hash_proof(last_proof, proof), difficulty)
}

/// Ascending search from 0. Always returns the smallest satisfying proof.
pub fn find_proof(last_proof: u64, difficulty: usize) -> u64 {
    (0..=u64::MAX)
        .find(|proof| valid_proof(last_proof, *proof, difficulty))
        .expect("proof space exhausted (practically impossible)")
}

/// Splits the proof space across rayon's pool. `find_first` keeps the
/// lowest match, so the result equals [`find_proof`].
pub fn find_proof_parallel(last_proof: u64, difficulty: usize) -> u64 {
    (0u64..u64::MAX)
        .into_par_iter()
        .find_first(|proof| valid_proof(last_proof, *proof, difficulty))
        .expect("proof space exhausted (practically impossible)")
}

/// One step of a proof search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attempt {
    pub attempt: u64,
    pub proof: u64,
    pub hash: String,
    pub valid: bool,
}

/// Lazy ascending search. Yields every candidate up to and including the
/// first valid one, then ends.
#[derive(Clone, Debug)]
pub struct ProofSearch {
    last_proof: u64,
    difficulty: usize,
    next_proof: u64,
    finished: bool,
}

impl ProofSearch {
    pub fn new(last_proof: u64, difficulty: usize) -> Self {
        Self {
            last_proof,
            difficulty,
            next_proof: 0,
            finished: false,
        }
    }

    pub fn last_proof(&self) -> u64 {
        self.last_proof
    }
}

impl Iterator for ProofSearch {
    type Item = Attempt;

    fn next(&mut self) -> Option<Attempt> {
        if self.finished {
            return None;
        }
        let proof = self.next_proof;
        let hash = hash_proof(self.last_proof, proof);
        let valid = meets_difficulty(&hash, self.difficulty);
        match self.next_proof.checked_add(1) {
            Some(n) if !valid => self.next_proof = n,
            _ => self.finished = true,
        }
        // The candidate doubles as the attempt counter: the search starts at 0.
        Some(Attempt {
            attempt: proof,
            proof,
            hash,
            valid,
        })
    }
}

/// Outcome of a proof search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Solution {
    pub proof: u64,
    pub attempts: u64,
}

/// Pluggable proof finder handed to [`crate::Chain::seal`].
pub trait ProofStrategy {
    fn solve(&mut self, last_proof: u64) -> Solution;
}

impl<F> ProofStrategy for F
where
    F: FnMut(u64) -> u64,
{
    fn solve(&mut self, last_proof: u64) -> Solution {
        let proof = self(last_proof);
        Solution {
            proof,
            attempts: proof.saturating_add(1),
        }
    }
}

/// The standard finder at a fixed difficulty.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProofOfWork {
    difficulty: usize,
    parallel: bool,
}

impl ProofOfWork {
    pub fn new(difficulty: usize) -> Self {
        Self {
            difficulty,
            parallel: false,
        }
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn is_valid(&self, last_proof: u64, proof: u64) -> bool {
        valid_proof(last_proof, proof, self.difficulty)
    }

    pub fn search(&self, last_proof: u64) -> u64 {
        if self.parallel {
            find_proof_parallel(last_proof, self.difficulty)
        } else {
            find_proof(last_proof, self.difficulty)
        }
    }
}

impl ProofStrategy for ProofOfWork {
    fn solve(&mut self, last_proof: u64) -> Solution {
        let proof = self.search(last_proof);
        debug!(last_proof, proof, difficulty = self.difficulty, "proof found");
        Solution {
            proof,
            attempts: proof.saturating_add(1),
        }
    }
}

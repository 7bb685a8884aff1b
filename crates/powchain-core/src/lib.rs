//! Proof-of-work ledger core: blocks, the transaction pool, the chain state
//! machine, the proof search and live mining sessions.
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod chain;
pub mod config;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod pow;
pub mod session;

pub use chain::{Chain, ChainSnapshot};
pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use ledger::Ledger;
pub use pow::{ProofOfWork, ProofStrategy};
pub use session::{MiningSession, ProgressEvent};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: f64,
}

impl Transaction {
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: f64) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
        }
    }

    /// Case-insensitive substring match on sender, recipient or the amount
    /// rendered with two decimals. `needle` must already be lowercase.
    pub(crate) fn matches(&self, needle: &str) -> bool {
        self.sender.to_lowercase().contains(needle)
            || self.recipient.to_lowercase().contains(needle)
            || format!("{:.2}", self.amount).contains(needle)
    }
}

/// How much work went into sealing a block. Not part of the hash preimage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningStats {
    pub attempts: u64,
    pub duration_ms: u64,
    pub hash_rate: f64,
}

impl MiningStats {
    pub fn new(attempts: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let hash_rate = if secs > 0.0 {
            attempts as f64 / secs
        } else {
            attempts as f64
        };
        Self {
            attempts,
            duration_ms: elapsed.as_millis() as u64,
            hash_rate,
        }
    }
}

/// A sealed block. Fields are fixed at construction; `hash` is always the
/// digest of the other consensus fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    index: u64,
    timestamp: u64,
    transactions: Vec<Transaction>,
    proof: u64,
    previous_hash: String,
    hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mining_stats: Option<MiningStats>,
}

// Field order here is the canonical preimage order. Do not reorder.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HashPreimage<'a> {
    index: u64,
    timestamp: u64,
    transactions: &'a [Transaction],
    proof: u64,
    previous_hash: &'a str,
}

impl Block {
    pub fn new(
        index: u64,
        timestamp: u64,
        transactions: Vec<Transaction>,
        proof: u64,
        previous_hash: impl Into<String>,
    ) -> Self {
        let previous_hash = previous_hash.into();
        let hash = block_hash(index, timestamp, &transactions, proof, &previous_hash);
        Self {
            index,
            timestamp,
            transactions,
            proof,
            previous_hash,
            hash,
            mining_stats: None,
        }
    }

    pub fn with_mining_stats(mut self, stats: MiningStats) -> Self {
        self.mining_stats = Some(stats);
        self
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn proof(&self) -> u64 {
        self.proof
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn mining_stats(&self) -> Option<&MiningStats> {
        self.mining_stats.as_ref()
    }

    /// Recompute the digest from the block's own fields.
    pub fn compute_hash(&self) -> String {
        block_hash(
            self.index,
            self.timestamp,
            &self.transactions,
            self.proof,
            &self.previous_hash,
        )
    }

    pub fn has_valid_hash(&self) -> bool {
        self.compute_hash() == self.hash
    }
}

/// Lowercase hex SHA-256 over the canonical JSON of the consensus fields.
pub fn block_hash(
    index: u64,
    timestamp: u64,
    transactions: &[Transaction],
    proof: u64,
    previous_hash: &str,
) -> String {
    let preimage = HashPreimage {
        index,
        timestamp,
        transactions,
        proof,
        previous_hash,
    };
    // Plain strings, integers and floats: serde_json cannot fail here.
    let bytes = serde_json::to_vec(&preimage).expect("block preimage must serialize");
    hex::encode(Sha256::digest(bytes))
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

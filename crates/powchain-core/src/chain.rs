use crate::constants::GENESIS_PREVIOUS_HASH;
use crate::error::{LedgerError, Result};
use crate::pow::{valid_proof, ProofStrategy};
use crate::{unix_now, Block, MiningStats, Transaction};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Read-only copy of the whole chain state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSnapshot {
    pub blocks: Vec<Block>,
    pub pending_transactions: Vec<Transaction>,
}

/// Everything a new block needs except its proof, captured when a seal
/// begins. The transactions have already left the pool.
#[derive(Clone, Debug, PartialEq)]
pub struct SealTemplate {
    pub index: u64,
    pub previous_hash: String,
    pub last_proof: u64,
    pub transactions: Vec<Transaction>,
}

/// Append-only block sequence plus the pool of transactions waiting for the
/// next seal. Never empty: construction installs a genesis block.
#[derive(Clone, Debug)]
pub struct Chain {
    blocks: Vec<Block>,
    pending: Vec<Transaction>,
}

impl Chain {
    pub fn new(genesis_proof: u64) -> Self {
        Self {
            blocks: vec![genesis_block(genesis_proof)],
            pending: Vec::new(),
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Number of blocks, genesis included.
    pub fn height(&self) -> u64 {
        self.blocks.len() as u64
    }

    pub fn last_block(&self) -> &Block {
        self.blocks
            .last()
            .expect("chain always holds at least the genesis block")
    }

    pub fn block(&self, index: u64) -> Option<&Block> {
        // Indices are contiguous from 0, so position == index.
        usize::try_from(index)
            .ok()
            .and_then(|i| self.blocks.get(i))
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    /// Blocks, in chain order, holding at least one transaction whose sender,
    /// recipient or two-decimal amount contains `query` (case-insensitive).
    pub fn search_transactions(&self, query: &str) -> Vec<Block> {
        let needle = query.to_lowercase();
        self.blocks
            .iter()
            .filter(|block| block.transactions().iter().any(|tx| tx.matches(&needle)))
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            blocks: self.blocks.clone(),
            pending_transactions: self.pending.clone(),
        }
    }

    pub fn stage(
        &mut self,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: f64,
    ) -> Transaction {
        let tx = Transaction::new(sender, recipient, amount);
        self.pending.push(tx.clone());
        debug!(pending = self.pending.len(), "transaction staged");
        tx
    }

    pub fn snapshot_and_clear(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.pending)
    }

    /// Put an unsealed snapshot back ahead of anything staged since.
    pub fn restore_pending(&mut self, mut transactions: Vec<Transaction>) {
        if transactions.is_empty() {
            return;
        }
        transactions.append(&mut self.pending);
        self.pending = transactions;
    }

    /// First half of a seal: capture the tip and drain the pool.
    pub fn begin_seal(&mut self) -> SealTemplate {
        let tip = self.last_block();
        let index = tip.index() + 1;
        let previous_hash = tip.hash().to_string();
        let last_proof = tip.proof();
        SealTemplate {
            index,
            previous_hash,
            last_proof,
            transactions: self.snapshot_and_clear(),
        }
    }

    /// Second half of a seal and the only place blocks are appended. If the
    /// tip moved since `begin_seal`, nothing is appended and the template's
    /// transactions go back to the pool.
    pub fn commit_seal(
        &mut self,
        template: SealTemplate,
        proof: u64,
        stats: Option<MiningStats>,
    ) -> Result<Block> {
        let tip = self.last_block();
        if tip.hash() != template.previous_hash || self.height() != template.index {
            let actual = tip.hash().to_string();
            warn!(
                index = template.index,
                expected = %template.previous_hash,
                actual = %actual,
                "tip moved during seal; returning transactions to the pool"
            );
            self.restore_pending(template.transactions);
            return Err(LedgerError::StaleTip {
                expected: template.previous_hash,
                actual,
            });
        }

        let mut block = Block::new(
            template.index,
            unix_now(),
            template.transactions,
            proof,
            template.previous_hash,
        );
        if let Some(stats) = stats {
            block = block.with_mining_stats(stats);
        }
        info!(
            index = block.index(),
            proof,
            txs = block.transactions().len(),
            hash = %block.hash(),
            "block sealed"
        );
        self.blocks.push(block.clone());
        Ok(block)
    }

    /// Seal the pending pool into a new block using `strategy` to find the
    /// proof. Runs start to finish under `&mut self`.
    pub fn seal<S: ProofStrategy + ?Sized>(&mut self, strategy: &mut S) -> Result<Block> {
        let template = self.begin_seal();
        let started = std::time::Instant::now();
        let solution = strategy.solve(template.last_proof);
        let stats = MiningStats::new(solution.attempts, started.elapsed());
        self.commit_seal(template, solution.proof, Some(stats))
    }

    /// Check genesis shape, index continuity, hash integrity, linkage and
    /// proof validity for every block.
    pub fn validate(&self, difficulty: usize) -> Result<()> {
        let Some(genesis) = self.blocks.first() else {
            return Err(invalid(0, "chain has no genesis block"));
        };
        if genesis.index() != 0 || genesis.previous_hash() != GENESIS_PREVIOUS_HASH {
            return Err(invalid(genesis.index(), "malformed genesis block"));
        }
        if !genesis.has_valid_hash() {
            return Err(invalid(0, "hash does not match block contents"));
        }

        for pair in self.blocks.windows(2) {
            let (prev, block) = (&pair[0], &pair[1]);
            let index = block.index();
            if index != prev.index() + 1 {
                return Err(invalid(index, "index is not contiguous"));
            }
            if block.previous_hash() != prev.hash() {
                return Err(invalid(index, "previous hash does not link to parent"));
            }
            if !block.has_valid_hash() {
                return Err(invalid(index, "hash does not match block contents"));
            }
            if !valid_proof(prev.proof(), block.proof(), difficulty) {
                return Err(invalid(index, "proof does not satisfy difficulty"));
            }
        }
        Ok(())
    }
}

fn invalid(index: u64, reason: &str) -> LedgerError {
    LedgerError::InvalidChain {
        index,
        reason: reason.to_string(),
    }
}

/// A transaction-free block at index 0 with the bootstrap proof.
pub fn genesis_block(proof: u64) -> Block {
    Block::new(0, unix_now(), Vec::new(), proof, GENESIS_PREVIOUS_HASH)
}

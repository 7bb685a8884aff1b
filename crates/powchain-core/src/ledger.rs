//! Shared, thread-safe handle over a single [`Chain`].
//!
//! Readers take a shared lock. Staging and the two halves of a seal take the
//! exclusive lock only briefly; the proof search itself runs unlocked. Only
//! one seal may be in flight at a time (the "mining lane"), which keeps every
//! found proof valid against the tip it was searched for.
use crate::chain::{Chain, ChainSnapshot, SealTemplate};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::pow::ProofStrategy;
use crate::session::{MiningSession, ProgressEvent};
use crate::{Block, MiningStats, Transaction};
use parking_lot::RwLock;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

struct Inner {
    chain: RwLock<Chain>,
    mining: AtomicBool,
    config: LedgerConfig,
}

#[derive(Clone)]
pub struct Ledger {
    inner: Arc<Inner>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

impl Ledger {
    pub fn new(config: LedgerConfig) -> Self {
        let chain = Chain::new(config.genesis_proof);
        Self {
            inner: Arc::new(Inner {
                chain: RwLock::new(chain),
                mining: AtomicBool::new(false),
                config,
            }),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.inner.config
    }

    pub fn submit_transaction(
        &self,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: f64,
    ) -> Transaction {
        self.inner.chain.write().stage(sender, recipient, amount)
    }

    pub fn pending(&self) -> Vec<Transaction> {
        self.inner.chain.read().pending().to_vec()
    }

    pub fn last_block(&self) -> Block {
        self.inner.chain.read().last_block().clone()
    }

    pub fn height(&self) -> u64 {
        self.inner.chain.read().height()
    }

    pub fn find_block(&self, index: u64) -> Result<Block> {
        self.inner
            .chain
            .read()
            .block(index)
            .cloned()
            .ok_or(LedgerError::BlockNotFound(index))
    }

    pub fn search(&self, query: &str) -> Vec<Block> {
        self.inner.chain.read().search_transactions(query)
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        self.inner.chain.read().snapshot()
    }

    pub fn validate(&self) -> Result<()> {
        self.inner.chain.read().validate(self.inner.config.difficulty)
    }

    pub fn is_mining(&self) -> bool {
        self.inner.mining.load(Ordering::Acquire)
    }

    /// Seal the pending pool with the configured proof-of-work, blocking the
    /// calling thread for the length of the search.
    pub fn mine(&self) -> Result<Block> {
        let mut pow = self.inner.config.proof_of_work();
        self.mine_with(&mut pow)
    }

    /// Seal the pending pool using a caller-supplied proof finder.
    pub fn mine_with<S: ProofStrategy + ?Sized>(&self, strategy: &mut S) -> Result<Block> {
        let _lane = self.acquire_lane()?;
        let template = self.begin_seal();
        let started = Instant::now();
        let solution = strategy.solve(template.last_proof);
        let stats = MiningStats::new(solution.attempts, started.elapsed());
        self.commit_seal(template, solution.proof, Some(stats))
    }

    /// Start a streaming search. The returned session yields one event per
    /// attempt and seals the block once a valid proof is found.
    pub fn start_session(&self) -> Result<MiningSession> {
        MiningSession::start(self)
    }

    /// Mine on the calling thread, reporting every attempt to `on_event`.
    /// Returning `ControlFlow::Break` from the callback cancels the search and
    /// leaves the chain untouched.
    pub fn mine_with_progress<F>(&self, mut on_event: F) -> Result<Block>
    where
        F: FnMut(&ProgressEvent) -> ControlFlow<()>,
    {
        let mut session = self.start_session()?;
        let pace = session.pace();
        while let Some(event) = session.next() {
            let event = event?;
            if on_event(&event).is_break() {
                debug!(block_index = event.block_index, "progress observer went away");
                return Err(LedgerError::StreamDisconnected);
            }
            if !event.found && !pace.is_zero() {
                std::thread::sleep(pace);
            }
        }
        session.take_block().ok_or(LedgerError::SessionIncomplete)
    }

    pub(crate) fn acquire_lane(&self) -> Result<MiningLane> {
        self.inner
            .mining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| LedgerError::MiningInProgress)?;
        Ok(MiningLane {
            ledger: self.clone(),
        })
    }

    pub(crate) fn begin_seal(&self) -> SealTemplate {
        self.inner.chain.write().begin_seal()
    }

    pub(crate) fn commit_seal(
        &self,
        template: SealTemplate,
        proof: u64,
        stats: Option<MiningStats>,
    ) -> Result<Block> {
        self.inner.chain.write().commit_seal(template, proof, stats)
    }

    pub(crate) fn restore_pending(&self, transactions: Vec<Transaction>) {
        self.inner.chain.write().restore_pending(transactions);
    }
}

/// Exclusive right to seal the next block. Released on drop.
pub(crate) struct MiningLane {
    ledger: Ledger,
}

impl MiningLane {
    pub(crate) fn ledger(&self) -> &Ledger {
        &self.ledger
    }
}

impl Drop for MiningLane {
    fn drop(&mut self) {
        self.ledger.inner.mining.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pow::{find_proof, valid_proof};
    use std::time::Duration;

    fn fast_ledger(difficulty: usize) -> Ledger {
        Ledger::new(
            LedgerConfig::default()
                .with_difficulty(difficulty)
                .with_pace(Duration::ZERO),
        )
    }

    #[test]
    fn fresh_ledger_has_genesis() {
        let ledger = Ledger::default();
        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.blocks.len(), 1);
        assert_eq!(snapshot.blocks[0].index(), 0);
        assert_eq!(snapshot.blocks[0].previous_hash(), "0");
        assert!(snapshot.pending_transactions.is_empty());
        ledger.validate().unwrap();
    }

    #[test]
    fn mine_seals_pending() {
        let ledger = fast_ledger(2);
        ledger.submit_transaction("alice", "bob", 10.0);
        ledger.submit_transaction("bob", "carol", 5.0);
        let block = ledger.mine().unwrap();
        assert_eq!(block.index(), 1);
        assert_eq!(block.transactions().len(), 2);
        assert!(ledger.pending().is_empty());
        assert_eq!(ledger.last_block(), block);
        assert!(!ledger.is_mining());
        ledger.validate().unwrap();
    }

    #[test]
    fn find_block_not_found() {
        let ledger = fast_ledger(1);
        ledger.mine().unwrap();
        assert_eq!(ledger.height(), 2);
        let err = ledger.find_block(99).unwrap_err();
        assert!(matches!(err, LedgerError::BlockNotFound(99)));
        assert_eq!(ledger.find_block(1).unwrap().index(), 1);
    }

    #[test]
    fn second_miner_is_rejected_while_lane_held() {
        let ledger = fast_ledger(1);
        let lane = ledger.acquire_lane().unwrap();
        assert!(ledger.is_mining());
        assert!(matches!(ledger.mine(), Err(LedgerError::MiningInProgress)));
        assert!(matches!(
            ledger.start_session(),
            Err(LedgerError::MiningInProgress)
        ));
        drop(lane);
        assert!(!ledger.is_mining());
        ledger.mine().unwrap();
    }

    #[test]
    fn mine_with_progress_reports_every_attempt() {
        let ledger = fast_ledger(2);
        ledger.submit_transaction("alice", "bob", 1.0);
        let mut events = Vec::new();
        let block = ledger
            .mine_with_progress(|event| {
                events.push(event.clone());
                ControlFlow::Continue(())
            })
            .unwrap();

        let expected = find_proof(100, 2);
        assert_eq!(block.proof(), expected);
        // One event per attempt plus the final one.
        assert_eq!(events.len() as u64, expected + 2);
        assert!(events.iter().all(|e| e.block_index == 1));
        let last = events.last().unwrap();
        assert!(last.found);
        assert_eq!(last.message, "Block mined and added to chain.");
        assert!(valid_proof(100, last.proof, 2));
        assert_eq!(ledger.height(), 2);
    }

    #[test]
    fn mine_with_progress_cancel_leaves_chain_untouched() {
        let ledger = fast_ledger(6);
        ledger.submit_transaction("alice", "bob", 1.0);
        let mut seen = 0;
        let result = ledger.mine_with_progress(|_| {
            seen += 1;
            if seen == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert!(matches!(result, Err(LedgerError::StreamDisconnected)));
        assert_eq!(seen, 3);
        assert_eq!(ledger.height(), 1);
        assert_eq!(ledger.pending(), vec![Transaction::new("alice", "bob", 1.0)]);
        assert!(!ledger.is_mining());
    }

    #[test]
    fn mine_with_custom_strategy() {
        let ledger = fast_ledger(1);
        let mut strategy = |last: u64| find_proof(last, 1);
        let block = ledger.mine_with(&mut strategy).unwrap();
        assert!(valid_proof(100, block.proof(), 1));
        assert_eq!(block.mining_stats().unwrap().attempts, block.proof() + 1);
    }
}

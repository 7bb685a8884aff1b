//! Live mining: a lazy stream of per-attempt progress events.
//!
//! A [`MiningSession`] drains the pool when it starts and searches against
//! the tip it saw at that moment. Every call to `next` performs one attempt.
//! After the valid attempt has been reported, the following call seals the
//! block and yields the closing event; the iterator then ends. Dropping the
//! session early abandons the search and returns the drained transactions to
//! the front of the pool.
use crate::chain::SealTemplate;
use crate::constants::{MSG_FOUND, MSG_SEALED, MSG_TRYING};
use crate::error::{LedgerError, Result};
use crate::ledger::{Ledger, MiningLane};
use crate::pow::ProofSearch;
use crate::{Block, MiningStats};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub attempt: u64,
    pub proof: u64,
    pub hash: String,
    pub found: bool,
    pub block_index: u64,
    pub message: String,
}

enum Phase {
    Searching(ProofSearch),
    Found(ProgressEvent),
    Done,
}

pub struct MiningSession {
    lane: MiningLane,
    template: Option<SealTemplate>,
    block_index: u64,
    phase: Phase,
    started: Instant,
    pace: Duration,
    sealed: Option<Block>,
}

impl MiningSession {
    pub(crate) fn start(ledger: &Ledger) -> Result<Self> {
        let lane = ledger.acquire_lane()?;
        let template = ledger.begin_seal();
        let config = ledger.config();
        let search = ProofSearch::new(template.last_proof, config.difficulty);
        debug!(
            block_index = template.index,
            txs = template.transactions.len(),
            difficulty = config.difficulty,
            "mining session started"
        );
        Ok(Self {
            block_index: template.index,
            pace: config.pace,
            lane,
            template: Some(template),
            phase: Phase::Searching(search),
            started: Instant::now(),
            sealed: None,
        })
    }

    /// Index the block will have once sealed.
    pub fn block_index(&self) -> u64 {
        self.block_index
    }

    /// Suggested delay between attempts for human-paced streams.
    pub fn pace(&self) -> Duration {
        self.pace
    }

    pub fn sealed_block(&self) -> Option<&Block> {
        self.sealed.as_ref()
    }

    pub fn take_block(&mut self) -> Option<Block> {
        self.sealed.take()
    }

    fn seal(&mut self, found: ProgressEvent) -> Result<ProgressEvent> {
        let template = self
            .template
            .take()
            .ok_or(LedgerError::SessionIncomplete)?;
        let stats = MiningStats::new(found.attempt + 1, self.started.elapsed());
        let block = self.lane.ledger().commit_seal(template, found.proof, Some(stats))?;
        self.sealed = Some(block);
        Ok(ProgressEvent {
            found: true,
            message: MSG_SEALED.to_string(),
            ..found
        })
    }
}

impl Iterator for MiningSession {
    type Item = Result<ProgressEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        match std::mem::replace(&mut self.phase, Phase::Done) {
            Phase::Searching(mut search) => {
                let attempt = search.next()?;
                let event = ProgressEvent {
                    attempt: attempt.attempt,
                    proof: attempt.proof,
                    hash: attempt.hash,
                    found: attempt.valid,
                    block_index: self.block_index,
                    message: if attempt.valid { MSG_FOUND } else { MSG_TRYING }.to_string(),
                };
                self.phase = if attempt.valid {
                    Phase::Found(event.clone())
                } else {
                    Phase::Searching(search)
                };
                Some(Ok(event))
            }
            Phase::Found(found) => Some(self.seal(found)),
            Phase::Done => None,
        }
    }
}

impl Drop for MiningSession {
    fn drop(&mut self) {
        if let Some(template) = self.template.take() {
            warn!(
                block_index = template.index,
                txs = template.transactions.len(),
                "mining session abandoned; returning transactions to the pool"
            );
            self.lane.ledger().restore_pending(template.transactions);
        }
    }
}

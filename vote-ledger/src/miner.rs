//! Proof-of-work sealing
//!
//! The nonce search is CPU-bound with only a statistical bound on its
//! length (~16^difficulty attempts), so it runs on a blocking worker and
//! polls a cancellation token between batches.

use crate::crypto::{leading_zero_nibbles, BlockHasher};
use crate::types::{Block, VoteRecord};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Attempts between cancellation checks
const BATCH_SIZE: u64 = 4096;

/// Everything a block needs except its nonce and hash
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    /// Index of the block to seal
    pub index: u64,
    /// Sealing time
    pub timestamp: DateTime<Utc>,
    /// Drained votes in arrival order
    pub votes: Vec<VoteRecord>,
    /// Hash of the current tail
    pub previous_hash: String,
    /// Required leading hex zeros
    pub difficulty: u32,
}

impl BlockTemplate {
    fn into_block(self, nonce: u64, hash: String) -> Block {
        Block {
            index: self.index,
            timestamp: self.timestamp,
            votes: self.votes,
            previous_hash: self.previous_hash,
            nonce,
            hash,
        }
    }
}

/// A sealed block and what it cost
#[derive(Debug, Clone)]
pub struct MinedBlock {
    /// The sealed block
    pub block: Block,
    /// Hashes computed, winning one included
    pub attempts: u64,
    /// Wall time of the search
    pub elapsed: Duration,
}

/// Search nonces `0, 1, 2, …` until the block hash meets the difficulty
pub fn mine(template: BlockTemplate, cancel: &CancellationToken) -> Result<MinedBlock> {
    let started = Instant::now();
    let votes_json = serde_json::to_vec(&template.votes)?;
    let hasher = BlockHasher::new(
        template.index,
        template.timestamp.timestamp_millis(),
        &votes_json,
        &template.previous_hash,
    );

    tracing::debug!(
        index = template.index,
        votes = template.votes.len(),
        difficulty = template.difficulty,
        "Nonce search started"
    );

    let mut nonce: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            tracing::info!(index = template.index, attempts = nonce, "Nonce search cancelled");
            return Err(Error::MiningCancelled);
        }

        let end = nonce.saturating_add(BATCH_SIZE);
        while nonce < end {
            let digest = hasher.digest(nonce);
            if leading_zero_nibbles(&digest) >= template.difficulty {
                let attempts = nonce + 1;
                let elapsed = started.elapsed();
                let block = template.into_block(nonce, hex::encode(digest));
                tracing::info!(
                    index = block.index,
                    nonce,
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    hash = %block.hash,
                    "Block mined"
                );
                return Ok(MinedBlock {
                    block,
                    attempts,
                    elapsed,
                });
            }
            nonce += 1;
        }

        if nonce == u64::MAX {
            return Err(Error::NotFound(format!(
                "no nonce satisfies difficulty {}",
                template.difficulty
            )));
        }
    }
}

//! Sealed block chain and its validator
//!
//! A [`Chain`] is an immutable snapshot. Appending produces a new snapshot
//! that shares every existing block through `Arc`, so readers holding an
//! older snapshot keep walking it without any lock.

use crate::crypto::meets_difficulty;
use crate::types::{
    Block, BlockFault, ChainVerification, DifficultyEpoch, ElectionChainReport, ElectionVote,
    VoteId, VoteLinkBreak, VoteLocation, GENESIS_PREVIOUS_HASH,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Append-only sequence of sealed blocks rooted at genesis
#[derive(Debug, Clone)]
pub struct Chain {
    blocks: Vec<Arc<Block>>,
    schedule: Vec<DifficultyEpoch>,
}

impl Chain {
    /// Genesis-only chain; blocks from index 1 use `difficulty`
    pub fn genesis(timestamp: DateTime<Utc>, difficulty: u32) -> Result<Self> {
        Ok(Self {
            blocks: vec![Arc::new(Block::genesis(timestamp)?)],
            schedule: vec![DifficultyEpoch {
                from_index: 1,
                difficulty,
            }],
        })
    }

    /// Rebuild from persisted parts
    pub fn from_parts(blocks: Vec<Block>, schedule: Vec<DifficultyEpoch>) -> Result<Self> {
        if blocks.is_empty() {
            return Err(Error::NotFound("genesis block".into()));
        }
        if schedule.is_empty() {
            return Err(Error::NotFound("difficulty schedule".into()));
        }
        Ok(Self {
            blocks: blocks.into_iter().map(Arc::new).collect(),
            schedule,
        })
    }

    /// Number of blocks, genesis included
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false: a chain holds at least genesis
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// All blocks in order
    pub fn blocks(&self) -> &[Arc<Block>] {
        &self.blocks
    }

    /// Block at an index
    pub fn get(&self, index: u64) -> Option<&Arc<Block>> {
        usize::try_from(index).ok().and_then(|i| self.blocks.get(i))
    }

    /// Last sealed block
    pub fn tail(&self) -> &Arc<Block> {
        // Constructors guarantee genesis
        &self.blocks[self.blocks.len() - 1]
    }

    /// Difficulty schedule
    pub fn schedule(&self) -> &[DifficultyEpoch] {
        &self.schedule
    }

    /// New snapshot with `block` appended
    pub fn appended(&self, block: Block) -> Self {
        let mut blocks = Vec::with_capacity(self.blocks.len() + 1);
        blocks.extend(self.blocks.iter().cloned());
        blocks.push(Arc::new(block));
        Self {
            blocks,
            schedule: self.schedule.clone(),
        }
    }

    /// New snapshot whose next block (and all later ones) use `difficulty`
    pub fn with_difficulty(&self, difficulty: u32) -> Self {
        let from_index = self.blocks.len() as u64;
        let mut schedule = self.schedule.clone();
        match schedule.last_mut() {
            Some(last) if last.from_index == from_index => last.difficulty = difficulty,
            _ => schedule.push(DifficultyEpoch {
                from_index,
                difficulty,
            }),
        }
        Self {
            blocks: self.blocks.clone(),
            schedule,
        }
    }

    /// Difficulty the next sealed block must meet
    pub fn next_difficulty(&self) -> u32 {
        self.required_difficulty(self.blocks.len() as u64)
    }

    /// Difficulty a block at `index` was sealed under (genesis is exempt)
    pub fn required_difficulty(&self, index: u64) -> u32 {
        if index == 0 {
            return 0;
        }
        self.schedule
            .iter()
            .rev()
            .find(|epoch| epoch.from_index <= index)
            .map(|epoch| epoch.difficulty)
            .unwrap_or(0)
    }

    // Validation

    /// Check one block; `Ok(None)` when it is valid
    pub fn check_block(&self, index: u64) -> Result<Option<BlockFault>> {
        let block = self
            .get(index)
            .ok_or_else(|| Error::NotFound(format!("block {}", index)))?;

        if block.index != index {
            return Ok(Some(BlockFault::IndexMismatch));
        }

        let recomputed = block.compute_hash()?;
        if recomputed != block.hash {
            return Ok(Some(BlockFault::HashMismatch));
        }

        if !meets_difficulty(&recomputed, self.required_difficulty(index)) {
            return Ok(Some(BlockFault::InsufficientWork));
        }

        let expected_previous = match index {
            0 => GENESIS_PREVIOUS_HASH,
            _ => self.blocks[index as usize - 1].hash.as_str(),
        };
        if block.previous_hash != expected_previous {
            return Ok(Some(BlockFault::BrokenLink));
        }

        Ok(None)
    }

    /// Predicate form of [`Chain::check_block`]
    pub fn is_block_valid(&self, index: u64) -> Result<bool> {
        Ok(self.check_block(index)?.is_none())
    }

    /// Check every block in order, stopping at the first failure
    pub fn verify(&self) -> Result<ChainVerification> {
        for index in 0..self.blocks.len() as u64 {
            if let Some(reason) = self.check_block(index)? {
                tracing::error!(index, %reason, "Chain integrity failure");
                return Ok(ChainVerification::Invalid {
                    invalid_block_index: index,
                    reason,
                });
            }
        }
        Ok(ChainVerification::Valid {
            total_blocks: self.blocks.len(),
        })
    }

    // Queries

    /// Linear scan of sealed blocks for a vote
    pub fn find_vote(&self, vote_id: VoteId) -> Option<VoteLocation> {
        self.blocks.iter().find_map(|block| {
            block
                .votes
                .iter()
                .find(|v| v.vote_id == vote_id)
                .map(|vote| VoteLocation {
                    vote: vote.clone(),
                    block_index: block.index,
                    block_hash: block.hash.clone(),
                })
        })
    }

    /// Sealed votes of one election, in chain order
    pub fn election_votes(&self, election_id: &str) -> Vec<ElectionVote> {
        self.blocks
            .iter()
            .flat_map(|block| {
                block
                    .votes
                    .iter()
                    .filter(move |v| v.election_id == election_id)
                    .map(move |vote| ElectionVote {
                        vote: vote.clone(),
                        block_index: block.index,
                        block_hash: block.hash.clone(),
                        block_timestamp: block.timestamp,
                    })
            })
            .collect()
    }

    /// Walk an election's sealed votes and check each links to its predecessor
    pub fn audit_election(&self, election_id: &str) -> ElectionChainReport {
        let mut expected = GENESIS_PREVIOUS_HASH.to_string();
        let mut votes_checked = 0;

        let votes = self
            .blocks
            .iter()
            .flat_map(|block| block.votes.iter())
            .filter(|v| v.election_id == election_id);

        for vote in votes {
            votes_checked += 1;
            if vote.previous_hash != expected {
                return ElectionChainReport {
                    election_id: election_id.to_string(),
                    votes_checked,
                    first_break: Some(VoteLinkBreak {
                        vote_id: vote.vote_id,
                        expected_previous_hash: expected,
                        actual_previous_hash: vote.previous_hash.clone(),
                    }),
                };
            }
            expected = vote.hash.clone();
        }

        ElectionChainReport {
            election_id: election_id.to_string(),
            votes_checked,
            first_break: None,
        }
    }

    /// Sealed votes across all blocks
    pub fn total_votes(&self) -> usize {
        self.blocks.iter().map(|b| b.votes.len()).sum()
    }

    /// Mean gap between consecutive block timestamps (ms), 0 below two blocks
    pub fn average_interval_ms(&self) -> u64 {
        if self.blocks.len() < 2 {
            return 0;
        }
        let gaps: i64 = self
            .blocks
            .windows(2)
            .map(|pair| pair[1].timestamp.timestamp_millis() - pair[0].timestamp.timestamp_millis())
            .sum();
        let mean = gaps as f64 / (self.blocks.len() - 1) as f64;
        mean.max(0.0).round() as u64
    }
}

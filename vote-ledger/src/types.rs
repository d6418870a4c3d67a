//! Core types for the vote ledger
//!
//! All types are designed for:
//! - Deterministic serialization (serde_json, declaration field order)
//! - Memory safety (no unsafe code)
//! - Immutability once sealed (blocks are shared behind `Arc`)

use crate::crypto::{compute_vote_hash, BlockHasher};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Sentinel previous hash for the first vote of an election and for genesis
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Monotonically assigned vote identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoteId(pub u64);

impl VoteId {
    /// Next identifier in sequence
    pub fn next(self) -> Self {
        VoteId(self.0 + 1)
    }
}

impl fmt::Display for VoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A cast vote with its vote-chain integrity fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    /// Ledger-assigned identifier
    pub vote_id: VoteId,

    /// Voter reference
    pub voter_id: String,

    /// Candidate reference
    pub candidate_id: String,

    /// Election reference
    pub election_id: String,

    /// Constituency of the candidate
    pub constituency: String,

    /// Cast time
    pub timestamp: DateTime<Utc>,

    /// Hash of the preceding vote in the same election, `"0"` for the first
    pub previous_hash: String,

    /// Always zero: votes are not mined individually
    pub nonce: u64,

    /// SHA-256 over the identity fields and `previous_hash`
    pub hash: String,
}

impl VoteRecord {
    /// Build a vote and compute its hash
    pub fn new(
        vote_id: VoteId,
        ballot: Ballot,
        timestamp: DateTime<Utc>,
        previous_hash: impl Into<String>,
    ) -> Self {
        let mut record = Self {
            vote_id,
            voter_id: ballot.voter_id,
            candidate_id: ballot.candidate_id,
            election_id: ballot.election_id,
            constituency: ballot.constituency,
            timestamp: timestamp.trunc_subsecs(3),
            previous_hash: previous_hash.into(),
            nonce: 0,
            hash: String::new(),
        };
        record.hash = record.compute_hash();
        record
    }

    /// Recompute the vote hash from the stored fields
    pub fn compute_hash(&self) -> String {
        compute_vote_hash(self)
    }
}

/// Ballot handed over after identity verification, before the ledger
/// assigns an ID and links it into its election's vote chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    /// Voter reference
    pub voter_id: String,
    /// Candidate reference
    pub candidate_id: String,
    /// Election reference
    pub election_id: String,
    /// Constituency of the candidate
    pub constituency: String,
}

/// Sealed batch of votes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain (genesis = 0)
    pub index: u64,

    /// Sealing time (millisecond precision)
    pub timestamp: DateTime<Utc>,

    /// Votes in arrival order
    pub votes: Vec<VoteRecord>,

    /// Hash of the previous block, `"0"` for genesis
    pub previous_hash: String,

    /// Proof-of-work nonce
    pub nonce: u64,

    /// Hash of this block's contents
    pub hash: String,
}

impl Block {
    /// Build the genesis block
    pub fn genesis(timestamp: DateTime<Utc>) -> crate::Result<Self> {
        let mut block = Self {
            index: 0,
            timestamp: timestamp.trunc_subsecs(3),
            votes: Vec::new(),
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.compute_hash()?;
        Ok(block)
    }

    /// Canonical encoding of the vote list
    pub fn votes_json(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.votes)?)
    }

    /// Hasher for this block's contents, nonce excluded
    pub fn hasher(&self) -> crate::Result<BlockHasher> {
        Ok(BlockHasher::new(
            self.index,
            self.timestamp.timestamp_millis(),
            &self.votes_json()?,
            &self.previous_hash,
        ))
    }

    /// Compute block hash from the stored fields
    pub fn compute_hash(&self) -> crate::Result<String> {
        Ok(self.hasher()?.hash(self.nonce))
    }

    /// Check whether the block carries a vote
    pub fn contains_vote(&self, vote_id: VoteId) -> bool {
        self.votes.iter().any(|v| v.vote_id == vote_id)
    }
}

/// Result of a sealing request
#[derive(Debug, Clone)]
pub enum MiningOutcome {
    /// A block was mined and appended
    Sealed(Arc<Block>),
    /// The pool was empty
    NothingPending,
}

impl MiningOutcome {
    /// Sealed block, if any
    pub fn block(&self) -> Option<&Arc<Block>> {
        match self {
            MiningOutcome::Sealed(block) => Some(block),
            MiningOutcome::NothingPending => None,
        }
    }
}

/// A sealed vote with its containing block
#[derive(Debug, Clone, Serialize)]
pub struct VoteLocation {
    /// Sealed copy of the vote
    pub vote: VoteRecord,
    /// Index of the containing block
    pub block_index: u64,
    /// Hash of the containing block
    pub block_hash: String,
}

/// A sealed vote annotated for election reporting
#[derive(Debug, Clone, Serialize)]
pub struct ElectionVote {
    /// Sealed copy of the vote
    #[serde(flatten)]
    pub vote: VoteRecord,
    /// Index of the containing block
    pub block_index: u64,
    /// Hash of the containing block
    pub block_hash: String,
    /// Sealing time of the containing block
    pub block_timestamp: DateTime<Utc>,
}

/// Why a single block failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockFault {
    /// Stored hash differs from the recomputation
    HashMismatch,
    /// Hash lacks the required leading zeros
    InsufficientWork,
    /// `previous_hash` does not match the prior block
    BrokenLink,
    /// Index does not match the block's position
    IndexMismatch,
}

impl fmt::Display for BlockFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            BlockFault::HashMismatch => "block hash does not match its contents",
            BlockFault::InsufficientWork => "block hash does not meet difficulty",
            BlockFault::BrokenLink => "previous hash does not match prior block",
            BlockFault::IndexMismatch => "block index does not match its position",
        };
        f.write_str(reason)
    }
}

/// Whole-chain verification report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChainVerification {
    /// Every block passed
    Valid {
        /// Blocks checked, genesis included
        total_blocks: usize,
    },
    /// First failing block
    Invalid {
        /// Index of the first failing block
        invalid_block_index: u64,
        /// Failure reason
        reason: BlockFault,
    },
}

impl ChainVerification {
    /// True when every block passed
    pub fn is_valid(&self) -> bool {
        matches!(self, ChainVerification::Valid { .. })
    }

    /// Turn a failure into [`crate::Error::ChainIntegrity`]
    pub fn into_result(self) -> crate::Result<usize> {
        match self {
            ChainVerification::Valid { total_blocks } => Ok(total_blocks),
            ChainVerification::Invalid {
                invalid_block_index,
                reason,
            } => Err(crate::Error::ChainIntegrity {
                index: invalid_block_index,
                reason: reason.to_string(),
            }),
        }
    }
}

/// Why a vote failed verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteFault {
    /// Vote is not in any sealed block
    NotSealed,
    /// Recomputed vote hash differs from the sealed hash
    HashMismatch,
    /// Containing block fails validation
    ContainingBlockInvalid,
}

impl fmt::Display for VoteFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            VoteFault::NotSealed => "not sealed",
            VoteFault::HashMismatch => "hash mismatch",
            VoteFault::ContainingBlockInvalid => "containing block invalid",
        };
        f.write_str(reason)
    }
}

/// Single-vote verification report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VoteVerification {
    /// Vote is sealed, self-consistent, and its block is valid
    Valid {
        /// Index of the containing block
        block_index: u64,
        /// Hash of the containing block
        block_hash: String,
        /// First successful verification
        verified_at: DateTime<Utc>,
    },
    /// Verification failed
    Invalid {
        /// Failure reason
        reason: VoteFault,
    },
}

impl VoteVerification {
    /// True when the vote verified
    pub fn is_valid(&self) -> bool {
        matches!(self, VoteVerification::Valid { .. })
    }
}

/// Ledger statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerStats {
    /// Blocks in the chain, genesis included
    pub total_blocks: usize,
    /// Sealed votes
    pub total_votes: usize,
    /// Votes waiting in the pool
    pub pending_votes: usize,
    /// Difficulty applied to the next block
    pub difficulty: u32,
    /// Mean time between consecutive blocks (milliseconds)
    pub average_mining_interval_ms: u64,
    /// Height of the tail block
    pub chain_height: u64,
    /// Hash of the tail block, `None` when only genesis exists
    pub last_block_hash: Option<String>,
}

/// Difficulty in force from a block index onwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyEpoch {
    /// First block index sealed under this difficulty
    pub from_index: u64,
    /// Required leading hex zeros
    pub difficulty: u32,
}

/// First break found while auditing an election's vote chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteLinkBreak {
    /// Vote whose `previous_hash` is wrong
    pub vote_id: VoteId,
    /// Hash of the preceding vote (or `"0"`)
    pub expected_previous_hash: String,
    /// Value carried by the vote
    pub actual_previous_hash: String,
}

/// Election vote-chain audit report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElectionChainReport {
    /// Election audited
    pub election_id: String,
    /// Sealed votes walked
    pub votes_checked: usize,
    /// First broken link, if any
    pub first_break: Option<VoteLinkBreak>,
}

impl ElectionChainReport {
    /// True when every sealed vote links to its predecessor
    pub fn is_intact(&self) -> bool {
        self.first_break.is_none()
    }
}

/// Full ledger dump
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSnapshot {
    /// Sealed blocks
    pub chain: Vec<Block>,
    /// Pool contents in arrival order
    pub pending_votes: Vec<VoteRecord>,
    /// Difficulty applied to the next block
    pub difficulty: u32,
    /// Statistics at export time
    pub stats: LedgerStats,
}

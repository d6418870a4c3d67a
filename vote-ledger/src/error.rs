//! Error types for the vote ledger

use crate::types::VoteId;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or incomplete vote record
    #[error("Validation error: {0}")]
    Validation(String),

    /// Reported vote hash does not match the recomputation
    #[error("Hash mismatch for vote {vote_id}: expected {expected}, got {actual}")]
    HashMismatch {
        /// Vote that failed the check
        vote_id: VoteId,
        /// Recomputed hash
        expected: String,
        /// Hash carried by the record
        actual: String,
    },

    /// Vote ID already pending, being sealed, or sealed
    #[error("Duplicate vote: {0}")]
    DuplicateVote(VoteId),

    /// A sealed block failed recomputation, difficulty or linkage
    #[error("Chain integrity violated at block {index}: {reason}")]
    ChainIntegrity {
        /// First offending block index
        index: u64,
        /// What failed
        reason: String,
    },

    /// Lookup miss (block index out of range, unknown vote)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Proof-of-work search aborted before a nonce was found
    #[error("Mining cancelled")]
    MiningCancelled,

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl Error {
    /// Short label used for the rejection metric
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::HashMismatch { .. } => "hash_mismatch",
            Error::DuplicateVote(_) => "duplicate",
            Error::ChainIntegrity { .. } => "chain_integrity",
            Error::NotFound(_) => "not_found",
            Error::MiningCancelled => "cancelled",
            Error::Storage(_) => "storage",
            Error::Serialization(_) => "serialization",
            Error::Concurrency(_) => "concurrency",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
        }
    }
}

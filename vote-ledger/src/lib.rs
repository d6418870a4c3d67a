//! Vote Ledger
//!
//! Tamper-evident, append-only ledger of cast votes.
//!
//! # Architecture
//!
//! - **Vote Hash Chain**: each vote links to the previous vote of its election
//! - **Block Chain**: votes are sealed into proof-of-work blocks
//! - **Single Writer**: one actor serializes intake, sealing and resets
//! - **Snapshot Reads**: verification walks an immutable `Arc<Chain>`
//!
//! # Invariants
//!
//! - Genesis: `chain[0]` has index 0, no votes, previous hash `"0"`
//! - Linkage: `chain[i].previous_hash == chain[i-1].hash` for all i > 0
//! - Work: every sealed block hash meets the difficulty it was sealed under
//! - Exactly once: a vote ID is pending, in flight, or in one block

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod actor;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod miner;
pub mod pool;
pub mod storage;
pub mod types;
pub mod validation;

// Re-exports
pub use chain::Chain;
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use storage::Storage;
pub use types::{
    Ballot, Block, BlockFault, ChainVerification, ElectionChainReport, ElectionVote,
    LedgerSnapshot, LedgerStats, MiningOutcome, VoteFault, VoteId, VoteLocation, VoteRecord,
    VoteVerification,
};

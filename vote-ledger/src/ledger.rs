//! Main ledger orchestration layer
//!
//! This module ties together storage, the chain validator, and the actor
//! into a high-level API for vote intake, sealing, and verification.
//!
//! Mutations go through the actor mailbox. Reads clone the current
//! `Arc<Chain>` and walk it without holding any lock.
//!
//! # Example
//!
//! ```no_run
//! use vote_ledger::{Ballot, Config, Ledger};
//!
//! #[tokio::main]
//! async fn main() -> vote_ledger::Result<()> {
//!     let ledger = Ledger::open(Config::default()).await?;
//!
//!     let vote = ledger
//!         .cast_vote(Ballot {
//!             voter_id: "voter-1".into(),
//!             candidate_id: "candidate-3".into(),
//!             election_id: "general-2024".into(),
//!             constituency: "north".into(),
//!         })
//!         .await?;
//!
//!     ledger.mine_block().await?;
//!     assert!(ledger.verify_vote(&vote)?.is_valid());
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle, SharedState},
    chain::Chain,
    metrics::Metrics,
    pool::PendingPool,
    storage::Storage,
    types::{
        Ballot, ChainVerification, DifficultyEpoch, ElectionChainReport, ElectionVote,
        LedgerSnapshot, LedgerStats, MiningOutcome, VoteFault, VoteId, VoteLocation, VoteRecord,
        VoteVerification,
    },
    Config, Error, Result,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Main ledger interface
pub struct Ledger {
    /// Actor handle for mutations
    handle: LedgerHandle,

    /// Chain and pool (for reads)
    state: Arc<SharedState>,

    /// Actor task, awaited on shutdown
    actor: JoinHandle<()>,

    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open ledger with configuration
    ///
    /// With storage enabled, persisted blocks and pending votes are
    /// reloaded; an empty store starts from a fresh genesis block.
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let metrics = Metrics::new().map_err(|e| Error::Config(format!("metrics: {}", e)))?;

        let (chain, pool, storage) = if config.storage.enabled {
            let storage = Storage::open(&config.storage)?;
            let (chain, pool) = Self::restore(&storage, &config)?;
            (chain, pool, Some(storage))
        } else {
            let chain = Chain::genesis(Utc::now(), config.difficulty)?;
            (chain, PendingPool::new(), None)
        };

        if config.verify_on_open {
            if let Err(e) = chain.verify()?.into_result() {
                metrics.record_integrity_failure();
                return Err(e);
            }
        }

        tracing::info!(
            service = %config.service_name,
            blocks = chain.len(),
            pending = pool.len(),
            difficulty = chain.next_difficulty(),
            durable = storage.is_some(),
            "Ledger opened"
        );

        let state = Arc::new(SharedState::new(chain, pool));
        let (handle, actor) = spawn_ledger_actor(state.clone(), storage, metrics.clone(), &config);

        Ok(Self {
            handle,
            state,
            actor,
            metrics,
            config,
        })
    }

    /// Rebuild chain and pool from storage
    fn restore(storage: &Storage, config: &Config) -> Result<(Chain, PendingPool)> {
        let persisted = storage.load()?;

        if persisted.blocks.is_empty() {
            let chain = Chain::genesis(Utc::now(), config.difficulty)?;
            storage.reset(chain.tail(), chain.schedule())?;
            return Ok((chain, PendingPool::from_entries(persisted.pending)));
        }

        let schedule = persisted.schedule.unwrap_or_else(|| {
            vec![DifficultyEpoch {
                from_index: 1,
                difficulty: config.difficulty,
            }]
        });
        let mut chain = Chain::from_parts(persisted.blocks, schedule)?;

        // Configured difficulty governs blocks sealed from here on
        if chain.next_difficulty() != config.difficulty {
            chain = chain.with_difficulty(config.difficulty);
            storage.put_schedule(chain.schedule())?;
        }

        Ok((chain, PendingPool::from_entries(persisted.pending)))
    }

    /// Cloneable handle for submitting from other tasks
    pub fn handle(&self) -> LedgerHandle {
        self.handle.clone()
    }

    // Mutations

    /// Admit a pre-hashed vote into the pending pool
    ///
    /// Fails with `Validation`, `HashMismatch`, or `DuplicateVote`; a
    /// rejected vote leaves the ledger unchanged.
    pub async fn add_vote(&self, record: VoteRecord) -> Result<()> {
        self.handle.add_vote(record).await
    }

    /// Assign an ID, link to the election's latest vote, hash, and admit
    pub async fn cast_vote(&self, ballot: Ballot) -> Result<VoteRecord> {
        self.handle.cast_vote(ballot).await
    }

    /// Seal every pending vote into a new block
    pub async fn mine_block(&self) -> Result<MiningOutcome> {
        self.handle.mine_block().await
    }

    /// Discard all state and restart from a fresh genesis block
    pub async fn initialize(&self) -> Result<()> {
        self.handle.initialize().await
    }

    /// Change the difficulty applied from the next sealed block
    pub async fn set_difficulty(&self, difficulty: u32) -> Result<()> {
        self.handle.set_difficulty(difficulty).await
    }

    // Verification

    /// Check a vote against its sealed copy and containing block
    pub fn verify_vote(&self, record: &VoteRecord) -> Result<VoteVerification> {
        let chain = self.state.chain();

        let Some(location) = chain.find_vote(record.vote_id) else {
            return Ok(Self::vote_invalid(record.vote_id, VoteFault::NotSealed));
        };

        let sealed = &location.vote;
        if record.compute_hash() != sealed.hash || sealed.compute_hash() != sealed.hash {
            return Ok(Self::vote_invalid(record.vote_id, VoteFault::HashMismatch));
        }

        if !chain.is_block_valid(location.block_index)? {
            self.metrics.record_integrity_failure();
            return Ok(Self::vote_invalid(
                record.vote_id,
                VoteFault::ContainingBlockInvalid,
            ));
        }

        let verified_at = self.state.mark_verified(record.vote_id, Utc::now());
        tracing::debug!(vote_id = %record.vote_id, block_index = location.block_index, "Vote verified");

        Ok(VoteVerification::Valid {
            block_index: location.block_index,
            block_hash: location.block_hash,
            verified_at,
        })
    }

    fn vote_invalid(vote_id: VoteId, reason: VoteFault) -> VoteVerification {
        tracing::warn!(%vote_id, %reason, "Vote verification failed");
        VoteVerification::Invalid { reason }
    }

    /// Re-verify every block, reporting the first failure
    pub fn verify_chain(&self) -> Result<ChainVerification> {
        let report = self.state.chain().verify()?;
        if !report.is_valid() {
            self.metrics.record_integrity_failure();
        }
        Ok(report)
    }

    /// Check one block; out-of-range index is `NotFound`
    pub fn is_block_valid(&self, index: u64) -> Result<bool> {
        self.state.chain().is_block_valid(index)
    }

    /// Audit the per-election vote chain
    pub fn audit_election_chain(&self, election_id: &str) -> ElectionChainReport {
        let report = self.state.chain().audit_election(election_id);
        if let Some(first_break) = &report.first_break {
            tracing::warn!(
                election_id,
                vote_id = %first_break.vote_id,
                "Election vote chain broken"
            );
        }
        report
    }

    // Queries

    /// Find a sealed vote (the pool is not searched)
    pub fn find_vote(&self, vote_id: VoteId) -> Option<VoteLocation> {
        self.state.chain().find_vote(vote_id)
    }

    /// First successful verification time of a vote
    pub fn verified_at(&self, vote_id: VoteId) -> Option<DateTime<Utc>> {
        self.state.verified_at(vote_id)
    }

    /// Sealed votes of an election in chain order
    pub fn election_votes(&self, election_id: &str) -> Vec<ElectionVote> {
        self.state.chain().election_votes(election_id)
    }

    /// Ledger statistics
    pub fn stats(&self) -> LedgerStats {
        Self::stats_for(&self.state.chain(), self.state.pending_len())
    }

    fn stats_for(chain: &Chain, pending_votes: usize) -> LedgerStats {
        let tail = chain.tail();
        LedgerStats {
            total_blocks: chain.len(),
            total_votes: chain.total_votes(),
            pending_votes,
            difficulty: chain.next_difficulty(),
            average_mining_interval_ms: chain.average_interval_ms(),
            chain_height: tail.index,
            last_block_hash: (tail.index > 0).then(|| tail.hash.clone()),
        }
    }

    /// Dump chain, pool, and statistics
    pub fn export(&self) -> LedgerSnapshot {
        let chain = self.state.chain();
        let pending_votes = self.state.pending_votes();
        LedgerSnapshot {
            chain: chain.blocks().iter().map(|b| (**b).clone()).collect(),
            difficulty: chain.next_difficulty(),
            stats: Self::stats_for(&chain, pending_votes.len()),
            pending_votes,
        }
    }

    /// Prometheus collectors
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration the ledger was opened with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shutdown ledger, cancelling any running search
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await?;
        self.actor
            .await
            .map_err(|e| Error::Concurrency(format!("ledger actor failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SealingConfig, StorageConfig};
    use crate::types::{Block, GENESIS_PREVIOUS_HASH};
    use tempfile::TempDir;

    fn config(difficulty: u32) -> Config {
        Config {
            difficulty,
            ..Config::default()
        }
    }

    fn durable_config(difficulty: u32, dir: &TempDir) -> Config {
        Config {
            difficulty,
            storage: StorageConfig {
                enabled: true,
                data_dir: dir.path().to_path_buf(),
                sync_writes: false,
                ..StorageConfig::default()
            },
            ..Config::default()
        }
    }

    fn ballot(voter: &str, election: &str) -> Ballot {
        Ballot {
            voter_id: voter.into(),
            candidate_id: "candidate-1".into(),
            election_id: election.into(),
            constituency: "north".into(),
        }
    }

    fn record(id: u64, election: &str, previous_hash: &str) -> VoteRecord {
        VoteRecord::new(
            VoteId(id),
            ballot(&format!("voter-{}", id), election),
            Utc::now(),
            previous_hash,
        )
    }

    async fn seal(ledger: &Ledger) -> Arc<Block> {
        match ledger.mine_block().await.unwrap() {
            MiningOutcome::Sealed(block) => block,
            MiningOutcome::NothingPending => panic!("expected a sealed block"),
        }
    }

    #[tokio::test]
    async fn test_ledger_open() {
        let ledger = Ledger::open(config(1)).await.unwrap();
        let stats = ledger.stats();
        assert_eq!(stats.total_blocks, 1);
        assert_eq!(stats.chain_height, 0);
        assert_eq!(stats.last_block_hash, None);
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_two_votes_sealed_at_difficulty_four() {
        let ledger = Ledger::open(config(4)).await.unwrap();
        ledger.initialize().await.unwrap();

        let v1 = record(1, "E", GENESIS_PREVIOUS_HASH);
        let v2 = record(2, "E", &v1.hash);
        ledger.add_vote(v1.clone()).await.unwrap();
        ledger.add_vote(v2.clone()).await.unwrap();

        let block = seal(&ledger).await;
        assert_eq!(block.index, 1);
        assert_eq!(block.votes, vec![v1.clone(), v2.clone()]);
        assert!(block.hash.starts_with("0000"));

        assert_eq!(
            ledger.verify_chain().unwrap(),
            ChainVerification::Valid { total_blocks: 2 }
        );

        let votes = ledger.election_votes("E");
        assert_eq!(votes.len(), 2);
        assert_eq!(votes[0].vote, v1);
        assert_eq!(votes[1].vote, v2);
        assert!(votes.iter().all(|v| v.block_index == 1 && v.block_hash == block.hash));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_mine_empty_pool_is_nothing_pending() {
        let ledger = Ledger::open(config(1)).await.unwrap();
        let outcome = ledger.mine_block().await.unwrap();
        assert!(matches!(outcome, MiningOutcome::NothingPending));
        assert_eq!(ledger.stats().total_blocks, 1);
    }

    #[tokio::test]
    async fn test_duplicate_rejection() {
        let ledger = Ledger::open(config(1)).await.unwrap();
        let vote = record(1, "E", "0");

        ledger.add_vote(vote.clone()).await.unwrap();
        let err = ledger.add_vote(vote.clone()).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateVote(VoteId(1))));
        assert_eq!(ledger.stats().pending_votes, 1);

        // Still a duplicate once sealed
        seal(&ledger).await;
        let err = ledger.add_vote(vote).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateVote(VoteId(1))));
        assert_eq!(ledger.stats().pending_votes, 0);

        let rejected = ledger
            .metrics()
            .votes_rejected
            .with_label_values(&["duplicate"])
            .get();
        assert_eq!(rejected, 2);
    }

    #[tokio::test]
    async fn test_invalid_votes_rejected() {
        let ledger = Ledger::open(config(1)).await.unwrap();

        let mut tampered = record(1, "E", "0");
        tampered.candidate_id = "candidate-2".into();
        let err = ledger.add_vote(tampered).await.unwrap_err();
        assert!(matches!(err, Error::HashMismatch { .. }));

        let err = ledger.cast_vote(ballot("", "E")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        assert_eq!(ledger.stats().pending_votes, 0);
    }

    #[tokio::test]
    async fn test_no_loss_or_duplication_across_blocks() {
        let ledger = Ledger::open(config(1)).await.unwrap();
        let a = ledger.cast_vote(ballot("voter-a", "E")).await.unwrap();

        let first = seal(&ledger).await;
        ledger.cast_vote(ballot("voter-b", "E")).await.unwrap();
        let second = seal(&ledger).await;

        assert!(first.contains_vote(a.vote_id));
        assert!(!second.contains_vote(a.vote_id));
        assert_eq!(ledger.find_vote(a.vote_id).unwrap().block_index, 1);
        assert_eq!(ledger.stats().total_votes, 2);
    }

    #[tokio::test]
    async fn test_verify_vote() {
        let ledger = Ledger::open(config(1)).await.unwrap();
        let vote = ledger.cast_vote(ballot("voter-1", "E")).await.unwrap();

        // Pending votes are not sealed yet
        assert_eq!(
            ledger.verify_vote(&vote).unwrap(),
            VoteVerification::Invalid {
                reason: VoteFault::NotSealed
            }
        );

        let block = seal(&ledger).await;
        let first = ledger.verify_vote(&vote).unwrap();
        match &first {
            VoteVerification::Valid {
                block_index,
                block_hash,
                ..
            } => {
                assert_eq!(*block_index, 1);
                assert_eq!(block_hash, &block.hash);
            }
            other => panic!("unexpected: {:?}", other),
        }

        // The verification timestamp is recorded once
        let again = ledger.verify_vote(&vote).unwrap();
        assert_eq!(first, again);
        assert!(ledger.verified_at(vote.vote_id).is_some());

        let mut forged = vote.clone();
        forged.candidate_id = "candidate-2".into();
        assert_eq!(
            ledger.verify_vote(&forged).unwrap(),
            VoteVerification::Invalid {
                reason: VoteFault::HashMismatch
            }
        );
    }

    #[tokio::test]
    async fn test_cast_vote_links_per_election() {
        let ledger = Ledger::open(config(1)).await.unwrap();
        let a1 = ledger.cast_vote(ballot("voter-1", "A")).await.unwrap();
        let b1 = ledger.cast_vote(ballot("voter-2", "B")).await.unwrap();
        seal(&ledger).await;
        let a2 = ledger.cast_vote(ballot("voter-3", "A")).await.unwrap();

        assert_eq!(a1.previous_hash, GENESIS_PREVIOUS_HASH);
        assert_eq!(b1.previous_hash, GENESIS_PREVIOUS_HASH);
        assert_eq!(a2.previous_hash, a1.hash);

        seal(&ledger).await;
        let report = ledger.audit_election_chain("A");
        assert!(report.is_intact());
        assert_eq!(report.votes_checked, 2);
    }

    #[tokio::test]
    async fn test_audit_reports_unlinked_vote() {
        let ledger = Ledger::open(config(1)).await.unwrap();
        let v1 = record(1, "E", "0");
        // Self-consistent but not linked to v1
        let v2 = record(2, "E", "0");
        ledger.add_vote(v1).await.unwrap();
        ledger.add_vote(v2).await.unwrap();
        seal(&ledger).await;

        assert!(ledger.verify_chain().unwrap().is_valid());
        let report = ledger.audit_election_chain("E");
        assert_eq!(report.first_break.unwrap().vote_id, VoteId(2));
    }

    #[tokio::test]
    async fn test_initialize_resets_state() {
        let ledger = Ledger::open(config(1)).await.unwrap();
        let vote = ledger.cast_vote(ballot("voter-1", "E")).await.unwrap();
        seal(&ledger).await;
        ledger.verify_vote(&vote).unwrap();
        ledger.cast_vote(ballot("voter-2", "E")).await.unwrap();

        ledger.initialize().await.unwrap();

        let snapshot = ledger.export();
        assert_eq!(snapshot.chain.len(), 1);
        let genesis = &snapshot.chain[0];
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.previous_hash, GENESIS_PREVIOUS_HASH);
        assert!(genesis.votes.is_empty());
        assert!(snapshot.pending_votes.is_empty());
        assert!(ledger.find_vote(vote.vote_id).is_none());
        assert!(ledger.verified_at(vote.vote_id).is_none());
    }

    #[tokio::test]
    async fn test_stats_and_export() {
        let ledger = Ledger::open(config(2)).await.unwrap();
        ledger.cast_vote(ballot("voter-1", "E")).await.unwrap();
        let block = seal(&ledger).await;
        ledger.cast_vote(ballot("voter-2", "E")).await.unwrap();

        let stats = ledger.stats();
        assert_eq!(stats.total_blocks, 2);
        assert_eq!(stats.total_votes, 1);
        assert_eq!(stats.pending_votes, 1);
        assert_eq!(stats.difficulty, 2);
        assert_eq!(stats.chain_height, 1);
        assert_eq!(stats.last_block_hash.as_deref(), Some(block.hash.as_str()));

        let snapshot = ledger.export();
        assert_eq!(snapshot.stats, stats);
        assert_eq!(snapshot.pending_votes.len(), 1);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["chain"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_difficulty_change_keeps_history_valid() {
        let ledger = Ledger::open(config(1)).await.unwrap();
        ledger.cast_vote(ballot("voter-1", "E")).await.unwrap();
        seal(&ledger).await;

        ledger.set_difficulty(2).await.unwrap();
        ledger.cast_vote(ballot("voter-2", "E")).await.unwrap();
        let block = seal(&ledger).await;

        assert!(block.hash.starts_with("00"));
        assert_eq!(ledger.stats().difficulty, 2);
        assert!(ledger.verify_chain().unwrap().is_valid());
    }

    #[tokio::test]
    async fn test_out_of_range_block_is_not_found() {
        let ledger = Ledger::open(config(1)).await.unwrap();
        assert!(ledger.is_block_valid(0).unwrap());
        assert!(matches!(ledger.is_block_valid(1), Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_reopen_restores_chain_and_pool() {
        let dir = TempDir::new().unwrap();

        let ledger = Ledger::open(durable_config(1, &dir)).await.unwrap();
        let sealed = ledger.cast_vote(ballot("voter-1", "E")).await.unwrap();
        seal(&ledger).await;
        let pending = ledger.cast_vote(ballot("voter-2", "E")).await.unwrap();
        let before = ledger.export();
        ledger.shutdown().await.unwrap();

        let ledger = Ledger::open(durable_config(1, &dir)).await.unwrap();
        let after = ledger.export();
        assert_eq!(after.chain, before.chain);
        assert_eq!(after.pending_votes, vec![pending.clone()]);

        // Sealed IDs and election heads survive the restart
        let err = ledger.add_vote(sealed).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateVote(_)));
        let next = ledger.cast_vote(ballot("voter-3", "E")).await.unwrap();
        assert_eq!(next.vote_id, VoteId(3));
        assert_eq!(next.previous_hash, pending.hash);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_reopen_detects_tampering() {
        let dir = TempDir::new().unwrap();

        let ledger = Ledger::open(durable_config(1, &dir)).await.unwrap();
        ledger.cast_vote(ballot("voter-1", "E")).await.unwrap();
        seal(&ledger).await;
        ledger.shutdown().await.unwrap();

        {
            let storage = Storage::open(&durable_config(1, &dir).storage).unwrap();
            let mut block = storage.load().unwrap().blocks.remove(1);
            block.votes[0].candidate_id = "candidate-9".into();
            storage.append_block(&block, &[]).unwrap();
        }

        match Ledger::open(durable_config(1, &dir)).await {
            Err(Error::ChainIntegrity { index, .. }) => assert_eq!(index, 1),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("tampered chain opened"),
        }
    }

    #[tokio::test]
    async fn test_auto_seal_on_interval() {
        let config = Config {
            difficulty: 1,
            sealing: SealingConfig {
                auto_seal: true,
                seal_interval_ms: 20,
                max_pending_votes: 1_000,
            },
            ..Config::default()
        };
        let ledger = Ledger::open(config).await.unwrap();
        ledger.cast_vote(ballot("voter-1", "E")).await.unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(10), async {
            while ledger.stats().total_blocks < 2 {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(ledger.stats().pending_votes, 0);
    }
}

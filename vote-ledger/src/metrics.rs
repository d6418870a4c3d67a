//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `vote_ledger_votes_accepted_total` - Votes admitted to the pool
//! - `vote_ledger_votes_rejected_total{reason}` - Rejected submissions
//! - `vote_ledger_blocks_sealed_total` - Blocks appended
//! - `vote_ledger_pending_votes` - Current pool size
//! - `vote_ledger_mining_duration_seconds` - Nonce search wall time
//! - `vote_ledger_mining_attempts` - Hashes per sealed block
//! - `vote_ledger_mining_cancelled_total` - Aborted searches
//! - `vote_ledger_integrity_failures_total` - Failed chain verifications

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Votes admitted to the pool
    pub votes_accepted: IntCounter,

    /// Rejected submissions by error kind
    pub votes_rejected: IntCounterVec,

    /// Blocks appended
    pub blocks_sealed: IntCounter,

    /// Current pool size
    pub pending_votes: IntGauge,

    /// Nonce search wall time
    pub mining_duration: Histogram,

    /// Hashes computed per sealed block
    pub mining_attempts: Histogram,

    /// Aborted searches
    pub mining_cancelled: IntCounter,

    /// Failed chain verifications
    pub integrity_failures: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector on its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let votes_accepted = IntCounter::new(
            "vote_ledger_votes_accepted_total",
            "Votes admitted to the pending pool",
        )?;
        registry.register(Box::new(votes_accepted.clone()))?;

        let votes_rejected = IntCounterVec::new(
            Opts::new("vote_ledger_votes_rejected_total", "Rejected vote submissions"),
            &["reason"],
        )?;
        registry.register(Box::new(votes_rejected.clone()))?;

        let blocks_sealed =
            IntCounter::new("vote_ledger_blocks_sealed_total", "Blocks appended to the chain")?;
        registry.register(Box::new(blocks_sealed.clone()))?;

        let pending_votes = IntGauge::new("vote_ledger_pending_votes", "Votes awaiting sealing")?;
        registry.register(Box::new(pending_votes.clone()))?;

        let mining_duration = Histogram::with_opts(
            HistogramOpts::new(
                "vote_ledger_mining_duration_seconds",
                "Nonce search wall time",
            )
            .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
        )?;
        registry.register(Box::new(mining_duration.clone()))?;

        let mining_attempts = Histogram::with_opts(
            HistogramOpts::new("vote_ledger_mining_attempts", "Hashes computed per sealed block")
                .buckets(prometheus::exponential_buckets(16.0, 16.0, 6)?),
        )?;
        registry.register(Box::new(mining_attempts.clone()))?;

        let mining_cancelled = IntCounter::new(
            "vote_ledger_mining_cancelled_total",
            "Nonce searches aborted before completion",
        )?;
        registry.register(Box::new(mining_cancelled.clone()))?;

        let integrity_failures = IntCounter::new(
            "vote_ledger_integrity_failures_total",
            "Chain verifications that found a failing block",
        )?;
        registry.register(Box::new(integrity_failures.clone()))?;

        Ok(Self {
            votes_accepted,
            votes_rejected,
            blocks_sealed,
            pending_votes,
            mining_duration,
            mining_attempts,
            mining_cancelled,
            integrity_failures,
            registry,
        })
    }

    /// Record an accepted vote
    pub fn record_vote_accepted(&self, pending: usize) {
        self.votes_accepted.inc();
        self.pending_votes.set(pending as i64);
    }

    /// Record a rejected vote
    pub fn record_vote_rejected(&self, reason: &str) {
        self.votes_rejected.with_label_values(&[reason]).inc();
    }

    /// Record a sealed block
    pub fn record_block_sealed(&self, attempts: u64, duration_seconds: f64) {
        self.blocks_sealed.inc();
        self.mining_attempts.observe(attempts as f64);
        self.mining_duration.observe(duration_seconds);
    }

    /// Record an aborted search
    pub fn record_mining_cancelled(&self) {
        self.mining_cancelled.inc();
    }

    /// Record a failed chain verification
    pub fn record_integrity_failure(&self) {
        self.integrity_failures.inc();
    }

    /// Update pool size
    pub fn set_pending(&self, pending: usize) {
        self.pending_votes.set(pending as i64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

//! Actor-based concurrency for the ledger
//!
//! This module implements the single-writer pattern using Tokio actors:
//! - One logical writer serializes intake, sealing, and re-initialization
//! - The nonce search runs on a blocking worker, so intake keeps flowing
//! - Readers never go through the mailbox: they clone an `Arc<Chain>`
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │  add_vote / cast_vote → PendingPool (+ RocksDB)      │
//! │  mine_block → drain pool → spawn_blocking(mine)      │
//! │  Timer: seal_interval_ms or max_pending_votes        │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ JobCompletion (mpsc)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │   Storage::append_block() → swap Arc<Chain>          │
//! └──────────────────────────────────────────────────────┘
//! ```

use crate::chain::Chain;
use crate::config::{Config, SealingConfig, MAX_DIFFICULTY};
use crate::metrics::Metrics;
use crate::miner::{mine, BlockTemplate, MinedBlock};
use crate::pool::{PendingPool, PendingVote};
use crate::storage::Storage;
use crate::types::{
    Ballot, Block, MiningOutcome, VoteId, VoteRecord, GENESIS_PREVIOUS_HASH,
};
use crate::validation::validate_vote;
use crate::{Error, Result};
use chrono::{DateTime, SubsecRound, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

type MineResponder = oneshot::Sender<Result<MiningOutcome>>;

/// State shared between the actor (sole writer) and readers
#[derive(Debug)]
pub struct SharedState {
    chain: RwLock<Arc<Chain>>,
    pool: Mutex<PendingPool>,
    verifications: Mutex<HashMap<VoteId, DateTime<Utc>>>,
}

impl SharedState {
    /// Wrap an initial chain and pool
    pub fn new(chain: Chain, pool: PendingPool) -> Self {
        Self {
            chain: RwLock::new(Arc::new(chain)),
            pool: Mutex::new(pool),
            verifications: Mutex::new(HashMap::new()),
        }
    }

    /// Current sealed chain
    pub fn chain(&self) -> Arc<Chain> {
        self.chain.read().clone()
    }

    /// Pool size
    pub fn pending_len(&self) -> usize {
        self.pool.lock().len()
    }

    /// Pool contents in arrival order
    pub fn pending_votes(&self) -> Vec<VoteRecord> {
        self.pool.lock().votes().cloned().collect()
    }

    /// Record a verification time, keeping the first one
    pub fn mark_verified(&self, vote_id: VoteId, at: DateTime<Utc>) -> DateTime<Utc> {
        *self.verifications.lock().entry(vote_id).or_insert(at)
    }

    /// First successful verification of a vote
    pub fn verified_at(&self, vote_id: VoteId) -> Option<DateTime<Utc>> {
        self.verifications.lock().get(&vote_id).copied()
    }
}

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Admit a pre-hashed vote
    AddVote {
        record: VoteRecord,
        response: oneshot::Sender<Result<()>>,
    },

    /// Build, link and admit a vote from a ballot
    CastVote {
        ballot: Ballot,
        response: oneshot::Sender<Result<VoteRecord>>,
    },

    /// Seal the pending pool
    MineBlock { response: MineResponder },

    /// Reset to a genesis-only chain
    Initialize {
        response: oneshot::Sender<Result<()>>,
    },

    /// Change the difficulty for blocks sealed from now on
    SetDifficulty {
        difficulty: u32,
        response: oneshot::Sender<Result<()>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Outcome of a blocking nonce search
#[derive(Debug)]
struct JobCompletion {
    job_id: u64,
    result: Result<MinedBlock>,
}

/// The search currently running on a blocking worker
#[derive(Debug)]
struct MiningJob {
    id: u64,
    cancel: CancellationToken,
    batch: Vec<PendingVote>,
    batch_ids: HashSet<VoteId>,
    /// `None` for automatic sealing
    requester: Option<MineResponder>,
}

/// Actor that processes ledger messages
pub struct LedgerActor {
    /// Shared chain/pool
    state: Arc<SharedState>,

    /// Storage backend (when durable)
    storage: Option<Storage>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// Finished searches report back here
    completions_tx: mpsc::UnboundedSender<JobCompletion>,
    completions: mpsc::UnboundedReceiver<JobCompletion>,

    /// Running search
    job: Option<MiningJob>,
    next_job_id: u64,

    /// `mine_block` requests waiting for the running search
    waiting: VecDeque<MineResponder>,

    /// IDs of every sealed vote
    sealed_ids: HashSet<VoteId>,

    /// Hash of the latest accepted vote per election
    election_heads: HashMap<String, String>,

    /// ID assigned by the next `cast_vote`
    next_vote_id: VoteId,

    metrics: Metrics,
    sealing: SealingConfig,
}

impl LedgerActor {
    /// Create new actor over already-loaded state
    pub fn new(
        state: Arc<SharedState>,
        storage: Option<Storage>,
        mailbox: mpsc::Receiver<LedgerMessage>,
        metrics: Metrics,
        sealing: SealingConfig,
    ) -> Self {
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let mut actor = Self {
            state,
            storage,
            mailbox,
            completions_tx,
            completions,
            job: None,
            next_job_id: 0,
            waiting: VecDeque::new(),
            sealed_ids: HashSet::new(),
            election_heads: HashMap::new(),
            next_vote_id: VoteId(1),
            metrics,
            sealing,
        };
        actor.rebuild_indexes();
        actor
    }

    /// Derive sealed IDs, election heads and the ID counter from state
    fn rebuild_indexes(&mut self) {
        self.sealed_ids.clear();
        self.election_heads.clear();
        self.next_vote_id = VoteId(1);

        let chain = self.state.chain();
        let pool = self.state.pool.lock();
        let sealed = chain.blocks().iter().flat_map(|b| b.votes.iter());
        for vote in sealed.clone() {
            self.sealed_ids.insert(vote.vote_id);
        }
        for vote in sealed.chain(pool.votes()) {
            self.election_heads
                .insert(vote.election_id.clone(), vote.hash.clone());
            self.next_vote_id = self.next_vote_id.max(vote.vote_id.next());
        }
        self.metrics.set_pending(pool.len());
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let mut seal_timer = interval(Duration::from_millis(self.sealing.seal_interval_ms.max(1)));
        seal_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Process incoming messages
                msg = self.mailbox.recv() => {
                    match msg {
                        Some(LedgerMessage::Shutdown) | None => break,
                        Some(msg) => self.handle_message(msg),
                    }
                }

                // A search finished, failed or noticed its cancellation
                Some(completion) = self.completions.recv() => {
                    self.complete_job(completion);
                }

                // Periodic sealing
                _ = seal_timer.tick(), if self.sealing.auto_seal => {
                    if self.job.is_none() && self.state.pending_len() > 0 {
                        self.start_job(None);
                    }
                }
            }
        }

        self.cancel_job(true);
        for responder in self.waiting.drain(..) {
            let _ = responder.send(Err(Error::MiningCancelled));
        }
        tracing::info!("Ledger actor stopped");
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::AddVote { record, response } => {
                let result = self.add_vote(record);
                let _ = response.send(result);
                self.maybe_auto_seal();
            }

            LedgerMessage::CastVote { ballot, response } => {
                let result = self.cast_vote(ballot);
                let _ = response.send(result);
                self.maybe_auto_seal();
            }

            LedgerMessage::MineBlock { response } => {
                if self.job.is_some() {
                    tracing::debug!(queued = self.waiting.len() + 1, "Mining request queued");
                    self.waiting.push_back(response);
                } else {
                    self.start_job(Some(response));
                }
            }

            LedgerMessage::Initialize { response } => {
                let result = self.initialize();
                let _ = response.send(result);
                self.start_next();
            }

            LedgerMessage::SetDifficulty {
                difficulty,
                response,
            } => {
                let result = self.set_difficulty(difficulty);
                let _ = response.send(result);
                self.start_next();
            }

            LedgerMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }

    // Intake

    fn add_vote(&mut self, record: VoteRecord) -> Result<()> {
        let vote_id = record.vote_id;
        let result = self.admit(record);
        if let Err(e) = &result {
            self.metrics.record_vote_rejected(e.kind());
            tracing::warn!(%vote_id, error = %e, "Vote rejected");
        }
        result
    }

    /// Validate, check for duplicates, persist and pool as one step
    fn admit(&mut self, record: VoteRecord) -> Result<()> {
        validate_vote(&record)?;

        let vote_id = record.vote_id;
        let in_flight = self
            .job
            .as_ref()
            .is_some_and(|job| job.batch_ids.contains(&vote_id));
        if in_flight || self.sealed_ids.contains(&vote_id) {
            return Err(Error::DuplicateVote(vote_id));
        }

        let mut pool = self.state.pool.lock();
        if pool.contains(vote_id) {
            return Err(Error::DuplicateVote(vote_id));
        }

        if let Some(storage) = &self.storage {
            storage.put_pending(pool.next_seq(), &record)?;
        }

        self.election_heads
            .insert(record.election_id.clone(), record.hash.clone());
        self.next_vote_id = self.next_vote_id.max(vote_id.next());

        let election_id = record.election_id.clone();
        pool.insert(record)?;
        let pending = pool.len();
        drop(pool);

        self.metrics.record_vote_accepted(pending);
        tracing::debug!(%vote_id, election_id = %election_id, pending, "Vote accepted");
        Ok(())
    }

    fn cast_vote(&mut self, ballot: Ballot) -> Result<VoteRecord> {
        let previous_hash = self
            .election_heads
            .get(&ballot.election_id)
            .cloned()
            .unwrap_or_else(|| GENESIS_PREVIOUS_HASH.to_string());

        let record = VoteRecord::new(self.next_vote_id, ballot, Utc::now(), previous_hash);
        self.add_vote(record.clone())?;
        Ok(record)
    }

    // Sealing

    fn maybe_auto_seal(&mut self) {
        if self.sealing.auto_seal
            && self.job.is_none()
            && self.state.pending_len() >= self.sealing.max_pending_votes
        {
            self.start_job(None);
        }
    }

    /// Serve queued `mine_block` requests until one starts a search
    fn start_next(&mut self) {
        while self.job.is_none() {
            match self.waiting.pop_front() {
                Some(responder) => self.start_job(Some(responder)),
                None => {
                    self.maybe_auto_seal();
                    break;
                }
            }
        }
    }

    /// Drain the pool and hand the nonce search to a blocking worker
    fn start_job(&mut self, requester: Option<MineResponder>) {
        let batch = self.state.pool.lock().drain();
        if batch.is_empty() {
            if let Some(responder) = requester {
                let _ = responder.send(Ok(MiningOutcome::NothingPending));
            }
            return;
        }
        self.metrics.set_pending(0);

        let chain = self.state.chain();
        let tail = chain.tail();
        let template = BlockTemplate {
            index: tail.index + 1,
            timestamp: Utc::now().trunc_subsecs(3),
            votes: batch.iter().map(|p| p.vote.clone()).collect(),
            previous_hash: tail.hash.clone(),
            difficulty: chain.next_difficulty(),
        };

        self.next_job_id += 1;
        let job_id = self.next_job_id;
        let cancel = CancellationToken::new();

        tracing::info!(
            job_id,
            index = template.index,
            votes = batch.len(),
            difficulty = template.difficulty,
            automatic = requester.is_none(),
            "Sealing started"
        );

        let token = cancel.clone();
        let completions = self.completions_tx.clone();
        tokio::task::spawn_blocking(move || {
            let result = mine(template, &token);
            let _ = completions.send(JobCompletion { job_id, result });
        });

        self.job = Some(MiningJob {
            id: job_id,
            cancel,
            batch_ids: batch.iter().map(|p| p.vote.vote_id).collect(),
            batch,
            requester,
        });
    }

    fn complete_job(&mut self, completion: JobCompletion) {
        if self.job.as_ref().map(|job| job.id) != Some(completion.job_id) {
            tracing::debug!(job_id = completion.job_id, "Ignoring stale search result");
            return;
        }
        let Some(job) = self.job.take() else {
            return;
        };

        let outcome = completion
            .result
            .and_then(|mined| self.seal(&job.batch, mined));

        let reply = match outcome {
            Ok(block) => Ok(MiningOutcome::Sealed(block)),
            Err(e) => {
                tracing::error!(job_id = job.id, error = %e, "Sealing failed, votes returned to pool");
                self.restore(job.batch);
                Err(e)
            }
        };
        if let Some(responder) = job.requester {
            let _ = responder.send(reply);
        }

        self.start_next();
    }

    /// Persist and publish a mined block
    fn seal(&mut self, batch: &[PendingVote], mined: MinedBlock) -> Result<Arc<Block>> {
        let current = self.state.chain();
        let tail = current.tail();
        if mined.block.index != tail.index + 1 || mined.block.previous_hash != tail.hash {
            return Err(Error::Concurrency(format!(
                "block {} no longer extends the tail",
                mined.block.index
            )));
        }

        if let Some(storage) = &self.storage {
            let seqs: Vec<u64> = batch.iter().map(|p| p.seq).collect();
            storage.append_block(&mined.block, &seqs)?;
        }

        let next = current.appended(mined.block);
        let block = next.tail().clone();
        *self.state.chain.write() = Arc::new(next);

        self.sealed_ids.extend(block.votes.iter().map(|v| v.vote_id));
        self.metrics
            .record_block_sealed(mined.attempts, mined.elapsed.as_secs_f64());

        tracing::info!(
            index = block.index,
            votes = block.votes.len(),
            nonce = block.nonce,
            hash = %block.hash,
            "Block appended"
        );
        Ok(block)
    }

    /// Abort the running search; `restore` puts its votes back in the pool
    fn cancel_job(&mut self, restore: bool) {
        let Some(job) = self.job.take() else {
            return;
        };
        job.cancel.cancel();
        self.metrics.record_mining_cancelled();
        tracing::warn!(
            job_id = job.id,
            votes = job.batch.len(),
            restored = restore,
            "Sealing cancelled"
        );

        if restore {
            self.restore(job.batch);
        }
        if let Some(responder) = job.requester {
            let _ = responder.send(Err(Error::MiningCancelled));
        }
    }

    fn restore(&mut self, batch: Vec<PendingVote>) {
        let mut pool = self.state.pool.lock();
        pool.restore_front(batch);
        self.metrics.set_pending(pool.len());
    }

    // Lifecycle

    fn initialize(&mut self) -> Result<()> {
        let difficulty = self.state.chain().next_difficulty();
        let chain = Chain::genesis(Utc::now(), difficulty)?;

        if let Some(storage) = &self.storage {
            storage.reset(chain.tail(), chain.schedule())?;
        }

        self.cancel_job(false);
        let genesis_hash = chain.tail().hash.clone();
        *self.state.chain.write() = Arc::new(chain);
        self.state.pool.lock().clear();
        self.state.verifications.lock().clear();
        self.rebuild_indexes();

        tracing::info!(genesis = %genesis_hash, difficulty, "Ledger initialized");
        Ok(())
    }

    fn set_difficulty(&mut self, difficulty: u32) -> Result<()> {
        if difficulty > MAX_DIFFICULTY {
            return Err(Error::Config(format!(
                "difficulty {} exceeds {}",
                difficulty, MAX_DIFFICULTY
            )));
        }

        self.cancel_job(true);
        let next = self.state.chain().with_difficulty(difficulty);
        if let Some(storage) = &self.storage {
            storage.put_schedule(next.schedule())?;
        }
        let from_index = next.len();
        *self.state.chain.write() = Arc::new(next);

        tracing::info!(difficulty, from_index, "Difficulty changed");
        Ok(())
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Admit a pre-hashed vote
    pub async fn add_vote(&self, record: VoteRecord) -> Result<()> {
        self.request(|response| LedgerMessage::AddVote { record, response })
            .await
    }

    /// Build, link and admit a vote
    pub async fn cast_vote(&self, ballot: Ballot) -> Result<VoteRecord> {
        self.request(|response| LedgerMessage::CastVote { ballot, response })
            .await
    }

    /// Seal the pending pool, waiting for the search to finish
    pub async fn mine_block(&self) -> Result<MiningOutcome> {
        self.request(|response| LedgerMessage::MineBlock { response })
            .await
    }

    /// Reset to genesis
    pub async fn initialize(&self) -> Result<()> {
        self.request(|response| LedgerMessage::Initialize { response })
            .await
    }

    /// Change difficulty for subsequent blocks
    pub async fn set_difficulty(&self, difficulty: u32) -> Result<()> {
        self.request(|response| LedgerMessage::SetDifficulty {
            difficulty,
            response,
        })
        .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    state: Arc<SharedState>,
    storage: Option<Storage>,
    metrics: Metrics,
    config: &Config,
) -> (LedgerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.mailbox_capacity); // Bounded channel for backpressure
    let actor = LedgerActor::new(state, storage, rx, metrics, config.sealing.clone());

    let task = tokio::spawn(async move {
        actor.run().await;
    });

    (LedgerHandle::new(tx), task)
}

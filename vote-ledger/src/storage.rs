//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `blocks` - Sealed blocks (key: index, big-endian)
//! - `pending` - Pending pool (key: arrival sequence, big-endian)
//! - `meta` - Difficulty schedule
//!
//! Values use the same canonical JSON encoding as the block hash, so a
//! reloaded chain re-verifies byte-for-byte.

use crate::{
    config::StorageConfig,
    error::{Error, Result},
    pool::PendingVote,
    types::{Block, DifficultyEpoch, VoteRecord},
};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, WriteOptions, DB};

/// Column family names
const CF_BLOCKS: &str = "blocks";
const CF_PENDING: &str = "pending";
const CF_META: &str = "meta";

/// Meta keys
const META_SCHEDULE: &[u8] = b"difficulty_schedule";

/// Everything needed to rebuild a ledger
#[derive(Debug, Default)]
pub struct PersistedState {
    /// Sealed blocks in index order
    pub blocks: Vec<Block>,
    /// Pending votes in arrival order
    pub pending: Vec<PendingVote>,
    /// Difficulty schedule, if one was written
    pub schedule: Option<Vec<DifficultyEpoch>>,
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: DB,
    sync_writes: bool,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.max_background_jobs);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_BLOCKS, Self::cf_options_blocks()),
            ColumnFamilyDescriptor::new(CF_PENDING, Options::default()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB");

        Ok(Self {
            db,
            sync_writes: config.sync_writes,
        })
    }

    fn cf_options_blocks() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.sync_writes);
        self.db.write_opt(batch, &opts)?;
        Ok(())
    }

    // Load

    /// Read the full persisted state
    pub fn load(&self) -> Result<PersistedState> {
        let mut blocks = Vec::new();
        for item in self.db.iterator_cf(self.cf_handle(CF_BLOCKS)?, IteratorMode::Start) {
            let (_, value) = item?;
            blocks.push(serde_json::from_slice::<Block>(&value)?);
        }

        let mut pending = Vec::new();
        for item in self.db.iterator_cf(self.cf_handle(CF_PENDING)?, IteratorMode::Start) {
            let (key, value) = item?;
            pending.push(PendingVote {
                seq: Self::decode_key(&key)?,
                vote: serde_json::from_slice::<VoteRecord>(&value)?,
            });
        }

        let schedule = self
            .db
            .get_cf(self.cf_handle(CF_META)?, META_SCHEDULE)?
            .map(|raw| serde_json::from_slice::<Vec<DifficultyEpoch>>(&raw))
            .transpose()?;

        tracing::info!(
            blocks = blocks.len(),
            pending = pending.len(),
            "Loaded persisted ledger state"
        );

        Ok(PersistedState {
            blocks,
            pending,
            schedule,
        })
    }

    // Pending pool

    /// Persist a newly pooled vote
    pub fn put_pending(&self, seq: u64, vote: &VoteRecord) -> Result<()> {
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf_handle(CF_PENDING)?, seq.to_be_bytes(), serde_json::to_vec(vote)?);
        self.write(batch)
    }

    // Blocks

    /// Append a block and drop its votes from the pending pool (atomic)
    pub fn append_block(&self, block: &Block, sealed_seqs: &[u64]) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_blocks = self.cf_handle(CF_BLOCKS)?;
        batch.put_cf(cf_blocks, block.index.to_be_bytes(), serde_json::to_vec(block)?);

        let cf_pending = self.cf_handle(CF_PENDING)?;
        for seq in sealed_seqs {
            batch.delete_cf(cf_pending, seq.to_be_bytes());
        }

        self.write(batch)?;

        tracing::debug!(
            index = block.index,
            votes = block.votes.len(),
            "Block persisted"
        );

        Ok(())
    }

    /// Persist the difficulty schedule
    pub fn put_schedule(&self, schedule: &[DifficultyEpoch]) -> Result<()> {
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf_handle(CF_META)?, META_SCHEDULE, serde_json::to_vec(schedule)?);
        self.write(batch)
    }

    /// Replace everything with a fresh genesis state (atomic)
    pub fn reset(&self, genesis: &Block, schedule: &[DifficultyEpoch]) -> Result<()> {
        let mut batch = WriteBatch::default();

        for name in [CF_BLOCKS, CF_PENDING] {
            let cf = self.cf_handle(name)?;
            for item in self.db.iterator_cf(cf, IteratorMode::Start) {
                let (key, _) = item?;
                batch.delete_cf(cf, key);
            }
        }

        batch.put_cf(
            self.cf_handle(CF_BLOCKS)?,
            genesis.index.to_be_bytes(),
            serde_json::to_vec(genesis)?,
        );
        batch.put_cf(self.cf_handle(CF_META)?, META_SCHEDULE, serde_json::to_vec(schedule)?);

        self.write(batch)?;
        tracing::info!("Persisted ledger state reset to genesis");
        Ok(())
    }

    fn decode_key(key: &[u8]) -> Result<u64> {
        let bytes: [u8; 8] = key
            .try_into()
            .map_err(|_| Error::Storage(format!("malformed key of {} bytes", key.len())))?;
        Ok(u64::from_be_bytes(bytes))
    }
}

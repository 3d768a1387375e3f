//! RawDb
//!
//! The bulk loader's public face. Producers `put` from any number of
//! threads; `close` turns everything ingested into a LevelDB-format
//! database in the store's directory.
//!
//! ## State machine
//! ```text
//! Open → Ingesting → Sharding → Sorting → Building → Finalizing → Closed{valid}
//!            │                                                       ▲
//!            └──────────────── abandon / any failure ────────────────┘
//!                                                           (Closed{invalid})
//! ```
//!
//! `close` and `abandon` share one latch: only the first call that finds
//! the store in `Ingesting` does any work.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::build::{
    build_tables, shard_file_name, shard_keys, sort_shards, write_manifest, TableBuilder,
};
use crate::config::Options;
use crate::error::{RawDbError, Result};
use crate::format::MANIFEST_FILENAME;
use crate::ingest::{AppendLog, IngestQueue, KEYS_FILENAME, VALUES_FILENAME};
use crate::lock::DirLock;

/// Lifecycle of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Open,
    Ingesting,
    Sharding,
    Sorting,
    Building,
    Finalizing,
    Closed { valid: bool },
}

/// Write-once bulk loader producing a LevelDB-format directory
pub struct RawDb {
    dir: PathBuf,
    options: Options,
    queue: IngestQueue,
    state: Mutex<StoreState>,
    /// Held until the store is dropped
    _lock: DirLock,
}

impl RawDb {
    /// Open a store over `dir`, creating it if needed.
    ///
    /// Fails without touching the directory's contents if it cannot be
    /// created or another store holds its lock.
    pub fn open(dir: impl AsRef<Path>, options: Options) -> Result<Self> {
        Self::open_with_log(dir.as_ref(), options, AppendLog::create)
    }

    /// Open with default options and `concurrency` producers
    pub fn open_with_concurrency(dir: impl AsRef<Path>, concurrency: usize) -> Result<Self> {
        let options = Options::builder().concurrency(concurrency).build();
        Self::open(dir, options)
    }

    pub(crate) fn open_with_log<F>(dir: &Path, options: Options, make_log: F) -> Result<Self>
    where
        F: FnOnce(&Path) -> Result<AppendLog>,
    {
        options.validate()?;

        let invalid = |reason: String| RawDbError::InvalidDirectory {
            path: dir.display().to_string(),
            reason,
        };
        fs::create_dir_all(dir).map_err(|e| invalid(e.to_string()))?;
        if !dir.is_dir() {
            return Err(invalid("not a directory".into()));
        }

        let lock = DirLock::acquire(dir).map_err(|e| {
            RawDbError::Locked(format!("{}: {}", dir.display(), e))
        })?;

        let log = make_log(dir)?;
        let queue = IngestQueue::start(log, &options)?;

        tracing::info!(
            dir = %dir.display(),
            concurrency = options.concurrency,
            packing = ?options.block_packing,
            "store open, ingesting"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            options,
            queue,
            state: Mutex::new(StoreState::Ingesting),
            _lock: lock,
        })
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Queue `value` under `key`. Blocks while the backlog is full.
    ///
    /// Silently dropped once the store is invalid or closing. A later put
    /// of the same key wins.
    pub fn put(&self, key: &[u8], value: &[u8]) {
        self.queue.put(key, value);
    }

    /// No-op; the store never records deletions
    pub fn del(&self, key: &[u8]) {
        tracing::trace!(key_len = key.len(), "ignoring delete");
    }

    // =========================================================================
    // Finalization
    // =========================================================================

    /// Build the database. See [`RawDb::close_with_progress`].
    pub fn close(&self) -> Result<()> {
        self.close_with_progress(|_| {})
    }

    /// Wait for every queued write, then shard, sort, build tables and
    /// write the manifest.
    ///
    /// `progress` receives non-decreasing values in `0.0..=1.0`, ending
    /// with `1.0` on success. On failure the directory is not a database.
    /// Any call after the first returns `Err(AlreadyClosed)`.
    pub fn close_with_progress<F>(&self, mut progress: F) -> Result<()>
    where
        F: FnMut(f64),
    {
        self.latch(StoreState::Sharding)?;

        match self.finalize(&mut progress) {
            Ok(()) => {
                self.set_state(StoreState::Closed { valid: true });
                tracing::info!(dir = %self.dir.display(), "store closed");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "close failed, store is invalid");
                self.remove_temp_files();
                self.remove_manifest();
                self.set_state(StoreState::Closed { valid: false });
                Err(e)
            }
        }
    }

    /// Drop everything ingested without building. Safe to call repeatedly.
    pub fn abandon(&self) {
        if self.latch(StoreState::Closed { valid: false }).is_err() {
            return;
        }
        // the backlog still has to reach the writer before files go away
        if let Err(e) = self.queue.drain() {
            tracing::debug!(error = %e, "drain during abandon");
        }
        self.remove_temp_files();
        tracing::info!(dir = %self.dir.display(), "store abandoned");
    }

    fn finalize(&self, progress: &mut dyn FnMut(f64)) -> Result<()> {
        progress(0.0);
        let ingested = self.queue.drain()?;

        tracing::info!(records = ingested.record_count, bytes = ingested.value_bytes, "sharding");
        let shards = shard_keys(&self.dir)?;

        self.set_state(StoreState::Sorting);
        let plans = sort_shards(&shards, self.options.max_table_size)?;

        self.set_state(StoreState::Building);
        tracing::info!(tables = plans.len(), "building tables");
        let builder = TableBuilder::new(&self.dir, &self.options, &shards);
        let tables = build_tables(&plans, &builder, self.options.concurrency, |done, total| {
            progress(done as f64 / total as f64);
        })?;

        self.set_state(StoreState::Finalizing);
        write_manifest(&self.dir, &tables, ingested.record_count, plans.len())?;
        self.remove_temp_files();

        progress(1.0);
        Ok(())
    }

    /// Move from `Ingesting` to `next`, or fail if someone already did
    fn latch(&self, next: StoreState) -> Result<()> {
        let mut state = self.state.lock();
        if *state != StoreState::Ingesting {
            return Err(RawDbError::AlreadyClosed);
        }
        *state = next;
        Ok(())
    }

    fn set_state(&self, next: StoreState) {
        *self.state.lock() = next;
    }

    /// Best effort; partial tables are left behind
    fn remove_temp_files(&self) {
        let names = [VALUES_FILENAME.to_string(), KEYS_FILENAME.to_string()]
            .into_iter()
            .chain((0..=u8::MAX).map(shard_file_name));
        for name in names {
            match fs::remove_file(self.dir.join(&name)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(file = %name, error = %e, "could not remove temp file"),
            }
        }
    }

    /// A manifest from a failed close must not outlive it
    fn remove_manifest(&self) {
        match fs::remove_file(self.dir.join(MANIFEST_FILENAME)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(error = %e, "could not remove manifest"),
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn state(&self) -> StoreState {
        *self.state.lock()
    }

    /// False once ingestion failed, a close failed, or the store was abandoned
    pub fn is_valid(&self) -> bool {
        match self.state() {
            StoreState::Closed { valid } => valid,
            _ => self.queue.is_valid(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Last sequence number handed to a `put` (0 before the first)
    pub fn sequence(&self) -> u64 {
        self.queue.last_sequence()
    }
}

impl Drop for RawDb {
    fn drop(&mut self) {
        if self.state() == StoreState::Ingesting {
            tracing::warn!(dir = %self.dir.display(), "store dropped without close, abandoning");
            self.abandon();
        }
    }
}

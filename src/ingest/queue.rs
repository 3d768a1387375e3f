//! IngestQueue
//!
//! Fan-in from any number of producer threads to the single AppendLog
//! writer.
//!
//! ## Concurrency:
//! - `put` compresses on the caller's thread, then sends on a bounded
//!   channel of capacity `concurrency + 1`; a full channel blocks the caller
//! - One background thread owns the AppendLog and applies writes in order
//! - `sender` sits behind a RwLock so `drain` can hang up while producers
//!   hold read access

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::compression::BlockCompressor;
use crate::config::{BlockPackingPolicy, Options};
use crate::error::{RawDbError, Result};
use crate::format::{BlockBuilder, InternalKey, ValueType};

use super::append_log::{AppendLog, AppendLogSummary};

/// One accepted `put`, ready for the writer
struct PendingWrite {
    key: Vec<u8>,
    payload: Vec<u8>,
    sequence: u64,
}

pub struct IngestQueue {
    sender: RwLock<Option<Sender<PendingWrite>>>,
    writer: Mutex<Option<JoinHandle<AppendLog>>>,
    /// Cleared by the writer on the first failed append
    valid: Arc<AtomicBool>,
    /// Last issued sequence number
    sequence: AtomicU64,
    compressor: BlockCompressor,
    packing: BlockPackingPolicy,
}

impl IngestQueue {
    /// Spawn the writer thread over `log`
    pub fn start(log: AppendLog, options: &Options) -> Result<Self> {
        let (sender, receiver) = channel::bounded(options.backlog());
        let valid = Arc::new(AtomicBool::new(log.is_valid()));

        let writer_valid = Arc::clone(&valid);
        let writer = thread::Builder::new()
            .name("rawdb-ingest".to_string())
            .spawn(move || run_writer(log, receiver, writer_valid))?;

        Ok(Self {
            sender: RwLock::new(Some(sender)),
            writer: Mutex::new(Some(writer)),
            valid,
            sequence: AtomicU64::new(0),
            compressor: BlockCompressor::new(options.compression_level),
            packing: options.block_packing,
        })
    }

    /// Compress `value`, assign the next sequence, and enqueue the write.
    ///
    /// Blocks while the backlog is full. A no-op once the queue is invalid
    /// or drained.
    pub fn put(&self, key: &[u8], value: &[u8]) {
        if !self.is_valid() {
            return;
        }
        if key.is_empty() {
            tracing::warn!("dropping put with empty key");
            return;
        }

        let guard = self.sender.read();
        let Some(sender) = guard.as_ref() else {
            return;
        };

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let payload = match self.encode_payload(key, value, sequence) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "compression failed, invalidating store");
                self.valid.store(false, Ordering::SeqCst);
                return;
            }
        };

        let write = PendingWrite {
            key: key.to_vec(),
            payload,
            sequence,
        };
        if sender.send(write).is_err() {
            // writer is gone; only happens if it panicked
            self.valid.store(false, Ordering::SeqCst);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    /// Last sequence number handed out (0 before the first put)
    pub fn last_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Stop accepting writes, wait for the backlog to reach disk, and close
    /// both log files. Only the first call does any work.
    pub fn drain(&self) -> Result<AppendLogSummary> {
        self.sender.write().take();
        let handle = self.writer.lock().take().ok_or(RawDbError::AlreadyClosed)?;
        let log = handle
            .join()
            .map_err(|_| RawDbError::stage("ingest", "writer thread panicked"))?;

        if !self.is_valid() || !log.is_valid() {
            return Err(RawDbError::IngestFailed);
        }
        log.finish()
    }

    /// Bytes the values log will hold for this `put`
    fn encode_payload(&self, key: &[u8], value: &[u8], sequence: u64) -> Result<Vec<u8>> {
        match self.packing {
            BlockPackingPolicy::RecordPerBlock => {
                let internal_key = InternalKey::new(key, sequence, ValueType::Value);
                let mut block = BlockBuilder::new(1);
                block.add(internal_key.as_bytes(), value);
                self.compressor.compress(&block.finish())
            }
            BlockPackingPolicy::Batched => self.compressor.compress(value),
        }
    }
}

fn run_writer(mut log: AppendLog, receiver: Receiver<PendingWrite>, valid: Arc<AtomicBool>) -> AppendLog {
    for write in receiver {
        if !log.is_valid() {
            // keep draining so producers never block on a dead writer
            continue;
        }
        if let Err(e) = log.append(&write.key, &write.payload, write.sequence) {
            tracing::error!(
                error = %e,
                records = log.record_count(),
                "append failed, dropping all further writes"
            );
            valid.store(false, Ordering::SeqCst);
        }
    }
    tracing::debug!(
        records = log.record_count(),
        value_bytes = log.value_offset(),
        "ingest writer drained"
    );
    log
}

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use tkb_store::StoreRecord;

use crate::error::JournalError;

/// Flush/sync strategy for the commit log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncMode {
    /// `fsync` after every append (safest, highest latency).
    EveryWrite,
    /// Rely on OS page-cache buffering (fastest, least durable).
    #[default]
    OsDefault,
}

/// Configuration for the commit log.
#[derive(Clone, Copy, Debug, Default)]
pub struct JournalConfig {
    pub sync_mode: SyncMode,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

struct LogWriter {
    writer: BufWriter<File>,
    /// Current write offset in the log file.
    offset: u64,
}

/// Crash-recoverable append-only commit log.
///
/// Records are serialized with bincode, framed with a length prefix and a
/// CRC32 checksum, and appended to a single file. On recovery the file is
/// read front-to-back; entries that fail the CRC check are skipped (they
/// represent incomplete/torn writes from a crash).
pub struct CommitLog {
    path: PathBuf,
    writer: Mutex<LogWriter>,
    config: JournalConfig,
}

impl CommitLog {
    /// Open (or create) a commit log file at the given path.
    pub fn open(path: &Path, config: JournalConfig) -> Result<Self, JournalError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let offset = file.metadata()?.len();
        let writer = BufWriter::new(file);

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(LogWriter { writer, offset }),
            config,
        })
    }

    /// Append a record. Returns the byte offset of the entry.
    pub fn append(&self, record: &StoreRecord) -> Result<u64, JournalError> {
        let payload = bincode::serialize(record)
            .map_err(|e| JournalError::Serialization(e.to_string()))?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        frame.extend_from_slice(&payload);

        let mut w = self.writer.lock().expect("journal mutex poisoned");
        let entry_offset = w.offset;
        w.writer.write_all(&frame)?;
        w.writer.flush()?;
        if self.config.sync_mode == SyncMode::EveryWrite {
            w.writer.get_ref().sync_all()?;
        }
        w.offset += frame.len() as u64;

        debug!(offset = entry_offset, len = payload.len(), "journal append");
        Ok(entry_offset)
    }

    /// Recover all valid records from the log.
    ///
    /// Walks the file front-to-back. Entries failing the CRC check are
    /// logged and skipped; a short or nonsensical tail (a torn write from a
    /// crash) stops recovery.
    pub fn recover(&self) -> Result<Vec<StoreRecord>, JournalError> {
        let data = fs::read(&self.path)?;
        let mut records = Vec::new();
        let mut offset = 0usize;

        while data.len() - offset >= HEADER_SIZE {
            let header = &data[offset..offset + HEADER_SIZE];
            let length =
                u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            let body_start = offset + HEADER_SIZE;
            if length == 0 || body_start + length > data.len() {
                warn!(offset, length, "incomplete journal tail; stopping recovery");
                break;
            }

            let payload = &data[body_start..body_start + length];
            if crc32fast::hash(payload) != expected_crc {
                warn!(offset, "CRC mismatch; skipping entry");
                offset = body_start + length;
                continue;
            }

            match bincode::deserialize::<StoreRecord>(payload) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(offset, error = %e, "undecodable journal entry; skipping");
                }
            }
            offset = body_start + length;
        }

        debug!(recovered = records.len(), "journal recovery complete");
        Ok(records)
    }

    /// Current write offset.
    pub fn offset(&self) -> u64 {
        self.writer.lock().expect("journal mutex poisoned").offset
    }

    /// Path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

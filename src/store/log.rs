//! Append-only record log.
//!
//! The log is the source of truth for a table: the live record set and the
//! table metadata are both reconstructed by replaying it.
//!
//! ## File format
//!
//! `records.log` is a sequence of frames:
//!
//! ```text
//! [u32 LE: body length][u32 LE: crc32 of length][u32 LE: crc32 of body][body: JSON LogRecord]
//! ```
//!
//! Each frame is written with a single `write_all` followed by
//! `flush_and_sync()`. The first entry of every log is `Create`.
//!
//! The length carries its own checksum so a damaged length in a committed
//! frame is reported as corruption instead of being mistaken for a torn
//! tail. Only a frame whose header verifies and whose body runs past the
//! end of the file, a partial header, or trailing zero bytes count as torn.

use std::io::Write;
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VdbError};
use crate::storage::retry::RetryPolicy;
use crate::storage::{Storage, StorageOutput};
use crate::store::meta::TableMeta;
use crate::vector::{RecordId, VectorRecord};

pub const LOG_FILE: &str = "records.log";

const FRAME_HEADER_LEN: usize = 12;

/// Sequence number for log entries. The first entry has sequence 1.
pub type SeqNumber = u64;

/// A single operation in the record log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogEntry {
    /// Table creation. Always the first entry.
    Create { meta: TableMeta },
    /// A new record.
    Insert(VectorRecord),
    /// Tombstone for a live record.
    Delete { id: RecordId },
}

/// A log record combining a sequence number with an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub seq: SeqNumber,
    pub entry: LogEntry,
}

/// Writer side of a table's record log.
///
/// Not internally synchronized: the owning table keeps it behind its writer
/// mutex, which is what serializes inserts and deletes.
#[derive(Debug)]
pub struct RecordLog {
    storage: Arc<dyn Storage>,
    retry: RetryPolicy,
    output: Option<Box<dyn StorageOutput>>,
    committed_len: u64,
    last_seq: SeqNumber,
}

impl RecordLog {
    /// Start a fresh log whose first entry records `meta`.
    pub fn create(storage: Arc<dyn Storage>, retry: RetryPolicy, meta: &TableMeta) -> Result<Self> {
        if storage.file_exists(LOG_FILE) {
            storage.delete_file(LOG_FILE)?;
        }
        let mut log = Self {
            storage,
            retry,
            output: None,
            committed_len: 0,
            last_seq: 0,
        };
        log.append(LogEntry::Create { meta: meta.clone() })?;
        Ok(log)
    }

    /// Open an existing log and return every committed record in order.
    ///
    /// A torn final frame is cut off. A complete frame that fails
    /// verification is `StorageCorrupt`.
    pub fn open(storage: Arc<dyn Storage>, retry: RetryPolicy) -> Result<(Self, Vec<LogRecord>)> {
        let bytes = if storage.file_exists(LOG_FILE) {
            retry.run("read record log", || storage.read_all(LOG_FILE), || Ok(()))?
        } else {
            Vec::new()
        };

        let (records, valid_len) = decode_frames(&bytes)?;
        if valid_len < bytes.len() as u64 {
            warn!(
                "discarding torn tail of record log ({} of {} bytes valid)",
                valid_len,
                bytes.len()
            );
            retry.run(
                "truncate torn record log tail",
                || storage.truncate_file(LOG_FILE, valid_len),
                || Ok(()),
            )?;
        }
        debug!("replayed {} log records ({valid_len} bytes)", records.len());

        let last_seq = records.last().map_or(0, |r| r.seq);
        Ok((
            Self {
                storage,
                retry,
                output: None,
                committed_len: valid_len,
                last_seq,
            },
            records,
        ))
    }

    /// Durably append an entry and return its sequence number.
    ///
    /// On failure the log is truncated back to its last committed length, so
    /// a partial frame is never left behind for replay.
    pub fn append(&mut self, entry: LogEntry) -> Result<SeqNumber> {
        let seq = self.last_seq + 1;
        let frame = encode_frame(&LogRecord { seq, entry })?;

        let committed = self.committed_len;
        let storage = self.storage.as_ref();
        let output = &mut self.output;
        let result = self.retry.run(
            "append to record log",
            || {
                let written = write_frame(storage, output, &frame);
                if written.is_err() {
                    *output = None;
                }
                written
            },
            || rollback(storage, committed),
        );
        if let Err(e) = result {
            if let Err(rollback_err) = rollback(storage, committed) {
                warn!("failed to roll back record log after failed append: {rollback_err}");
            }
            return Err(e);
        }

        self.committed_len += frame.len() as u64;
        self.last_seq = seq;
        Ok(seq)
    }

    pub fn last_seq(&self) -> SeqNumber {
        self.last_seq
    }

    /// Bytes of committed frames.
    pub fn size(&self) -> u64 {
        self.committed_len
    }

    /// Release the file handle. A later append reopens it.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut output) = self.output.take() {
            output.close()?;
        }
        Ok(())
    }
}

fn write_frame(
    storage: &dyn Storage,
    output: &mut Option<Box<dyn StorageOutput>>,
    frame: &[u8],
) -> Result<()> {
    if output.is_none() {
        *output = Some(storage.create_output_append(LOG_FILE)?);
    }
    let writer = output
        .as_mut()
        .ok_or_else(|| VdbError::storage_unavailable("record log writer is not open"))?;
    writer.write_all(frame)?;
    writer.flush_and_sync()
}

fn rollback(storage: &dyn Storage, committed: u64) -> Result<()> {
    if storage.file_exists(LOG_FILE) {
        storage.truncate_file(LOG_FILE, committed)?;
    }
    Ok(())
}

fn encode_frame(record: &LogRecord) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(record)?;
    let len = u32::try_from(body.len())
        .map_err(|_| VdbError::invalid_argument("record too large for a log frame"))?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    frame.write_u32::<LittleEndian>(len)?;
    frame.write_u32::<LittleEndian>(crc32fast::hash(&len.to_le_bytes()))?;
    frame.write_u32::<LittleEndian>(crc32fast::hash(&body))?;
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode complete frames from `bytes`.
///
/// Returns the records and the length of the verified prefix. Bytes past
/// that prefix belong to a torn frame.
fn decode_frames(bytes: &[u8]) -> Result<(Vec<LogRecord>, u64)> {
    let mut records: Vec<LogRecord> = Vec::new();
    let mut pos = 0usize;

    while pos + FRAME_HEADER_LEN <= bytes.len() {
        let mut header = &bytes[pos..pos + FRAME_HEADER_LEN];
        let len = header.read_u32::<LittleEndian>()?;
        let len_crc = header.read_u32::<LittleEndian>()?;
        let crc = header.read_u32::<LittleEndian>()?;
        if crc32fast::hash(&len.to_le_bytes()) != len_crc {
            // A crash can leave a zero-filled tail behind a committed prefix.
            if bytes[pos..].iter().all(|&b| b == 0) {
                break;
            }
            return Err(VdbError::storage_corrupt(format!(
                "damaged frame header in record log at offset {pos}"
            )));
        }

        let start = pos + FRAME_HEADER_LEN;
        let Some(end) = start
            .checked_add(len as usize)
            .filter(|&end| end <= bytes.len())
        else {
            break;
        };
        let body = &bytes[start..end];

        if crc32fast::hash(body) != crc {
            return Err(VdbError::storage_corrupt(format!(
                "checksum mismatch in record log frame at offset {pos}"
            )));
        }
        let record: LogRecord = serde_json::from_slice(body).map_err(|e| {
            VdbError::storage_corrupt(format!("undecodable record log frame at offset {pos}: {e}"))
        })?;
        if let Some(prev) = records.last()
            && record.seq <= prev.seq
        {
            return Err(VdbError::storage_corrupt(format!(
                "record log sequence went from {} to {} at offset {pos}",
                prev.seq, record.seq
            )));
        }

        records.push(record);
        pos = end;
    }

    Ok((records, pos as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexOption;
    use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};
    use crate::vector::DistanceMetric;

    fn storage() -> Arc<dyn Storage> {
        Arc::new(MemoryStorage::new(MemoryStorageConfig::default()))
    }

    fn meta() -> TableMeta {
        TableMeta::new("t", DistanceMetric::Euclidean, IndexOption::Flat)
    }

    fn insert(id: RecordId) -> LogEntry {
        LogEntry::Insert(VectorRecord::new(id, vec![id as f32, 1.0], Some(b"p".to_vec())))
    }

    #[test]
    fn test_append_and_replay() {
        let storage = storage();
        let mut log = RecordLog::create(storage.clone(), RetryPolicy::none(), &meta()).unwrap();
        assert_eq!(log.append(insert(0)).unwrap(), 2);
        assert_eq!(log.append(insert(1)).unwrap(), 3);
        assert_eq!(log.append(LogEntry::Delete { id: 0 }).unwrap(), 4);
        log.close().unwrap();

        let (reopened, records) = RecordLog::open(storage.clone(), RetryPolicy::none()).unwrap();
        assert_eq!(reopened.last_seq(), 4);
        assert_eq!(reopened.size(), storage.file_size(LOG_FILE).unwrap());
        let seqs: Vec<_> = records.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
        assert!(matches!(records[0].entry, LogEntry::Create { .. }));
        assert_eq!(records[1].entry, insert(0));
        assert_eq!(records[3].entry, LogEntry::Delete { id: 0 });
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let storage = storage();
        let mut log = RecordLog::create(storage.clone(), RetryPolicy::none(), &meta()).unwrap();
        log.append(insert(0)).unwrap();
        let committed = log.size();
        log.close().unwrap();

        // Half a frame: a valid header promising more body than exists.
        let frame = encode_frame(&LogRecord {
            seq: 3,
            entry: insert(1),
        })
        .unwrap();
        let mut output = storage.create_output_append(LOG_FILE).unwrap();
        output.write_all(&frame[..frame.len() - 5]).unwrap();
        output.flush_and_sync().unwrap();
        output.close().unwrap();

        let (mut reopened, records) =
            RecordLog::open(storage.clone(), RetryPolicy::none()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(storage.file_size(LOG_FILE).unwrap(), committed);

        assert_eq!(reopened.append(insert(1)).unwrap(), 3);
        let (_, records) = RecordLog::open(storage, RetryPolicy::none()).unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_flipped_byte_is_corrupt() {
        let storage = storage();
        let mut log = RecordLog::create(storage.clone(), RetryPolicy::none(), &meta()).unwrap();
        log.append(insert(0)).unwrap();
        log.close().unwrap();

        let mut bytes = storage.read_all(LOG_FILE).unwrap();
        let last = bytes.len() - 2;
        bytes[last] ^= 0x01;
        storage.write_atomic(LOG_FILE, &bytes).unwrap();

        let err = RecordLog::open(storage.clone(), RetryPolicy::none()).unwrap_err();
        assert!(matches!(err, VdbError::StorageCorrupt(_)));
        // Committed data is never cut on corruption.
        assert_eq!(storage.file_size(LOG_FILE).unwrap(), bytes.len() as u64);
    }

    #[test]
    fn test_damaged_length_is_corrupt() {
        let storage = storage();
        let mut log = RecordLog::create(storage.clone(), RetryPolicy::none(), &meta()).unwrap();
        let create_len = log.size() as usize;
        log.append(insert(0)).unwrap();
        log.append(insert(1)).unwrap();
        log.close().unwrap();

        // A larger length would otherwise run past the end and look torn.
        let mut bytes = storage.read_all(LOG_FILE).unwrap();
        bytes[create_len + 3] ^= 0x40;
        storage.write_atomic(LOG_FILE, &bytes).unwrap();

        let err = RecordLog::open(storage.clone(), RetryPolicy::none()).unwrap_err();
        assert!(matches!(err, VdbError::StorageCorrupt(_)));
        assert_eq!(storage.read_all(LOG_FILE).unwrap(), bytes);
    }

    #[test]
    fn test_zero_filled_tail_is_torn() {
        let storage = storage();
        let mut log = RecordLog::create(storage.clone(), RetryPolicy::none(), &meta()).unwrap();
        log.append(insert(0)).unwrap();
        let committed = log.size();
        log.close().unwrap();

        let mut output = storage.create_output_append(LOG_FILE).unwrap();
        output.write_all(&[0u8; 64]).unwrap();
        output.close().unwrap();

        let (_, records) = RecordLog::open(storage.clone(), RetryPolicy::none()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(storage.file_size(LOG_FILE).unwrap(), committed);
    }

    #[test]
    fn test_open_missing_log_is_empty() {
        let (log, records) = RecordLog::open(storage(), RetryPolicy::none()).unwrap();
        assert!(records.is_empty());
        assert_eq!(log.last_seq(), 0);
        assert_eq!(log.size(), 0);
    }

    #[test]
    fn test_frame_layout() {
        let record = LogRecord {
            seq: 1,
            entry: LogEntry::Delete { id: 9 },
        };
        let frame = encode_frame(&record).unwrap();
        let body = &frame[FRAME_HEADER_LEN..];
        assert_eq!(
            u32::from_le_bytes(frame[0..4].try_into().unwrap()) as usize,
            body.len()
        );
        assert_eq!(
            u32::from_le_bytes(frame[4..8].try_into().unwrap()),
            crc32fast::hash(&frame[0..4])
        );
        assert_eq!(
            u32::from_le_bytes(frame[8..12].try_into().unwrap()),
            crc32fast::hash(body)
        );
        let (decoded, len) = decode_frames(&frame).unwrap();
        assert_eq!(decoded, vec![record]);
        assert_eq!(len, frame.len() as u64);
    }
}

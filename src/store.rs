//! Durable record storage for a single table.
//!
//! - [`log::RecordLog`]: append-only, checksummed log; the source of truth
//! - [`records::RecordStore`]: the live records replayed from that log
//! - [`meta::TableMeta`]: table metadata carried by the log's first entry

pub mod log;
pub mod meta;
pub mod records;

pub use self::log::{LOG_FILE, LogEntry, LogRecord, RecordLog, SeqNumber};
pub use self::meta::{TableMeta, validate_table_name};
pub use self::records::{RecordScan, RecordStore};

//! Write-ahead log
//!
//! Every committed write transaction is appended here as one batch before
//! its effects reach the memtable. On open, complete frames are replayed;
//! a torn or corrupt tail is dropped and everything before it survives.
//!
//! Frames are `[lsn u64][crc32 u32][len u32][bincode payload]`, all
//! little-endian. The log is truncated after each memtable flush.

mod entry;
mod writer;
mod reader;
mod recovery;

pub use entry::{WalEntry, Operation, HEADER_SIZE};
pub use writer::WalWriter;
pub use reader::{WalReader, ReadOutcome};
pub use recovery::{WalRecovery, RecoveryResult};

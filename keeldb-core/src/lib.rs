//! KeelDB Core - Durability Engine for an Embedded Database
//!
//! The durability core serializes every data mutation through a
//! write-ahead log before it is considered committed, and replays that
//! log after a crash.
//!
//! # Architecture
//!
//! - **WAL (Write-Ahead Log)**: segmented log files with a textual
//!   header and a binary row stream, named after the log sequence
//!   number at which they were opened
//! - **Cursor**: corruption-tolerant sequential reader that
//!   resynchronizes past damaged bytes instead of giving up on a
//!   segment
//! - **Transaction manager**: optimistic in-memory apply, durable
//!   append, then commit; compensating rollback on failure

pub mod txn;
pub mod wal;

mod error;
mod types;

pub use error::{Error, Result};
pub use types::*;

/// KeelDB version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod config {
    /// Scratch buffer budget for a replaying cursor (128KB)
    pub const CURSOR_SCRATCH_BUDGET: usize = 128 * 1024;

    /// WAL appends slower than this are logged as warnings (500ms)
    pub const TOO_LONG_THRESHOLD_MS: u64 = 500;
}

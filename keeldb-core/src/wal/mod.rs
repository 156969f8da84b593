//! Write-Ahead Log (WAL) file format
//!
//! The WAL provides durability by writing every mutation to disk
//! before it is committed to memory. After a crash the log is replayed
//! to recover the database state.
//!
//! A log directory holds segments named after the LSN at which each
//! was opened (`<16-digit signature>.xlog`, or `.snap` for snapshots).
//! Each segment starts with a small text header and continues with a
//! binary row stream:
//!
//! ```text
//! XLOG\n                    filetype line
//! 0.11\n                    version line
//! key: value\n              free-form header fields
//! \n                        blank line terminator
//! ┌────────┬─────────────┬─────┬────────┬─────────┐
//! │ marker │ row header  │ tag │ cookie │ payload │   repeated
//! │  (4)   │    (28)     │ (2) │  (8)   │  (len)  │
//! └────────┴─────────────┴─────┴────────┴─────────┘
//! 10adab1e                  end-of-log marker on clean close
//! ```

mod cursor;
mod dir;
mod replay;
mod row;
mod segment;

pub use cursor::Cursor;
pub use dir::LogDir;
pub use replay::{replay, ReplayStats};
pub use row::{Row, RowHeader, EOF_MARKER, HEADER_SIZE, ROW_MARKER};
pub use segment::Segment;

/// Protocol version string of the supported format generation
pub const LOG_VERSION: &str = "0.11\n";

/// What a log directory holds: redo segments or snapshots, never mixed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// Write-ahead log segments
    Wal,
    /// Snapshot segments
    Snapshot,
}

impl LogKind {
    /// Filename extension for segments of this kind
    pub fn extension(self) -> &'static str {
        match self {
            LogKind::Wal => "xlog",
            LogKind::Snapshot => "snap",
        }
    }

    /// First header line of segments of this kind
    pub fn filetype(self) -> &'static str {
        match self {
            LogKind::Wal => "XLOG\n",
            LogKind::Snapshot => "SNAP\n",
        }
    }
}

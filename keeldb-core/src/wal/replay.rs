//! Directory-wide replay
//!
//! Walks every segment of a log directory in signature order and
//! streams the decoded rows to a caller-supplied sink, typically the
//! storage engine during recovery.

use super::{Cursor, LogDir, Row, Segment};
use crate::{Error, Result};
use tracing::info;

/// Totals for one replay run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    /// Segments replayed
    pub segments: u64,
    /// Rows delivered to the sink
    pub rows: u64,
    /// Whether the final segment ended with the end-of-log marker
    pub clean_eof: bool,
}

/// Replay every row of every segment, oldest first.
///
/// An open tail (no end-of-log marker) is tolerated only on the last
/// segment, which may still be the active write target; on any earlier
/// segment it is corruption and fails the run. Errors from the sink
/// abort the run as well.
pub fn replay<F>(dir: &LogDir, mut sink: F) -> Result<ReplayStats>
where
    F: FnMut(Row) -> Result<()>,
{
    let signatures = dir.scan()?;
    let mut stats = ReplayStats::default();

    for (idx, &signature) in signatures.iter().enumerate() {
        let is_last = idx == signatures.len() - 1;
        let mut segment = Segment::open_for_read(dir, signature)?;
        let mut cursor = Cursor::new(&mut segment)?;

        let mut segment_rows = 0u64;
        while let Some(row) = cursor.next()? {
            sink(row)?;
            segment_rows += 1;
        }

        let sealed = cursor.eof_reached();
        cursor.close()?;
        info!(
            signature,
            rows = segment_rows,
            sealed,
            "replayed segment {}",
            segment.path().display()
        );
        segment.close()?;

        if !sealed && !is_last {
            return Err(Error::Corruption(format!(
                "segment {:016} has an open tail but is not the last segment",
                signature
            )));
        }

        stats.segments += 1;
        stats.rows += segment_rows;
        stats.clean_eof = sealed;
    }

    Ok(stats)
}

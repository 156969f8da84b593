//! Log segment files
//!
//! A segment is one on-disk log file: a short text header (filetype
//! line, version line, free-form fields, blank line) followed by the
//! binary row stream. Opening a segment validates the header and
//! leaves the stream positioned at the first row.

use super::{LogDir, LogKind, LOG_VERSION};
use crate::{Error, Result, Signature};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek};
use std::path::{Path, PathBuf};

/// A read-only handle on one log segment
#[derive(Debug)]
pub struct Segment {
    path: PathBuf,
    kind: LogKind,
    pub(crate) file: BufReader<File>,
    /// Running count of rows read from this segment across cursors
    pub(crate) rows: u64,
}

impl Segment {
    /// Open the segment with the given signature and validate its
    /// header.
    ///
    /// Fails with [`Error::InvalidFormat`] if the filetype does not
    /// match the directory kind, the version is unsupported, or the
    /// header is truncated.
    pub fn open_for_read(dir: &LogDir, signature: Signature) -> Result<Self> {
        let path = dir.format_path(signature);
        let file = File::open(&path)?;
        let mut segment = Self {
            path,
            kind: dir.kind(),
            file: BufReader::new(file),
            rows: 0,
        };
        segment.read_meta()?;
        Ok(segment)
    }

    /// Read and validate the text header, consuming it
    fn read_meta(&mut self) -> Result<()> {
        let filetype = self.read_header_line()?;
        let version = self.read_header_line()?;

        if version != LOG_VERSION {
            return Err(Error::InvalidFormat(format!(
                "{}: unknown version ({})",
                self.path.display(),
                version.trim_end()
            )));
        }
        if filetype != self.kind.filetype() {
            return Err(Error::InvalidFormat(format!(
                "{}: unknown filetype ({})",
                self.path.display(),
                filetype.trim_end()
            )));
        }

        // Remaining header lines are free-form `key: value` fields,
        // kept extensible; consume them up to the blank terminator.
        loop {
            let line = self.read_header_line()?;
            if line == "\n" || line == "\r\n" {
                return Ok(());
            }
        }
    }

    fn read_header_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = self.file.read_line(&mut line)?;
        if n == 0 {
            return Err(Error::InvalidFormat(format!(
                "{}: truncated log file header",
                self.path.display()
            )));
        }
        Ok(line)
    }

    /// Segment file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Kind this segment was opened as
    pub fn kind(&self) -> LogKind {
        self.kind
    }

    /// Rows read from this segment so far
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Current byte offset in the segment
    pub(crate) fn stream_position(&mut self) -> Result<u64> {
        Ok(self.file.stream_position()?)
    }

    /// Close the segment, consuming the handle either way
    pub fn close(self) -> Result<()> {
        // A read-only stream has nothing to flush; dropping the file
        // releases the descriptor. The Result keeps the contract
        // symmetric with write-side handles.
        drop(self.file);
        Ok(())
    }
}

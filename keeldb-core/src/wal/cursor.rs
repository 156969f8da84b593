//! Corruption-tolerant log cursor
//!
//! A cursor replays rows from one segment sequentially. It locates
//! rows by scanning for the row marker, so leading garbage between
//! rows is skipped rather than fatal, and a row that fails its
//! checksum is resynchronized past by restarting the scan one byte
//! after its marker. `good_offset` never advances past unverified
//! bytes and is the safe rewind point when the cursor is closed.

use super::row::{Row, RowHeader, BODY_PREFIX_SIZE, EOF_MARKER, ROW_MARKER};
use super::Segment;
use crate::{config, Result};
use std::io::{Read, Seek, SeekFrom};
use tracing::{debug, error, warn};

/// Stateful sequential reader over a segment
pub struct Cursor<'a> {
    segment: &'a mut Segment,
    rows_read: u64,
    good_offset: u64,
    eof_reached: bool,
    /// Reusable row buffer, kept under a fixed budget between rows
    scratch: Vec<u8>,
}

impl<'a> Cursor<'a> {
    /// Begin replay at the segment's current position
    pub fn new(segment: &'a mut Segment) -> Result<Self> {
        let good_offset = segment.stream_position()?;
        Ok(Self {
            segment,
            rows_read: 0,
            good_offset,
            eof_reached: false,
            scratch: Vec::new(),
        })
    }

    /// Rows decoded so far
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Byte offset just past the last successfully decoded row
    pub fn good_offset(&self) -> u64 {
        self.good_offset
    }

    /// Whether the end-of-log marker was read
    pub fn eof_reached(&self) -> bool {
        self.eof_reached
    }

    /// Decode the next row.
    ///
    /// `Ok(None)` means end of log: either the segment is cleanly
    /// sealed (`eof_reached` is then true) or the tail is incomplete.
    /// An incomplete tail is never a hard error here; the caller
    /// decides whether an open tail is acceptable for this segment.
    pub fn next(&mut self) -> Result<Option<Row>> {
        if self.eof_reached {
            return Ok(None);
        }

        // Don't let the scratch buffer grow without bound over a long
        // replay.
        self.scratch.clear();
        if self.scratch.capacity() > config::CURSOR_SCRATCH_BUDGET {
            self.scratch.shrink_to(config::CURSOR_SCRATCH_BUDGET);
        }

        let mut restart_at: Option<u64> = None;
        loop {
            if let Some(offset) = restart_at {
                self.segment.file.seek(SeekFrom::Start(offset + 1))?;
            }

            let Some(mut magic) = read_u32(&mut self.segment.file)? else {
                return self.finish_eof();
            };

            // Slide a 4-byte window one byte at a time until the row
            // marker lines up; markers may straddle any buffer
            // boundary.
            while magic != ROW_MARKER {
                let mut byte = [0u8; 1];
                match self.segment.file.read_exact(&mut byte) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                        debug!("eof while looking for row marker");
                        return self.finish_eof();
                    }
                    Err(e) => return Err(e.into()),
                }
                magic = magic >> 8 | u32::from(byte[0]) << 24;
            }

            let marker_offset = self.segment.stream_position()? - 4;
            if restart_at.is_none() && marker_offset != self.good_offset {
                warn!(
                    "skipped {} bytes after offset {:#010x}",
                    marker_offset - self.good_offset,
                    self.good_offset
                );
            }
            debug!("row marker found at {:#010x}", marker_offset);
            restart_at = Some(marker_offset);

            // Phase one: the fixed header tells us how much payload
            // follows.
            let Some(header) = RowHeader::read_from(&mut self.segment.file)? else {
                return self.finish_eof();
            };
            if !header.verify() {
                warn!(
                    "row header checksum mismatch at {:#010x}, resynchronizing",
                    marker_offset
                );
                continue;
            }

            // Phase two: tag, cookie and payload in one read.
            let body_len = BODY_PREFIX_SIZE + header.payload_len as usize;
            self.scratch.resize(body_len, 0);
            match self.segment.file.read_exact(&mut self.scratch) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return self.finish_eof();
                }
                Err(e) => return Err(e.into()),
            }

            let payload_crc = crc32fast::hash(&self.scratch[BODY_PREFIX_SIZE..]);
            if payload_crc != header.payload_crc32 {
                warn!(
                    "row payload checksum mismatch at {:#010x} (lsn {}), resynchronizing",
                    marker_offset, header.lsn
                );
                continue;
            }

            let row = Row::from_parts(&header, &self.scratch);
            self.good_offset = self.segment.stream_position()?;
            self.rows_read += 1;
            return Ok(Some(row));
        }
    }

    /// Classify the segment tail once no further complete row can be
    /// read.
    ///
    /// A fully read segment ends in exactly one 4-byte magic after the
    /// last good row: the end-of-log marker for a sealed segment, or a
    /// row marker when a writer is still appending. Anything else past
    /// `good_offset` is left unconsumed.
    fn finish_eof(&mut self) -> Result<Option<Row>> {
        let pos = self.segment.stream_position()?;
        if pos == self.good_offset + 4 {
            self.segment.file.seek(SeekFrom::Start(self.good_offset))?;
            match read_u32(&mut self.segment.file)? {
                None => error!("can't read end-of-log marker"),
                Some(EOF_MARKER) => {
                    self.good_offset = self.segment.stream_position()?;
                    self.eof_reached = true;
                }
                Some(ROW_MARKER) => {
                    // A row marker with nothing behind it: fine while
                    // the segment is still the active write target,
                    // corrupt otherwise. The caller decides.
                }
                Some(magic) => {
                    error!("corrupt end-of-log marker: {:#010x}", magic);
                }
            }
        }
        Ok(None)
    }

    /// Stop replay: rewind the stream to `good_offset` so a later
    /// append-mode open sees a clean tail, and report rows read back
    /// to the segment.
    pub fn close(self) -> Result<()> {
        self.segment.file.seek(SeekFrom::Start(self.good_offset))?;
        self.segment.rows += self.rows_read;
        Ok(())
    }
}

fn read_u32(reader: &mut impl Read) -> Result<Option<u32>> {
    let mut buf = [0u8; 4];
    match reader.read_exact(&mut buf) {
        Ok(()) => Ok(Some(u32::from_le_bytes(buf))),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::{LogDir, LogKind};
    use bytes::Bytes;
    use std::fs::{File, OpenOptions};
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;

    const HEADER: &[u8] = b"XLOG\n0.11\n\n";

    fn sample_row(lsn: i64, payload: &[u8]) -> Row {
        Row {
            lsn,
            tm: 1700000000.0 + lsn as f64,
            tag: 1,
            cookie: 7,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    fn write_file(dir: &Path, chunks: &[&[u8]]) {
        let mut f = File::create(dir.join("0000000000000001.xlog")).unwrap();
        f.write_all(HEADER).unwrap();
        for chunk in chunks {
            f.write_all(chunk).unwrap();
        }
    }

    fn open(dir: &Path) -> Segment {
        let dir = LogDir::new(dir, LogKind::Wal);
        Segment::open_for_read(&dir, 1).unwrap()
    }

    #[test]
    fn test_replays_all_rows_then_clean_eof() {
        let tmp = TempDir::new().unwrap();
        let rows: Vec<Row> = (1..=3).map(|i| sample_row(i, b"payload")).collect();
        let encoded: Vec<_> = rows.iter().map(Row::encode).collect();
        let mut chunks: Vec<&[u8]> = encoded.iter().map(|b| b.as_ref()).collect();
        let eof = EOF_MARKER.to_le_bytes();
        chunks.push(&eof);
        write_file(tmp.path(), &chunks);

        let file_len = HEADER.len() as u64
            + encoded.iter().map(|b| b.len() as u64).sum::<u64>()
            + 4;

        let mut segment = open(tmp.path());
        let mut cursor = Cursor::new(&mut segment).unwrap();
        for expected in &rows {
            assert_eq!(cursor.next().unwrap().as_ref(), Some(expected));
        }
        assert_eq!(cursor.next().unwrap(), None);
        assert!(cursor.eof_reached());
        assert_eq!(cursor.good_offset(), file_len);
        assert_eq!(cursor.rows_read(), 3);

        // Terminal: stays at end of log
        assert_eq!(cursor.next().unwrap(), None);

        cursor.close().unwrap();
        assert_eq!(segment.rows(), 3);
    }

    #[test]
    fn test_garbage_between_rows_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let a = sample_row(1, b"first");
        let b = sample_row(2, b"second");
        let eof = EOF_MARKER.to_le_bytes();
        write_file(
            tmp.path(),
            &[&a.encode(), b"\x00\x01\x02junk", &b.encode(), &eof],
        );

        let mut segment = open(tmp.path());
        let mut cursor = Cursor::new(&mut segment).unwrap();
        assert_eq!(cursor.next().unwrap(), Some(a));
        assert_eq!(cursor.next().unwrap(), Some(b));
        assert_eq!(cursor.next().unwrap(), None);
        assert!(cursor.eof_reached());
    }

    #[test]
    fn test_corrupt_payload_is_resynced_past() {
        let tmp = TempDir::new().unwrap();
        let a = sample_row(1, b"aaaa");
        let b = sample_row(2, b"bbbb");
        let c = sample_row(3, b"cccc");
        let mut bad = b.encode().to_vec();
        let last = bad.len() - 1;
        bad[last] ^= 0xff; // corrupt one payload byte
        let eof = EOF_MARKER.to_le_bytes();
        write_file(tmp.path(), &[&a.encode(), &bad, &c.encode(), &eof]);

        let mut segment = open(tmp.path());
        let mut cursor = Cursor::new(&mut segment).unwrap();
        assert_eq!(cursor.next().unwrap(), Some(a));
        assert_eq!(cursor.next().unwrap(), Some(c));
        assert_eq!(cursor.next().unwrap(), None);
        assert!(cursor.eof_reached());
        assert_eq!(cursor.rows_read(), 2);
    }

    #[test]
    fn test_corrupt_header_is_resynced_past() {
        let tmp = TempDir::new().unwrap();
        let a = sample_row(1, b"aaaa");
        let b = sample_row(2, b"bbbb");
        let mut bad = a.encode().to_vec();
        bad[8] ^= 0xff; // corrupt the lsn field inside the header
        let eof = EOF_MARKER.to_le_bytes();
        write_file(tmp.path(), &[&bad, &b.encode(), &eof]);

        let mut segment = open(tmp.path());
        let mut cursor = Cursor::new(&mut segment).unwrap();
        assert_eq!(cursor.next().unwrap(), Some(b));
        assert_eq!(cursor.next().unwrap(), None);
        assert!(cursor.eof_reached());
    }

    #[test]
    fn test_short_payload_is_end_of_log() {
        let tmp = TempDir::new().unwrap();
        let row = sample_row(1, b"12345"); // payload_len = 5
        let encoded = row.encode();
        let truncated = &encoded[..encoded.len() - 2]; // only 3 payload bytes on disk
        write_file(tmp.path(), &[truncated]);

        let mut segment = open(tmp.path());
        let start = segment.stream_position().unwrap();
        let mut cursor = Cursor::new(&mut segment).unwrap();
        assert_eq!(cursor.next().unwrap(), None);
        assert!(!cursor.eof_reached());
        assert_eq!(cursor.good_offset(), start);
    }

    #[test]
    fn test_open_tail_row_marker() {
        let tmp = TempDir::new().unwrap();
        let row = sample_row(1, b"payload");
        let marker = ROW_MARKER.to_le_bytes();
        write_file(tmp.path(), &[&row.encode(), &marker]);

        let mut segment = open(tmp.path());
        let mut cursor = Cursor::new(&mut segment).unwrap();
        assert_eq!(cursor.next().unwrap(), Some(row.clone()));
        let after_row = cursor.good_offset();
        assert_eq!(cursor.next().unwrap(), None);
        // Not a clean close, and good_offset stays before the marker
        assert!(!cursor.eof_reached());
        assert_eq!(cursor.good_offset(), after_row);
    }

    #[test]
    fn test_corrupt_trailer() {
        let tmp = TempDir::new().unwrap();
        let row = sample_row(1, b"payload");
        write_file(tmp.path(), &[&row.encode(), b"\xde\xad\xbe\xef"]);

        let mut segment = open(tmp.path());
        let mut cursor = Cursor::new(&mut segment).unwrap();
        assert_eq!(cursor.next().unwrap(), Some(row));
        assert_eq!(cursor.next().unwrap(), None);
        assert!(!cursor.eof_reached());
    }

    #[test]
    fn test_empty_segment() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), &[]);

        let mut segment = open(tmp.path());
        let mut cursor = Cursor::new(&mut segment).unwrap();
        assert_eq!(cursor.next().unwrap(), None);
        assert!(!cursor.eof_reached());
    }

    #[test]
    fn test_sealed_empty_segment() {
        let tmp = TempDir::new().unwrap();
        let eof = EOF_MARKER.to_le_bytes();
        write_file(tmp.path(), &[&eof]);

        let mut segment = open(tmp.path());
        let mut cursor = Cursor::new(&mut segment).unwrap();
        assert_eq!(cursor.next().unwrap(), None);
        assert!(cursor.eof_reached());
        assert_eq!(cursor.good_offset(), (HEADER.len() + 4) as u64);
    }

    #[test]
    fn test_close_rewinds_to_good_offset() {
        let tmp = TempDir::new().unwrap();
        let row = sample_row(1, b"payload");
        write_file(tmp.path(), &[&row.encode(), b"partial garbage tail bytes"]);

        let mut segment = open(tmp.path());
        let mut cursor = Cursor::new(&mut segment).unwrap();
        assert_eq!(cursor.next().unwrap(), Some(row));
        assert_eq!(cursor.next().unwrap(), None);
        let good = cursor.good_offset();
        cursor.close().unwrap();

        assert_eq!(segment.stream_position().unwrap(), good);
        assert_eq!(segment.rows(), 1);
    }

    #[test]
    fn test_picks_up_appended_rows_after_open_tail() {
        let tmp = TempDir::new().unwrap();
        let a = sample_row(1, b"aaaa");
        write_file(tmp.path(), &[&a.encode()]);

        let mut segment = open(tmp.path());
        {
            let mut cursor = Cursor::new(&mut segment).unwrap();
            assert_eq!(cursor.next().unwrap(), Some(a));
            assert_eq!(cursor.next().unwrap(), None);
            assert!(!cursor.eof_reached());
            cursor.close().unwrap();
        }

        // Writer appends another row plus the seal
        let b = sample_row(2, b"bbbb");
        let mut f = OpenOptions::new()
            .append(true)
            .open(tmp.path().join("0000000000000001.xlog"))
            .unwrap();
        f.write_all(&b.encode()).unwrap();
        f.write_all(&EOF_MARKER.to_le_bytes()).unwrap();
        drop(f);

        // A fresh cursor picks up from the rewound position
        let mut cursor = Cursor::new(&mut segment).unwrap();
        assert_eq!(cursor.next().unwrap(), Some(b));
        assert_eq!(cursor.next().unwrap(), None);
        assert!(cursor.eof_reached());
        cursor.close().unwrap();
        assert_eq!(segment.rows(), 2);
    }
}

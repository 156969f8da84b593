//! Binary row codec
//!
//! One durable record (redo entry) on disk is a magic marker, a fixed
//! 28-byte header, a 2-byte tag, an 8-byte cookie and `payload_len`
//! raw payload bytes. All integers are little-endian and the layout is
//! serialized field by field; the on-disk bytes never depend on
//! in-memory struct layout.

use crate::{Lsn, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::io::{self, Read};

/// Magic value preceding every row
pub const ROW_MARKER: u32 = 0xba0b_abed;

/// Magic value appended once when a segment is cleanly sealed
pub const EOF_MARKER: u32 = 0x10ad_ab1e;

/// On-disk size of the fixed row header
pub const HEADER_SIZE: usize = 28;

/// Size of the tag + cookie region between header and payload
pub(crate) const BODY_PREFIX_SIZE: usize = 10;

/// Fixed-size row header
///
/// `header_crc32` covers the serialized fields from `lsn` through
/// `payload_crc32`; `payload_crc32` covers the payload bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowHeader {
    /// Checksum of the remaining header fields
    pub header_crc32: u32,
    /// Log sequence number of the row
    pub lsn: Lsn,
    /// Timestamp, seconds since the Unix epoch
    pub tm: f64,
    /// Length of the trailing payload region
    pub payload_len: u32,
    /// Checksum of the payload bytes
    pub payload_crc32: u32,
}

impl RowHeader {
    /// Serialize to the on-disk layout
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.header_crc32.to_le_bytes());
        buf[4..12].copy_from_slice(&self.lsn.to_le_bytes());
        buf[12..20].copy_from_slice(&self.tm.to_le_bytes());
        buf[20..24].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[24..28].copy_from_slice(&self.payload_crc32.to_le_bytes());
        buf
    }

    /// Parse from the on-disk layout
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Self {
        Self {
            header_crc32: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            lsn: i64::from_le_bytes(buf[4..12].try_into().unwrap()),
            tm: f64::from_le_bytes(buf[12..20].try_into().unwrap()),
            payload_len: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
            payload_crc32: u32::from_le_bytes(buf[24..28].try_into().unwrap()),
        }
    }

    /// Checksum of the serialized fields after `header_crc32`
    pub fn compute_crc32(&self) -> u32 {
        let bytes = self.to_bytes();
        crc32fast::hash(&bytes[4..])
    }

    /// Whether the stored header checksum matches the fields
    pub fn verify(&self) -> bool {
        self.header_crc32 == self.compute_crc32()
    }

    /// Read exactly one header from the stream.
    ///
    /// A short read yields `Ok(None)`: the file may still be growing,
    /// so an incomplete header means "no more complete rows", not an
    /// error.
    pub fn read_from(reader: &mut impl Read) -> Result<Option<Self>> {
        let mut buf = [0u8; HEADER_SIZE];
        match reader.read_exact(&mut buf) {
            Ok(()) => Ok(Some(Self::from_bytes(&buf))),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// One decoded row
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Log sequence number
    pub lsn: Lsn,
    /// Timestamp, seconds since the Unix epoch
    pub tm: f64,
    /// Request type tag
    pub tag: u16,
    /// Origin cookie (opaque to the log layer)
    pub cookie: u64,
    /// Redo payload
    pub payload: Bytes,
}

impl Row {
    /// Build the header for this row, checksums filled in
    pub fn header(&self) -> RowHeader {
        let mut header = RowHeader {
            header_crc32: 0,
            lsn: self.lsn,
            tm: self.tm,
            payload_len: self.payload.len() as u32,
            payload_crc32: crc32fast::hash(&self.payload),
        };
        header.header_crc32 = header.compute_crc32();
        header
    }

    /// Encode the full on-disk representation, marker included
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u32_le(ROW_MARKER);
        buf.put_slice(&self.header().to_bytes());
        buf.put_u16_le(self.tag);
        buf.put_u64_le(self.cookie);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Total on-disk size of this row, marker included
    pub fn encoded_len(&self) -> usize {
        4 + HEADER_SIZE + BODY_PREFIX_SIZE + self.payload.len()
    }

    /// Assemble a row from a verified header and its body region
    /// (tag + cookie + payload)
    pub(crate) fn from_parts(header: &RowHeader, body: &[u8]) -> Self {
        debug_assert_eq!(body.len(), BODY_PREFIX_SIZE + header.payload_len as usize);
        Self {
            lsn: header.lsn,
            tm: header.tm,
            tag: u16::from_le_bytes(body[0..2].try_into().unwrap()),
            cookie: u64::from_le_bytes(body[2..10].try_into().unwrap()),
            payload: Bytes::copy_from_slice(&body[BODY_PREFIX_SIZE..]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> Row {
        Row {
            lsn: 42,
            tm: 1700000000.25,
            tag: 3,
            cookie: 0xdead_beef_cafe_f00d,
            payload: Bytes::from_static(b"hello, keel"),
        }
    }

    #[test]
    fn test_header_round_trip() {
        let header = sample_row().header();
        let parsed = RowHeader::from_bytes(&header.to_bytes());
        assert_eq!(parsed, header);
        assert!(parsed.verify());
    }

    #[test]
    fn test_row_round_trip() {
        let row = sample_row();
        let encoded = row.encode();

        assert_eq!(
            u32::from_le_bytes(encoded[0..4].try_into().unwrap()),
            ROW_MARKER
        );

        let header = RowHeader::from_bytes(&encoded[4..4 + HEADER_SIZE].try_into().unwrap());
        assert!(header.verify());
        assert_eq!(header.payload_len as usize, row.payload.len());

        let body = &encoded[4 + HEADER_SIZE..];
        assert_eq!(crc32fast::hash(&body[BODY_PREFIX_SIZE..]), header.payload_crc32);

        let decoded = Row::from_parts(&header, body);
        assert_eq!(decoded, row);
    }

    #[test]
    fn test_header_checksum_detects_corruption() {
        let mut header = sample_row().header();
        header.lsn += 1;
        assert!(!header.verify());
    }

    #[test]
    fn test_short_header_is_eof() {
        let encoded = sample_row().encode();
        let mut short = &encoded[4..4 + HEADER_SIZE - 3];
        assert!(RowHeader::read_from(&mut short).unwrap().is_none());
    }

    #[test]
    fn test_markers_are_distinct() {
        assert_ne!(ROW_MARKER, EOF_MARKER);
    }
}

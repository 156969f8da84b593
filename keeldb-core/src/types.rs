//! Core types for KeelDB

use bytes::Bytes;
use std::fmt;

/// Log sequence number
pub type Lsn = i64;

/// Signature of a log segment: the LSN at which it was opened.
/// Doubles as the segment's filename stem.
pub type Signature = i64;

/// Numeric id of a space (a logical tuple container in the storage
/// engine)
pub type SpaceId = u32;

/// A reference-counted tuple owned by the storage engine.
///
/// Cloning a `Tuple` bumps the reference count on the shared backing
/// buffer; dropping the last clone releases it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    data: Bytes,
}

impl Tuple {
    /// Create a tuple from raw bytes
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Raw tuple bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the tuple carries no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tuple[{} bytes]", self.data.len())
    }
}

impl From<&[u8]> for Tuple {
    fn from(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data))
    }
}

impl From<Vec<u8>> for Tuple {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

//! Error types for building and reading databases

use thiserror::Error;

/// Errors that can occur while building or reading a database.
///
/// A key that is not present is not an error: lookups return `Ok(None)`.
#[derive(Debug, Error)]
pub enum CdbError {
    /// I/O error from open, read, write, seek or rename.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File is shorter than the pointer table.
    #[error("corrupt header: got {actual} bytes, minimum is {minimum}")]
    CorruptHeader {
        /// Bytes available
        actual: u64,
        /// Size of the pointer table
        minimum: u64,
    },

    /// A record extends past the end of the file.
    #[error("truncated record at offset {offset}: expected {expected} bytes, got {actual}")]
    TruncatedRecord {
        /// File offset of the record
        offset: u64,
        /// Bytes declared by the record (prefix included)
        expected: u64,
        /// Bytes actually available
        actual: u64,
    },

    /// A bucket table extends past the end of the file.
    #[error("truncated table for bucket {bucket} at offset {offset}: expected {expected} bytes")]
    TruncatedTable {
        /// Bucket index (0-255)
        bucket: u8,
        /// File offset of the table
        offset: u32,
        /// Table size in bytes
        expected: u64,
    },

    /// Key or value length does not fit in a 32-bit length field.
    #[error("record too large: key {key_len} bytes, value {value_len} bytes")]
    RecordTooLarge {
        /// Key length
        key_len: usize,
        /// Value length
        value_len: usize,
    },

    /// Writing would push a file offset past `u32::MAX`.
    #[error("database too large: position {position} + {additional} bytes exceeds 4 GiB")]
    FileTooLarge {
        /// Current write position
        position: u64,
        /// Bytes that were about to be written
        additional: u64,
    },

    /// A previous write to the staging file failed, so the build cannot
    /// continue.
    #[error("writer is unusable after a failed write")]
    WriterFailed,

    /// Fixed-size structure failed to serialize.
    #[error("encoding error: {0}")]
    Encoding(String),
}

impl From<binrw::Error> for CdbError {
    fn from(err: binrw::Error) -> Self {
        match err {
            binrw::Error::Io(io_err) => Self::Io(io_err),
            other => Self::Encoding(other.to_string()),
        }
    }
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, CdbError>;

//! On-disk structures and layout constants
//!
//! ```text
//! | Region        | Offset                  | Size     | Content                                  |
//! |---------------|-------------------------|----------|------------------------------------------|
//! | Header        | 0                       | 2048     | 256 x {table_offset: u32, slot_count: u32} |
//! | Records       | 2048                    | variable | {key_len: u32, value_len: u32, key, value}* |
//! | Bucket tables | pointers[0].table_offset | variable | slot_count x {hash: u32, record_offset: u32} |
//! ```
//!
//! Everything is little-endian.

use crate::error::Result;
use binrw::{BinRead, BinReaderExt, BinWrite, BinWriterExt};
use std::io::Cursor;

/// Number of buckets (one per value of the low hash byte).
pub const BUCKET_COUNT: usize = 256;

/// Size of one slot and of one pointer (two u32 fields).
pub const SLOT_SIZE: usize = 8;

/// Size of the pointer table at the start of the file.
pub const HEADER_SIZE: usize = BUCKET_COUNT * SLOT_SIZE;

/// Offset of the first record. Every record offset is at least this, which
/// is what makes the all-zero slot usable as the empty sentinel.
pub const RECORDS_START: u32 = HEADER_SIZE as u32;

/// One slot of a bucket table: a key hash and the offset of its record.
///
/// The all-zero value marks an empty slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, BinRead, BinWrite)]
#[brw(little)]
pub struct HashEntry {
    /// Full 32-bit hash of the key
    pub hash: u32,
    /// File offset of the record (always >= [`RECORDS_START`] when occupied)
    pub record_offset: u32,
}

impl HashEntry {
    /// Empty slot sentinel.
    pub const EMPTY: Self = Self {
        hash: 0,
        record_offset: 0,
    };

    /// Create a new entry.
    pub const fn new(hash: u32, record_offset: u32) -> Self {
        Self {
            hash,
            record_offset,
        }
    }

    /// Whether this slot holds the empty sentinel.
    pub const fn is_empty(&self) -> bool {
        self.hash == 0 && self.record_offset == 0
    }
}

/// Location and size of one bucket table.
///
/// `slot_count == 0` means the bucket is empty; `table_offset` is still
/// assigned in that case but never read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct BucketPointer {
    /// File offset of the bucket table
    pub table_offset: u32,
    /// Number of slots in the table
    pub slot_count: u32,
}

impl BucketPointer {
    /// Create a new pointer.
    pub const fn new(table_offset: u32, slot_count: u32) -> Self {
        Self {
            table_offset,
            slot_count,
        }
    }

    /// Table size in bytes.
    pub const fn table_len(&self) -> u64 {
        self.slot_count as u64 * SLOT_SIZE as u64
    }
}

/// The 2048-byte header: one [`BucketPointer`] per bucket.
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct PointerTable {
    pointers: [BucketPointer; BUCKET_COUNT],
}

impl PointerTable {
    /// Table where every bucket is empty and points at `table_offset`.
    pub const fn empty(table_offset: u32) -> Self {
        Self {
            pointers: [BucketPointer::new(table_offset, 0); BUCKET_COUNT],
        }
    }

    /// Build from explicit pointers.
    pub const fn from_pointers(pointers: [BucketPointer; BUCKET_COUNT]) -> Self {
        Self { pointers }
    }

    /// Pointer for a bucket.
    pub const fn get(&self, bucket: u8) -> BucketPointer {
        self.pointers[bucket as usize]
    }

    /// Replace the pointer for a bucket.
    pub fn set(&mut self, bucket: u8, pointer: BucketPointer) {
        self.pointers[bucket as usize] = pointer;
    }

    /// All 256 pointers in bucket order.
    pub const fn pointers(&self) -> &[BucketPointer; BUCKET_COUNT] {
        &self.pointers
    }

    /// Offset where the bucket tables region starts, which is also where
    /// the records region ends.
    pub const fn tables_start(&self) -> u32 {
        self.pointers[0].table_offset
    }

    /// Total slots across all buckets.
    pub fn total_slots(&self) -> u64 {
        self.pointers.iter().map(|p| u64::from(p.slot_count)).sum()
    }

    /// Parse the header from exactly [`HEADER_SIZE`] bytes.
    pub fn parse(data: &[u8; HEADER_SIZE]) -> Result<Self> {
        let mut cursor = Cursor::new(&data[..]);
        Ok(cursor.read_le()?)
    }

    /// Serialize to [`HEADER_SIZE`] bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(HEADER_SIZE);
        Cursor::new(&mut data).write_le(self)?;
        debug_assert_eq!(data.len(), HEADER_SIZE);
        Ok(data)
    }
}

/// `len` bytes of `data` starting at `offset`, or `None` if the range runs
/// past the end.
pub fn slice_at(data: &[u8], offset: u64, len: u64) -> Option<&[u8]> {
    let start = usize::try_from(offset).ok()?;
    let end = start.checked_add(usize::try_from(len).ok()?)?;
    data.get(start..end)
}

/// Parse a serialized bucket table into its slots.
pub fn parse_slots(data: &[u8]) -> Result<Vec<HashEntry>> {
    let mut cursor = Cursor::new(data);
    let mut slots = Vec::with_capacity(data.len() / SLOT_SIZE);
    for _ in 0..data.len() / SLOT_SIZE {
        slots.push(cursor.read_le::<HashEntry>()?);
    }
    Ok(slots)
}

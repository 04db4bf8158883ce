//! Key hash used to select buckets and probe slots
//!
//! This is the classic `cdb` hash (Bernstein's `djb2` with XOR instead of
//! addition): start from 5381, then for every byte compute `h * 33 ^ byte`
//! with 32-bit wrapping arithmetic. The value is part of the file format, so
//! it must stay bit-for-bit identical across implementations.
//!
//! The low 8 bits pick the bucket; the remaining bits pick where probing
//! starts inside that bucket's table.

use std::hash::Hasher;

/// Initial hash state.
pub const HASH_SEED: u32 = 5381;

/// Compute the hash of a key.
///
/// # Examples
///
/// ```
/// use constdb::hash::hash;
///
/// assert_eq!(hash(b""), 5381);
/// assert_eq!(hash(b"a"), 0x0002_b5c4);
/// ```
pub fn hash(data: &[u8]) -> u32 {
    let mut hasher = CdbHasher::new();
    hasher.update(data);
    hasher.finish_u32()
}

/// Bucket selected by a hash (`hash mod 256`).
pub const fn bucket_of(hash: u32) -> u8 {
    (hash & 0xFF) as u8
}

/// First slot probed for a hash in a table of `slot_count` slots.
///
/// `slot_count` must be non-zero.
pub const fn probe_start(hash: u32, slot_count: u32) -> u32 {
    (hash >> 8) % slot_count
}

/// Incremental form of [`hash`].
///
/// Also usable as a [`Hasher`], in which case `finish` widens the 32-bit
/// state to `u64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CdbHasher {
    state: u32,
}

impl CdbHasher {
    /// Start a new hash.
    pub const fn new() -> Self {
        Self { state: HASH_SEED }
    }

    /// Feed more bytes.
    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            self.state = ((self.state << 5).wrapping_add(self.state)) ^ u32::from(byte);
        }
    }

    /// Current 32-bit hash value.
    pub const fn finish_u32(&self) -> u32 {
        self.state
    }
}

impl Default for CdbHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for CdbHasher {
    fn finish(&self) -> u64 {
        u64::from(self.state)
    }

    fn write(&mut self, bytes: &[u8]) {
        self.update(bytes);
    }
}

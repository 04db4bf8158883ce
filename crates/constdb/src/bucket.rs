//! Build-time bucket index
//!
//! While a database is being built, every added key contributes one
//! [`HashEntry`] to the bucket selected by the low byte of its hash. At commit
//! each bucket becomes a fixed-size open-addressed table:
//!
//! - a bucket with `n` entries gets `2n` slots (load factor at most 0.5), an
//!   empty bucket gets no table at all
//! - an entry probes from `(hash >> 8) % slot_count` and takes the first
//!   empty slot, wrapping around at the end of the table
//!
//! Entries are placed in insertion order, so the same sequence of adds always
//! produces the same tables.

use crate::error::{CdbError, Result};
use crate::format::{BUCKET_COUNT, BucketPointer, HashEntry, PointerTable, SLOT_SIZE};
use crate::hash::{bucket_of, probe_start};
use binrw::BinWriterExt;
use std::io::Cursor;

/// Slot count for a bucket holding `entries` entries.
pub const fn slot_count_for(entries: usize) -> usize {
    entries * 2
}

/// One bucket's open-addressed table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketTable {
    slots: Vec<HashEntry>,
}

impl BucketTable {
    /// Build the table for a bucket's entries, in the given order.
    pub fn build(entries: &[HashEntry]) -> Self {
        let mut slots = vec![HashEntry::EMPTY; slot_count_for(entries.len())];
        if slots.is_empty() {
            return Self { slots };
        }

        let slot_count = slots.len();
        for entry in entries {
            let mut slot = probe_start(entry.hash, slot_count as u32) as usize;
            // At least half the slots are free, so this always terminates.
            while !slots[slot].is_empty() {
                slot += 1;
                if slot == slot_count {
                    slot = 0;
                }
            }
            slots[slot] = *entry;
        }

        Self { slots }
    }

    /// Slots in table order.
    pub fn slots(&self) -> &[HashEntry] {
        &self.slots
    }

    /// Number of slots.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Size of the serialized table.
    pub fn byte_len(&self) -> usize {
        self.slots.len() * SLOT_SIZE
    }

    /// Append the serialized table to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut cursor = Cursor::new(out);
        cursor.set_position(cursor.get_ref().len() as u64);
        for slot in &self.slots {
            cursor.write_le(slot)?;
        }
        Ok(())
    }
}

/// Serialized bucket tables plus the pointer table describing them.
#[derive(Debug, Clone)]
pub struct BuiltTables {
    /// All 256 tables back to back, in bucket order
    pub data: Vec<u8>,
    /// Header for the file
    pub pointers: PointerTable,
}

/// Entries accumulated per bucket during a build.
#[derive(Debug, Clone)]
pub struct BucketIndex {
    buckets: Vec<Vec<HashEntry>>,
    len: usize,
}

impl BucketIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            buckets: vec![Vec::new(); BUCKET_COUNT],
            len: 0,
        }
    }

    /// Record an entry in its bucket.
    pub fn insert(&mut self, entry: HashEntry) {
        self.buckets[bucket_of(entry.hash) as usize].push(entry);
        self.len += 1;
    }

    /// Total entries across all buckets.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether no entries have been inserted.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Entries of one bucket in insertion order.
    pub fn bucket(&self, bucket: u8) -> &[HashEntry] {
        &self.buckets[bucket as usize]
    }

    /// Build every bucket's table, laying them out from `tables_start`.
    ///
    /// Empty buckets still get a pointer whose offset is the current
    /// position, so `pointers[0].table_offset == tables_start` always holds.
    pub fn build_tables(&self, tables_start: u32) -> Result<BuiltTables> {
        let total_slots: usize = self.buckets.iter().map(|b| slot_count_for(b.len())).sum();
        let mut data = Vec::with_capacity(total_slots * SLOT_SIZE);
        let mut pointers = PointerTable::empty(tables_start);
        let mut position = tables_start;

        for (bucket, entries) in self.buckets.iter().enumerate() {
            let table = BucketTable::build(entries);
            let slot_count = u32::try_from(table.slot_count())
                .map_err(|_| too_large(position, table.byte_len()))?;
            pointers.set(bucket as u8, BucketPointer::new(position, slot_count));

            table.write_to(&mut data)?;
            position = u32::try_from(table.byte_len())
                .ok()
                .and_then(|len| position.checked_add(len))
                .ok_or_else(|| too_large(position, table.byte_len()))?;
        }

        Ok(BuiltTables { data, pointers })
    }
}

impl Default for BucketIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn too_large(position: u32, additional: usize) -> CdbError {
    CdbError::FileTooLarge {
        position: u64::from(position),
        additional: additional as u64,
    }
}

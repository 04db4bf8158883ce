//! Database reader
//!
//! [`Reader::open`] memory-maps the file and parses the 2048-byte pointer
//! table. A lookup then touches one bucket table plus one record per hash
//! match:
//!
//! 1. hash the key and select `pointers[hash % 256]`
//! 2. return not-found immediately if the bucket has no slots
//! 3. probe the bucket table from `(hash >> 8) % slot_count`, wrapping at
//!    the end of the table, until an empty slot
//! 4. for every slot whose hash matches, compare the stored key with the
//!    query key
//!
//! Distinct keys can share a 32-bit hash, so a hash match with a different
//! key does not end the probe.
//!
//! The mapped file is read-only and never changes after publish, so a
//! `Reader` can be shared between threads without locking.

use crate::error::{CdbError, Result};
use crate::format::{
    BucketPointer, HEADER_SIZE, HashEntry, PointerTable, RECORDS_START, parse_slots, slice_at,
};
use crate::hash::{bucket_of, hash, probe_start};
use crate::record::{self, Record};
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Read-only view of a finished database.
#[derive(Debug)]
pub struct Reader<S = Mmap> {
    data: S,
    pointers: PointerTable,
}

impl Reader<Mmap> {
    /// Open and memory-map a database file.
    ///
    /// Fails with `CorruptHeader` if the file is shorter than 2048 bytes.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        check_header_len(file.metadata()?.len())?;

        // Published databases are replaced by rename, never written in place.
        #[allow(unsafe_code)]
        let mmap = unsafe { MmapOptions::new().map(&file)? };

        let reader = Self::new(mmap)?;
        debug!("Opened {} ({} records)", path.display(), reader.len());
        Ok(reader)
    }
}

impl Reader<Vec<u8>> {
    /// Serve lookups from an in-memory copy of a database.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::new(data)
    }
}

impl<S: AsRef<[u8]>> Reader<S> {
    /// Parse the pointer table at the start of `data`.
    ///
    /// Fails with `CorruptHeader` if `data` is shorter than 2048 bytes.
    pub fn new(data: S) -> Result<Self> {
        let bytes = data.as_ref();
        check_header_len(bytes.len() as u64)?;

        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&bytes[..HEADER_SIZE]);
        let pointers = PointerTable::parse(&header)?;

        Ok(Self { data, pointers })
    }

    /// The whole database image.
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// The parsed pointer table.
    pub const fn pointers(&self) -> &PointerTable {
        &self.pointers
    }

    /// Number of records, derived from the slot counts.
    pub fn len(&self) -> usize {
        (self.pointers.total_slots() / 2) as usize
    }

    /// Whether the database holds no records.
    pub fn is_empty(&self) -> bool {
        self.pointers.total_slots() == 0
    }

    /// Look up the value stored under `key`.
    ///
    /// If the key was added more than once, the first value added wins.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.get_slice(key)?.map(<[u8]>::to_vec))
    }

    /// Like [`get`](Self::get), borrowing the value from the mapped file.
    pub fn get_slice(&self, key: &[u8]) -> Result<Option<&[u8]>> {
        let mut found = None;
        self.probe(key, |value| {
            found = Some(value);
            false
        })?;
        Ok(found)
    }

    /// All values stored under `key`, in insertion order.
    pub fn get_all(&self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut values = Vec::new();
        self.probe(key, |value| {
            values.push(value.to_vec());
            true
        })?;
        Ok(values)
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get_slice(key)?.is_some())
    }

    /// Iterate over every record in insertion order.
    pub fn iter(&self) -> Records<'_> {
        Records {
            data: self.as_bytes(),
            position: u64::from(RECORDS_START),
            end: u64::from(self.pointers.tables_start()),
        }
    }

    /// Walk the probe sequence for `key`, passing each verified value to
    /// `visit` until it returns `false`.
    fn probe<'a>(&'a self, key: &[u8], mut visit: impl FnMut(&'a [u8]) -> bool) -> Result<()> {
        let key_hash = hash(key);
        let bucket = bucket_of(key_hash);
        let pointer = self.pointers.get(bucket);
        if pointer.slot_count == 0 {
            return Ok(());
        }

        let slots = self.read_table(bucket, pointer)?;
        let slot_count = slots.len();
        let start = probe_start(key_hash, pointer.slot_count) as usize;

        for step in 0..slot_count {
            let slot = slots[(start + step) % slot_count];
            if slot.is_empty() {
                break;
            }
            if slot.hash != key_hash {
                continue;
            }
            let offset = u64::from(slot.record_offset);
            if let Some(value) = record::decode_if_key(self.as_bytes(), offset, key)? {
                if !visit(value) {
                    break;
                }
            }
        }

        Ok(())
    }

    fn read_table(&self, bucket: u8, pointer: BucketPointer) -> Result<Vec<HashEntry>> {
        let table = slice_at(
            self.as_bytes(),
            u64::from(pointer.table_offset),
            pointer.table_len(),
        )
        .ok_or_else(|| CdbError::TruncatedTable {
            bucket,
            offset: pointer.table_offset,
            expected: pointer.table_len(),
        })?;
        parse_slots(table)
    }
}

fn check_header_len(actual: u64) -> Result<()> {
    if actual < HEADER_SIZE as u64 {
        return Err(CdbError::CorruptHeader {
            actual,
            minimum: HEADER_SIZE as u64,
        });
    }
    Ok(())
}

impl<'a, S: AsRef<[u8]>> IntoIterator for &'a Reader<S> {
    type Item = Result<Record>;
    type IntoIter = Records<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the records region. See [`Reader::iter`].
#[derive(Debug)]
pub struct Records<'a> {
    data: &'a [u8],
    position: u64,
    end: u64,
}

impl Iterator for Records<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.end {
            return None;
        }

        let offset = self.position;
        let result = record::decode(self.data, offset).and_then(|record| {
            let next = offset + record.encoded_len();
            if next > self.end {
                return Err(CdbError::TruncatedRecord {
                    offset,
                    expected: record.encoded_len(),
                    actual: self.end - offset,
                });
            }
            Ok((record, next))
        });

        match result {
            Ok((record, next)) => {
                self.position = next;
                Some(Ok(record))
            }
            Err(e) => {
                // Stop after the first corrupt record.
                self.position = self.end;
                Some(Err(e))
            }
        }
    }
}

/// Open the database at `path`, run `f` against it, and close it.
pub fn lookup<T, F>(path: impl AsRef<Path>, f: F) -> Result<T>
where
    F: FnOnce(&Reader) -> Result<T>,
{
    let reader = Reader::open(path)?;
    f(&reader)
}

//! Record codec
//!
//! A record is a length-prefixed key/value pair stored in the records region:
//!
//! ```text
//! offset 0x00: u32 key_len    (LE)
//! offset 0x04: u32 value_len  (LE)
//! offset 0x08: [u8; key_len]
//!              [u8; value_len]
//! ```
//!
//! Keys and values may be empty. The only size limit is that each length
//! fits in a u32.

use crate::error::{CdbError, Result};
use crate::format::slice_at;
use binrw::{BinRead, BinReaderExt, BinWrite, BinWriterExt};
use std::io::Cursor;

/// Size of the length prefix.
pub const RECORD_HEADER_SIZE: usize = 8;

/// Length prefix of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct RecordHeader {
    /// Key length in bytes
    pub key_len: u32,
    /// Value length in bytes
    pub value_len: u32,
}

impl RecordHeader {
    /// Header for a key/value pair, or `RecordTooLarge` if a length
    /// overflows u32.
    pub fn for_pair(key: &[u8], value: &[u8]) -> Result<Self> {
        let too_large = || CdbError::RecordTooLarge {
            key_len: key.len(),
            value_len: value.len(),
        };
        Ok(Self {
            key_len: u32::try_from(key.len()).map_err(|_| too_large())?,
            value_len: u32::try_from(value.len()).map_err(|_| too_large())?,
        })
    }

    /// Payload size (key + value).
    pub const fn payload_len(&self) -> u64 {
        self.key_len as u64 + self.value_len as u64
    }

    /// Full record size, prefix included.
    pub const fn record_len(&self) -> u64 {
        RECORD_HEADER_SIZE as u64 + self.payload_len()
    }

    fn parse(data: &[u8]) -> Result<Self> {
        Ok(Cursor::new(data).read_le()?)
    }
}

/// A decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Key bytes
    pub key: Vec<u8>,
    /// Value bytes
    pub value: Vec<u8>,
}

impl Record {
    /// Size of this record on disk.
    pub fn encoded_len(&self) -> u64 {
        (RECORD_HEADER_SIZE + self.key.len() + self.value.len()) as u64
    }
}

/// Serialize a key/value pair.
pub fn encode(key: &[u8], value: &[u8]) -> Result<Vec<u8>> {
    let header = RecordHeader::for_pair(key, value)?;
    let mut data = Vec::with_capacity(RECORD_HEADER_SIZE + key.len() + value.len());
    Cursor::new(&mut data).write_le(&header)?;
    data.extend_from_slice(key);
    data.extend_from_slice(value);
    Ok(data)
}

/// Read the length prefix of the record at `offset`.
pub fn read_header(data: &[u8], offset: u64) -> Result<RecordHeader> {
    let prefix = slice_at(data, offset, RECORD_HEADER_SIZE as u64)
        .ok_or_else(|| truncated(data, offset, RECORD_HEADER_SIZE as u64))?;
    RecordHeader::parse(prefix)
}

/// Decode the record at `offset`.
///
/// Fails with `TruncatedRecord` if the data ends before the declared
/// lengths are satisfied.
pub fn decode(data: &[u8], offset: u64) -> Result<Record> {
    let header = read_header(data, offset)?;
    let (key, value) = payload(data, offset, &header)?;
    Ok(Record {
        key: key.to_vec(),
        value: value.to_vec(),
    })
}

/// Value of the record at `offset` if its key equals `key`.
///
/// The key length is compared before the payload is touched.
pub fn decode_if_key<'a>(data: &'a [u8], offset: u64, key: &[u8]) -> Result<Option<&'a [u8]>> {
    let header = read_header(data, offset)?;
    if header.key_len as usize != key.len() {
        return Ok(None);
    }
    let (stored, value) = payload(data, offset, &header)?;
    Ok((stored == key).then_some(value))
}

/// Split the payload of a record into key and value.
fn payload<'a>(
    data: &'a [u8],
    offset: u64,
    header: &RecordHeader,
) -> Result<(&'a [u8], &'a [u8])> {
    let start = offset + RECORD_HEADER_SIZE as u64;
    let bytes = slice_at(data, start, header.payload_len())
        .ok_or_else(|| truncated(data, offset, header.record_len()))?;
    Ok(bytes.split_at(header.key_len as usize))
}

fn truncated(data: &[u8], offset: u64, expected: u64) -> CdbError {
    CdbError::TruncatedRecord {
        offset,
        expected,
        actual: (data.len() as u64).saturating_sub(offset),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_layout() {
        let data = encode(b"key", b"value").unwrap();
        assert_eq!(
            data,
            [
                3, 0, 0, 0, // key_len
                5, 0, 0, 0, // value_len
                b'k', b'e', b'y', b'v', b'a', b'l', b'u', b'e',
            ]
        );
    }

    #[test]
    fn test_decode_at_offset() {
        let mut data = vec![0xEE; 5];
        data.extend(encode(b"alpha", b"one").unwrap());
        let second = data.len() as u64;
        data.extend(encode(b"beta", b"two").unwrap());

        let record = decode(&data, 5).unwrap();
        assert_eq!(record.key, b"alpha");
        assert_eq!(record.value, b"one");
        assert_eq!(record.encoded_len(), 16);

        let record = decode(&data, second).unwrap();
        assert_eq!(record.key, b"beta");
        assert_eq!(record.value, b"two");
    }

    #[test]
    fn test_empty_key_and_value() {
        let data = encode(b"", b"").unwrap();
        assert_eq!(data.len(), RECORD_HEADER_SIZE);
        let record = decode(&data, 0).unwrap();
        assert!(record.key.is_empty());
        assert!(record.value.is_empty());

        let data = encode(b"", b"v").unwrap();
        assert_eq!(decode_if_key(&data, 0, b"").unwrap(), Some(&b"v"[..]));
    }

    #[test]
    fn test_truncated_prefix() {
        let data = vec![3, 0, 0];
        match decode(&data, 0) {
            Err(CdbError::TruncatedRecord {
                offset,
                expected,
                actual,
            }) => {
                assert_eq!(offset, 0);
                assert_eq!(expected, 8);
                assert_eq!(actual, 3);
            }
            other => panic!("expected TruncatedRecord, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_payload() {
        let mut data = encode(b"key", b"value").unwrap();
        data.truncate(12);
        match decode(&data, 0) {
            Err(CdbError::TruncatedRecord {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 16);
                assert_eq!(actual, 12);
            }
            other => panic!("expected TruncatedRecord, got {other:?}"),
        }
    }

    #[test]
    fn test_offset_past_end() {
        let data = encode(b"key", b"value").unwrap();
        match read_header(&data, 60_000) {
            Err(CdbError::TruncatedRecord {
                offset, actual, ..
            }) => {
                assert_eq!(offset, 60_000);
                assert_eq!(actual, 0);
            }
            other => panic!("expected TruncatedRecord, got {other:?}"),
        }
    }

    #[test]
    fn test_corrupt_length_is_truncation() {
        let data = vec![0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 1, 2];
        assert!(matches!(
            decode(&data, 0),
            Err(CdbError::TruncatedRecord { .. })
        ));
    }

    #[test]
    fn test_decode_if_key() {
        let data = encode(b"alpha", b"one").unwrap();
        assert_eq!(
            decode_if_key(&data, 0, b"alpha").unwrap(),
            Some(&b"one"[..])
        );
        // Same length, different bytes
        assert_eq!(decode_if_key(&data, 0, b"alphb").unwrap(), None);
        // Different length
        assert_eq!(decode_if_key(&data, 0, b"alp").unwrap(), None);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;
        use proptest::test_runner::TestCaseError;

        fn bytes(max: usize) -> impl Strategy<Value = Vec<u8>> {
            prop::collection::vec(any::<u8>(), 0..max)
        }

        proptest! {
            /// Encoding then decoding at any offset returns the same pair.
            #[test]
            fn decode_returns_encoded_pair(
                padding in bytes(32),
                key in bytes(64),
                value in bytes(256),
            ) {
                let mut data = padding.clone();
                data.extend(encode(&key, &value).map_err(|e| TestCaseError::fail(e.to_string()))?);

                let offset = padding.len() as u64;
                let record = decode(&data, offset).map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(record.encoded_len(), data.len() as u64 - offset);
                prop_assert_eq!(&record.key, &key);
                prop_assert_eq!(&record.value, &value);

                let found = decode_if_key(&data, offset, &key)
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(found, Some(value.as_slice()));
            }

            /// A different key never matches the stored record.
            #[test]
            fn other_keys_do_not_match(
                key in bytes(16),
                other in bytes(16),
                value in bytes(16),
            ) {
                prop_assume!(key != other);
                let data = encode(&key, &value).map_err(|e| TestCaseError::fail(e.to_string()))?;
                let found = decode_if_key(&data, 0, &other)
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(found, None);
            }

            /// Cutting a record short always reports truncation, never a
            /// wrong record.
            #[test]
            fn truncation_is_detected(
                key in bytes(16),
                value in bytes(16),
                cut in 1usize..40,
            ) {
                let mut data = encode(&key, &value)
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assume!(cut <= data.len());
                data.truncate(data.len() - cut);
                let is_truncated =
                    matches!(decode(&data, 0), Err(CdbError::TruncatedRecord { .. }));
                prop_assert!(is_truncated);
            }
        }
    }
}

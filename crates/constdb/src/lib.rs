//! Constant (write-once, read-many) key/value database.
//!
//! A database is a single file that is built once and never mutated in place.
//! Updating it means building a complete new file next to the old one and
//! atomically renaming it over the target, so readers always see either the
//! previous version or the new one, never a partial file.
//!
//! # File Layout
//!
//! ```text
//! +----------------------+ 0
//! | Pointer table        |   256 x {table_offset: u32, slot_count: u32}
//! +----------------------+ 2048
//! | Records              |   {key_len: u32, value_len: u32, key, value}*
//! +----------------------+ pointers[0].table_offset
//! | Bucket tables        |   256 open-addressed tables of {hash: u32, record_offset: u32}
//! +----------------------+
//! ```
//!
//! All integers are little-endian. A key is hashed with [`hash::hash`]; the
//! low byte selects one of 256 buckets and the remaining bits select the
//! probe start inside that bucket's table.
//!
//! # Building
//!
//! ```rust,no_run
//! use constdb::Writer;
//!
//! let mut writer = Writer::create("users.cdb")?;
//! writer.add(b"alice", b"1000")?;
//! writer.add(b"bob", b"1001")?;
//! writer.commit()?;
//! # Ok::<(), constdb::CdbError>(())
//! ```
//!
//! # Reading
//!
//! ```rust,no_run
//! use constdb::Reader;
//!
//! let reader = Reader::open("users.cdb")?;
//! assert_eq!(reader.get(b"alice")?, Some(b"1000".to_vec()));
//! assert_eq!(reader.get(b"carol")?, None);
//! # Ok::<(), constdb::CdbError>(())
//! ```
//!
//! # Conditional Rebuilds
//!
//! [`update`] skips the rebuild when the target is already newer than a
//! caller-supplied timestamp, and otherwise commits or rolls back depending
//! on the result of the population callback.

#![warn(missing_docs)]

pub mod bucket;
pub mod config;
pub mod error;
pub mod format;
pub mod hash;
pub mod reader;
pub mod record;
pub mod writer;

pub use config::WriterOptions;
pub use error::{CdbError, Result};
pub use format::{BucketPointer, HashEntry, PointerTable};
pub use reader::{Reader, lookup};
pub use writer::{CommitSummary, RebuildOutcome, Writer, update, update_with_options};

/// Version information for the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

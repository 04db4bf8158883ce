//! Database builder with atomic publish
//!
//! A [`Writer`] owns a staging file created next to the target path. Records
//! are appended after a reserved 2048-byte header; [`Writer::commit`] then
//! writes the bucket tables, fills in the header, and renames the staging
//! file over the target. Because the staging file lives in the same
//! directory, the rename is atomic: readers opening the target see either
//! the previous database or the new one.
//!
//! `commit` and `rollback` consume the writer, so no operation can follow
//! either of them. Dropping a writer without committing discards the staging
//! file the same way `rollback` does.

use crate::bucket::BucketIndex;
use crate::config::WriterOptions;
use crate::error::{CdbError, Result};
use crate::format::{HEADER_SIZE, HashEntry, RECORDS_START};
use crate::hash::hash;
use crate::record;
use std::fs;
use std::io::{self, BufWriter, IntoInnerError, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    /// Path the database was published to
    pub path: PathBuf,
    /// Number of records written
    pub records: usize,
    /// Final file size in bytes
    pub file_size: u64,
}

/// What [`update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// Target was at least as new as the threshold; nothing was written
    Skipped,
    /// Target was rebuilt and published
    Rebuilt,
}

/// Builder for a new database file.
#[derive(Debug)]
pub struct Writer {
    file: BufWriter<NamedTempFile>,
    target: PathBuf,
    index: BucketIndex,
    position: u32,
    options: WriterOptions,
    /// Set once a write to the staging file fails; its tail is then unknown.
    failed: bool,
}

impl Writer {
    /// Start building a database that will be published at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with_options(path, WriterOptions::default())
    }

    /// Start building a database with explicit options.
    ///
    /// The staging file is created in the target's directory and named after
    /// the target, so concurrent builds of different databases in the same
    /// directory never collide.
    pub fn create_with_options(path: impl AsRef<Path>, options: WriterOptions) -> Result<Self> {
        let target = std::path::absolute(path.as_ref())?;
        let (dir, name) = match (target.parent(), target.file_name()) {
            (Some(dir), Some(name)) => (dir, name),
            _ => {
                return Err(CdbError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("not a file path: {}", target.display()),
                )));
            }
        };

        let mut staging = tempfile::Builder::new()
            .prefix(name)
            .suffix(".tmp")
            .tempfile_in(dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            staging
                .as_file()
                .set_permissions(fs::Permissions::from_mode(options.permissions))?;
        }

        // Header is written last, once every table offset is known.
        staging.seek(SeekFrom::Start(HEADER_SIZE as u64))?;

        debug!(
            "Created staging file {} for {}",
            staging.path().display(),
            target.display()
        );

        Ok(Self {
            file: BufWriter::new(staging),
            target,
            index: BucketIndex::new(),
            position: RECORDS_START,
            options,
            failed: false,
        })
    }

    /// Append a key/value pair.
    ///
    /// Keys are not deduplicated. When a key is added more than once,
    /// [`crate::Reader::get`] returns the first value and
    /// [`crate::Reader::get_all`] returns all of them in insertion order.
    ///
    /// An I/O error here leaves the staging file in an unknown state, so
    /// every later `add` or `commit` fails with `WriterFailed`.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.failed {
            return Err(CdbError::WriterFailed);
        }

        let data = record::encode(key, value)?;
        let record_offset = self.position;
        let next = u32::try_from(data.len())
            .ok()
            .and_then(|len| record_offset.checked_add(len))
            .ok_or(CdbError::FileTooLarge {
                position: u64::from(record_offset),
                additional: data.len() as u64,
            })?;

        if let Err(e) = self.file.write_all(&data) {
            self.failed = true;
            return Err(e.into());
        }
        self.index.insert(HashEntry::new(hash(key), record_offset));
        self.position = next;
        Ok(())
    }

    /// Number of records added so far.
    pub const fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether no records have been added.
    pub const fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Path the database will be published to.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Path of the staging file being written.
    pub fn staging_path(&self) -> &Path {
        self.file.get_ref().path()
    }

    /// Write the bucket tables and header, then atomically publish.
    pub fn commit(self) -> Result<CommitSummary> {
        let Self {
            mut file,
            target,
            index,
            position,
            options,
            failed,
        } = self;

        if failed {
            warn!("Refusing to publish {} after a failed write", target.display());
            return Err(CdbError::WriterFailed);
        }

        let tables = index.build_tables(position)?;
        file.write_all(&tables.data)?;
        let file_size = u64::from(position) + tables.data.len() as u64;

        file.seek(SeekFrom::Start(0))?;
        file.write_all(&tables.pointers.to_bytes()?)?;

        let staging = file.into_inner().map_err(IntoInnerError::into_error)?;
        if options.sync_on_commit {
            staging.as_file().sync_all()?;
        }

        // On failure the returned temp file is dropped, which removes it.
        staging.persist(&target).map_err(|e| e.error)?;

        info!(
            "Published {} with {} records ({} bytes)",
            target.display(),
            index.len(),
            file_size
        );

        Ok(CommitSummary {
            path: target,
            records: index.len(),
            file_size,
        })
    }

    /// Discard everything written and remove the staging file.
    ///
    /// The target path is never touched.
    pub fn rollback(self) -> Result<()> {
        // Buffered bytes are dropped rather than flushed.
        let (staging, _) = self.file.into_parts();
        let staging_path = staging.path().to_path_buf();
        staging.close()?;

        info!(
            "Rolled back build of {} (removed {})",
            self.target.display(),
            staging_path.display()
        );
        Ok(())
    }
}

/// Rebuild `path` if it is older than `changed`.
///
/// Uses default [`WriterOptions`]. See [`update_with_options`].
pub fn update<F, E>(
    path: impl AsRef<Path>,
    changed: SystemTime,
    populate: F,
) -> std::result::Result<RebuildOutcome, E>
where
    F: FnOnce(&mut Writer) -> std::result::Result<(), E>,
    E: From<CdbError>,
{
    update_with_options(path, changed, WriterOptions::default(), populate)
}

/// Rebuild `path` if its modification time is strictly before `changed`.
///
/// A missing target is always rebuilt. The `populate` callback fills a fresh
/// [`Writer`]; if it fails the build is rolled back, the existing target is
/// left untouched, and the callback's error is returned.
pub fn update_with_options<F, E>(
    path: impl AsRef<Path>,
    changed: SystemTime,
    options: WriterOptions,
    populate: F,
) -> std::result::Result<RebuildOutcome, E>
where
    F: FnOnce(&mut Writer) -> std::result::Result<(), E>,
    E: From<CdbError>,
{
    let path = path.as_ref();

    let modified = match fs::metadata(path) {
        Ok(metadata) => Some(metadata.modified().map_err(CdbError::from)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(CdbError::from(e).into()),
    };

    if let Some(modified) = modified {
        if modified >= changed {
            debug!("{} is up to date, skipping rebuild", path.display());
            return Ok(RebuildOutcome::Skipped);
        }
    }

    let mut writer = Writer::create_with_options(path, options)?;
    if let Err(err) = populate(&mut writer) {
        warn!("Populating {} failed, rolling back", path.display());
        if let Err(rollback_err) = writer.rollback() {
            warn!("Rollback of {} failed: {rollback_err}", path.display());
        }
        return Err(err);
    }

    writer.commit()?;
    Ok(RebuildOutcome::Rebuilt)
}

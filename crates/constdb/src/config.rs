//! Options for building databases

use serde::{Deserialize, Serialize};

/// Default Unix mode for published databases.
pub const DEFAULT_PERMISSIONS: u32 = 0o644;

/// Options applied while building and publishing a database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterOptions {
    /// Unix mode applied to the staging file before it is renamed into place.
    /// Ignored on platforms without Unix permissions.
    pub permissions: u32,

    /// Flush the staging file to stable storage before the rename
    pub sync_on_commit: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            permissions: DEFAULT_PERMISSIONS,
            sync_on_commit: true,
        }
    }
}

impl WriterOptions {
    /// Create options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the file mode of the published database
    #[must_use]
    pub const fn with_permissions(mut self, mode: u32) -> Self {
        self.permissions = mode;
        self
    }

    /// Enable or disable fsync before publishing
    #[must_use]
    pub const fn with_sync_on_commit(mut self, enable: bool) -> Self {
        self.sync_on_commit = enable;
        self
    }
}

//! Narrow filesystem capability used by the core.
//!
//! Everything the operations touch on disk goes through [`FileSystem`]:
//! stat, open, create, remove, mkdir-all and read-dir. Production code uses
//! [`OsFileSystem`]; tests substitute [`MemoryFileSystem`].

mod memory_file_system;
mod os_file_system;

pub use memory_file_system::{MemoryFileSystem, MemoryFileSystemBuilder, MemoryFsEntry};
pub use os_file_system::OsFileSystem;

use std::io::{Read, Write};
use std::path::Path;

use async_trait::async_trait;

/// Result type for filesystem operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in filesystem operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path not found: {0}")]
    NotFound(String),

    #[error("path is not a directory: {0}")]
    NotADirectory(String),
}

// =============================================================================
// Entry Types
// =============================================================================

/// The kind of a filesystem object, as far as the core cares.
///
/// Anything that is not a directory (symlinks included) is treated as a file;
/// only names are preserved, never contents or link targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
}

impl FileKind {
    pub fn is_dir(self) -> bool {
        matches!(self, FileKind::Directory)
    }
}

/// A single directory entry returned by [`FileSystem::read_dir`].
#[derive(Debug, Clone)]
pub struct EntryInfo {
    /// Base name of the entry.
    pub name: String,
    /// Kind of the entry.
    pub kind: FileKind,
}

// =============================================================================
// FileSystem Capability
// =============================================================================

/// The injection seam for all I/O primitives used by the core.
///
/// Readers and writers are synchronous handles because the tar and gzip
/// codecs downstream are synchronous; callers move them onto blocking tasks.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Stat a path, following symlinks.
    async fn stat(&self, path: &Path) -> Result<FileKind>;

    /// Open a file for reading.
    async fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>>;

    /// Create (or truncate) a file for writing.
    async fn create(&self, path: &Path) -> Result<Box<dyn Write + Send + Sync>>;

    /// Remove a file.
    async fn remove_file(&self, path: &Path) -> Result<()>;

    /// Create a directory and any missing parents.
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// List a directory, sorted by name.
    async fn read_dir(&self, path: &Path) -> Result<Vec<EntryInfo>>;
}

//! Filesystem walker stream.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{PathStream, StreamError, ERROR_STREAM_BUFFER, FS_STREAM_BUFFER};
use crate::exclude::ExcludeSet;
use crate::file_system::FileSystem;

/// Start a depth-first walk of the directory rooted at `root`.
///
/// The root itself is not emitted. Entries are visited in the capability's
/// native (name-sorted) order; records are root-relative with a trailing `/`
/// for directories. Excluded directories are pruned whole, excluded files are
/// skipped individually.
pub fn spawn_fs_stream(
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    excludes: ExcludeSet,
    cancel: CancellationToken,
) -> PathStream {
    let (path_tx, path_rx) = mpsc::channel(FS_STREAM_BUFFER);
    let (err_tx, err_rx) = mpsc::channel(ERROR_STREAM_BUFFER);

    tokio::spawn(async move {
        let walker = Walker {
            fs,
            root,
            excludes,
            cancel,
            paths: path_tx,
        };

        if let Err(err) = walker.run().await {
            let _ = err_tx.send(err).await;
        }
    });

    PathStream::new(path_rx, err_rx)
}

struct Walker {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    excludes: ExcludeSet,
    cancel: CancellationToken,
    paths: mpsc::Sender<String>,
}

impl Walker {
    async fn run(&self) -> Result<(), StreamError> {
        self.walk_dir(String::new()).await
    }

    /// Visit one directory level; `prefix` is the root-relative path of the
    /// directory with a trailing `/`, or empty for the root.
    async fn walk_dir(&self, prefix: String) -> Result<(), StreamError> {
        let dir = self.root.join(&prefix);
        let entries = self.fs.read_dir(&dir).await.map_err(StreamError::Walk)?;

        for entry in entries {
            if self.cancel.is_cancelled() {
                return Err(StreamError::Cancelled);
            }

            let rel_path = format!("{prefix}{}", entry.name);
            let is_dir = entry.kind.is_dir();

            if self.excludes.is_match(&rel_path, is_dir) {
                // Excluded directories are pruned, excluded files skipped.
                continue;
            }

            if is_dir {
                let record = format!("{rel_path}/");
                if self.paths.send(record.clone()).await.is_err() {
                    return Ok(());
                }
                Box::pin(self.walk_dir(record)).await?;
            } else if self.paths.send(rel_path).await.is_err() {
                return Ok(());
            }
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_system::{MemoryFileSystem, MemoryFsEntry};

    fn walk(fs: MemoryFileSystem, root: &str, excludes: &[&str]) -> PathStream {
        spawn_fs_stream(
            Arc::new(fs),
            PathBuf::from(root),
            ExcludeSet::new(excludes).unwrap(),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_walk_emits_relative_records_depth_first() {
        let fs = MemoryFileSystem::builder()
            .add("src/a.txt", MemoryFsEntry::file("a"))
            .add("src/b/c.txt", MemoryFsEntry::file("c"))
            .build();

        let records = walk(fs, "src", &[]).collect().await.unwrap();
        assert_eq!(records, vec!["a.txt", "b/", "b/c.txt"]);
    }

    #[tokio::test]
    async fn test_walk_does_not_emit_the_root() {
        let fs = MemoryFileSystem::builder()
            .add("only.txt", MemoryFsEntry::file(""))
            .build();

        let records = walk(fs, "", &[]).collect().await.unwrap();
        assert_eq!(records, vec!["only.txt"]);
    }

    #[tokio::test]
    async fn test_excluded_directory_is_pruned() {
        let fs = MemoryFileSystem::builder()
            .add("src/a.txt", MemoryFsEntry::file("a"))
            .add("src/b/c.txt", MemoryFsEntry::file("c"))
            .build();

        let records = walk(fs, "src", &["b"]).collect().await.unwrap();
        assert_eq!(records, vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_excluded_file_is_skipped_alone() {
        let fs = MemoryFileSystem::builder()
            .add("src/a.txt", MemoryFsEntry::file("a"))
            .add("src/b/c.txt", MemoryFsEntry::file("c"))
            .build();

        let records = walk(fs, "src", &["b/c.txt"]).collect().await.unwrap();
        assert_eq!(records, vec!["a.txt", "b/"]);
    }

    #[tokio::test]
    async fn test_missing_root_is_a_walk_error() {
        let fs = MemoryFileSystem::new();

        let err = walk(fs, "missing", &[]).collect().await.unwrap_err();
        assert!(matches!(err, StreamError::Walk(_)));
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_walk() {
        let fs = MemoryFileSystem::builder()
            .add("src/a.txt", MemoryFsEntry::file("a"))
            .build();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let stream = spawn_fs_stream(
            Arc::new(fs),
            PathBuf::from("src"),
            ExcludeSet::empty(),
            cancel,
        );

        let err = stream.collect().await.unwrap_err();
        assert!(err.is_cancelled());
    }
}

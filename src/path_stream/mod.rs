//! Streams of path records.
//!
//! A path record is a UTF-8, forward-slash, root-relative path; directories
//! carry a single trailing `/`. Producers push records into a bounded channel
//! and report at most one failure on a capacity-1 error channel; backpressure
//! is the only flow control.

mod fs_stream;
mod tar_stream;

pub use fs_stream::spawn_fs_stream;
pub use tar_stream::spawn_tar_stream;

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::exclude::ExcludeSet;
use crate::ext_sort::{self, SortConfig, SortError};
use crate::file_system::{self, FileKind, FileSystem};

/// Buffer capacity for path channels fed by the filesystem walker.
pub const FS_STREAM_BUFFER: usize = 1000;
/// Buffer capacity for path channels fed by the tar reader.
pub const TAR_STREAM_BUFFER: usize = 1000;
/// Buffer capacity for error channels.
pub const ERROR_STREAM_BUFFER: usize = 1;

/// Errors surfaced by path-stream producers.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Stat of a source path failed.
    #[error("failed to stat source: {0}")]
    Stat(#[source] file_system::Error),

    /// Opening an input archive failed.
    #[error("failed to open input file: {0}")]
    Open(#[source] file_system::Error),

    /// Walking the filesystem failed.
    #[error("failed to walk filesystem: {0}")]
    Walk(#[source] file_system::Error),

    /// The gzip layer of an archive could not be decoded.
    #[error("failed to decode gzip stream: {0}")]
    Gzip(#[source] std::io::Error),

    /// The tar layer of an archive could not be decoded.
    #[error("failed to decode tar stream: {0}")]
    Tar(#[source] std::io::Error),

    /// External sorting failed.
    #[error(transparent)]
    Sort(#[from] SortError),

    /// The stream was cancelled.
    #[error("stream was cancelled")]
    Cancelled,
}

impl StreamError {
    /// Whether this error is a cooperative-cancellation report.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StreamError::Cancelled | StreamError::Sort(SortError::Cancelled))
    }
}

// =============================================================================
// PathStream
// =============================================================================

/// A bounded stream of path records with an attached error channel.
///
/// [`PathStream::next`] yields records until the stream ends; the error
/// channel is consulted with priority, so a producer failure closes the
/// stream promptly even when records are still buffered.
pub struct PathStream {
    paths: mpsc::Receiver<String>,
    errs: mpsc::Receiver<StreamError>,
    paths_done: bool,
    errs_done: bool,
}

impl PathStream {
    pub fn new(paths: mpsc::Receiver<String>, errs: mpsc::Receiver<StreamError>) -> Self {
        Self {
            paths,
            errs,
            paths_done: false,
            errs_done: false,
        }
    }

    /// Split into the raw path and error channels (used by the sorter).
    pub fn into_parts(self) -> (mpsc::Receiver<String>, mpsc::Receiver<StreamError>) {
        (self.paths, self.errs)
    }

    /// Next record, `Ok(None)` at clean end of stream, or the first producer
    /// error.
    pub async fn next(&mut self) -> Result<Option<String>, StreamError> {
        loop {
            if self.paths_done {
                if self.errs_done {
                    return Ok(None);
                }
                return match self.errs.recv().await {
                    Some(err) => {
                        self.errs_done = true;
                        Err(err)
                    }
                    None => {
                        self.errs_done = true;
                        Ok(None)
                    }
                };
            }

            tokio::select! {
                biased;

                err = self.errs.recv(), if !self.errs_done => {
                    match err {
                        Some(err) => {
                            self.paths_done = true;
                            self.errs_done = true;
                            return Err(err);
                        }
                        None => self.errs_done = true,
                    }
                }

                path = self.paths.recv() => {
                    match path {
                        Some(path) => return Ok(Some(path)),
                        None => self.paths_done = true,
                    }
                }
            }
        }
    }

    /// Drain the stream, collecting all records (test helper).
    #[cfg(test)]
    pub async fn collect(mut self) -> Result<Vec<String>, StreamError> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await? {
            records.push(record);
        }
        Ok(records)
    }
}

// =============================================================================
// Source Resolution
// =============================================================================

/// Open a path stream over either a directory (walker) or a `.tar.gz`
/// (archive reader), resolved by stat, optionally routed through the external
/// sorter.
pub async fn multi_path_stream(
    fs: Arc<dyn FileSystem>,
    path: &Path,
    sort: bool,
    excludes: ExcludeSet,
    sort_config: &SortConfig,
    cancel: &CancellationToken,
) -> Result<PathStream, StreamError> {
    let kind = fs.stat(path).await.map_err(StreamError::Stat)?;

    let stream = match kind {
        FileKind::Directory => spawn_fs_stream(fs, path.to_path_buf(), excludes, cancel.clone()),
        FileKind::File => spawn_tar_stream(fs, path.to_path_buf(), excludes, cancel.clone()),
    };

    if sort {
        Ok(ext_sort::sort_stream(stream, sort_config, cancel))
    } else {
        Ok(stream)
    }
}

// =============================================================================
// Tests
// =============================================================================

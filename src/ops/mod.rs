//! Operation orchestrators.
//!
//! [`Program`] wires path-stream producers, the external sorter, the diff
//! engine and the archive writer into the three user-facing operations,
//! and owns the output-file lifecycle: outputs are created eagerly and
//! removed whenever an operation fails (and additionally when `diff` finds
//! no differences).

mod create;
mod diff_op;
mod list;

use std::io::{Read as _, Write};
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::archive::{ArchiveError, ArchiveWriter, GzipConfig};
use crate::diff::DiffError;
use crate::exclude::{self, PatternError};
use crate::ext_sort::SortConfig;
use crate::file_system::{self, FileSystem};
use crate::path_stream::StreamError;

/// Buffer capacity of the channel feeding the archive writer task.
pub const ARCHIVE_WRITE_BUFFER: usize = 1000;

/// Result type for operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An exclude pattern failed to compile.
    #[error("failed to evaluate exclude arguments: {0}")]
    Excludes(#[from] PatternError),

    /// The `--excludes-from` file could not be read.
    #[error("failed to read exclude file: {0}")]
    ExcludeFile(#[source] file_system::Error),

    /// The output file could not be created.
    #[error("failed to create output file: {0}")]
    CreateOutput(#[source] file_system::Error),

    /// The configured temporary directory could not be prepared.
    #[error("failed to prepare temporary directory: {0}")]
    TmpDir(#[source] file_system::Error),

    /// A path-stream producer or the sorter failed.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// The archive writer failed.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Writing result lines to stdout failed.
    #[error("failed to write to stdout: {0}")]
    Stdout(#[source] std::io::Error),

    /// The operation was cancelled.
    #[error("operation was cancelled")]
    Cancelled,

    /// Differences were found. Not a failure: `diff` signals a non-empty
    /// delta this way and still produces a valid archive.
    #[error("differences were found")]
    DiffsFound { extra_old: u64, extra_new: u64 },

    /// A background task ended without reporting a result.
    #[error("internal task failure")]
    Internal,
}

impl Error {
    /// Whether this error reports cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::Stream(err) => err.is_cancelled(),
            _ => false,
        }
    }

    /// Whether this is the `diff` differences sentinel.
    pub fn is_diffs_found(&self) -> bool {
        matches!(self, Error::DiffsFound { .. })
    }
}

impl From<DiffError> for Error {
    fn from(err: DiffError) -> Self {
        match err {
            DiffError::Stream(err) => Error::Stream(err),
            DiffError::Cancelled => Error::Cancelled,
        }
    }
}

// =============================================================================
// Program
// =============================================================================

/// The primary structure of the application.
///
/// All I/O goes through the injected [`FileSystem`] capability and the given
/// stdout sink, so operations are fully testable in memory.
pub struct Program {
    fs: Arc<dyn FileSystem>,
    stdout: Box<dyn Write + Send + Sync>,
    gzip_config: GzipConfig,
    sort_config: SortConfig,
}

impl Program {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        stdout: Box<dyn Write + Send + Sync>,
        gzip_config: GzipConfig,
        sort_config: SortConfig,
    ) -> Self {
        Self {
            fs,
            stdout,
            gzip_config,
            sort_config,
        }
    }

    /// Merge inline `--exclude` patterns with the lines of an
    /// `--excludes-from` file.
    ///
    /// File lines are appended after the inline patterns; blank lines and
    /// `#` comments are skipped. Order is irrelevant for matching, which is a
    /// disjunction.
    pub async fn merge_excludes(
        &self,
        inline: &[String],
        file: Option<&Path>,
    ) -> Result<Vec<String>> {
        let mut excludes: Vec<String> = inline.to_vec();

        if let Some(path) = file {
            let mut reader = self.fs.open(path).await.map_err(Error::ExcludeFile)?;
            let mut contents = Vec::new();
            reader
                .read_to_end(&mut contents)
                .map_err(|e| Error::ExcludeFile(file_system::Error::Io(e)))?;

            let contents = String::from_utf8_lossy(&contents);
            excludes.extend(exclude::parse_excludes_file(&contents));
        }

        Ok(excludes)
    }

    /// Prepare the configured sorter temp directory, if any.
    async fn prepare_tmp_dir(&self) -> Result<()> {
        if let Some(dir) = &self.sort_config.tmp_dir {
            if !dir.as_os_str().is_empty() {
                self.fs.create_dir_all(dir).await.map_err(Error::TmpDir)?;
            }
        }
        Ok(())
    }

    fn flush_stdout(&mut self) -> Result<()> {
        self.stdout.flush().map_err(Error::Stdout)
    }
}

/// Spawn the blocking archive-writer task.
///
/// Entry names arrive over the returned bounded channel; directoryness is
/// carried by the trailing `/`. Closing the channel finalises the archive.
fn spawn_archive_writer(
    out: Box<dyn Write + Send + Sync>,
    config: GzipConfig,
) -> (
    mpsc::Sender<String>,
    JoinHandle<std::result::Result<(), ArchiveError>>,
) {
    let (entry_tx, mut entry_rx) = mpsc::channel::<String>(ARCHIVE_WRITE_BUFFER);

    let task = tokio::task::spawn_blocking(move || {
        let mut writer = ArchiveWriter::new(out, &config)?;

        while let Some(name) = entry_rx.blocking_recv() {
            let is_dir = name.ends_with('/');
            writer.append_placeholder(&name, is_dir)?;
        }

        writer.finish()?;
        Ok(())
    });

    (entry_tx, task)
}

/// Join the writer task, translating panics into [`Error::Internal`].
async fn join_archive_writer(
    task: JoinHandle<std::result::Result<(), ArchiveError>>,
) -> Result<()> {
    match task.await {
        Ok(result) => result.map_err(Error::from),
        Err(_) => Err(Error::Internal),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::file_system::MemoryFileSystem;
    use std::sync::Mutex;

    /// A stdout sink whose contents can be inspected after the program ran.
    #[derive(Clone, Default)]
    pub struct CapturedStdout(Arc<Mutex<Vec<u8>>>);

    impl CapturedStdout {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }

        pub fn lines(&self) -> Vec<String> {
            self.contents().lines().map(str::to_string).collect()
        }
    }

    impl Write for CapturedStdout {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    pub fn program(fs: MemoryFileSystem) -> (Program, CapturedStdout) {
        let stdout = CapturedStdout::new();
        let program = Program::new(
            Arc::new(fs),
            Box::new(stdout.clone()),
            GzipConfig::default(),
            SortConfig::default(),
        );
        (program, stdout)
    }
}

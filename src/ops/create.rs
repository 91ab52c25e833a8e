//! The `create` operation.

use std::io::Write as _;
use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{join_archive_writer, spawn_archive_writer, Error, Program, Result};
use crate::exclude::ExcludeSet;
use crate::path_stream::spawn_fs_stream;

impl Program {
    /// Build a placeholder archive from the directory tree rooted at `root`.
    ///
    /// Every entry written to the archive is also printed to stdout. Any
    /// walker or writer failure aborts the operation and removes `output`.
    pub async fn create(
        &mut self,
        cancel: &CancellationToken,
        root: &Path,
        output: &Path,
        excludes: &[String],
    ) -> Result<()> {
        // Compile patterns before touching the output path, so an invalid
        // pattern fails without leaving a file behind.
        let exclude_set = ExcludeSet::new(excludes)?;

        let out = self.fs.create(output).await.map_err(Error::CreateOutput)?;

        let result = self.create_inner(cancel, root, out, exclude_set).await;
        if result.is_err() {
            let _ = self.fs.remove_file(output).await;
        }
        result
    }

    async fn create_inner(
        &mut self,
        cancel: &CancellationToken,
        root: &Path,
        out: Box<dyn std::io::Write + Send + Sync>,
        excludes: ExcludeSet,
    ) -> Result<()> {
        let mut stream = spawn_fs_stream(
            self.fs.clone(),
            root.to_path_buf(),
            excludes,
            cancel.clone(),
        );

        let (entry_tx, writer_task) = spawn_archive_writer(out, self.gzip_config.clone());

        let mut entries: u64 = 0;
        let pump_result = loop {
            match stream.next().await {
                Ok(Some(name)) => {
                    if entry_tx.send(name.clone()).await.is_err() {
                        // The writer task died; its join result carries the
                        // real failure.
                        break Ok(());
                    }
                    entries += 1;
                    if let Err(err) = writeln!(self.stdout, "{name}") {
                        break Err(Error::Stdout(err));
                    }
                }
                Ok(None) => break Ok(()),
                Err(err) => break Err(Error::Stream(err)),
            }
        };

        drop(entry_tx);
        let writer_result = join_archive_writer(writer_task).await;

        pump_result?;
        writer_result?;

        debug!(entries, "archive created");
        self.flush_stdout()
    }
}

// =============================================================================
// Tests
// =============================================================================

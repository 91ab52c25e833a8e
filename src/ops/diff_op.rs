//! The `diff` operation.

use std::io::Write as _;
use std::path::Path;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{join_archive_writer, spawn_archive_writer, Error, Program, Result};
use crate::diff::{diff_paths, Delta, DiffStats, DELTA_STREAM_BUFFER};
use crate::exclude::ExcludeSet;
use crate::path_stream::multi_path_stream;

impl Program {
    /// Compare two sources and produce a synthetic archive of the
    /// differences.
    ///
    /// `old` and `new` may each be a directory or a `.tar.gz` archive,
    /// resolved by stat; both sides are routed through the external sorter.
    /// Removed paths are written under a synthetic `---/` prefix, added paths
    /// under `+++/`, with matching `--- ` / `+++ ` lines on stdout.
    ///
    /// Returns `Ok(stats)` when the sources are identical (and removes the
    /// output), or `Err(Error::DiffsFound { .. })` when any difference was
    /// found, in which case the archive is kept.
    pub async fn diff(
        &mut self,
        cancel: &CancellationToken,
        old: &Path,
        new: &Path,
        output: &Path,
        excludes: &[String],
    ) -> Result<DiffStats> {
        let exclude_set = ExcludeSet::new(excludes)?;
        self.prepare_tmp_dir().await?;

        let out = self.fs.create(output).await.map_err(Error::CreateOutput)?;

        let result = self
            .diff_inner(cancel, old, new, out, exclude_set)
            .await;

        match result {
            Ok(stats) if stats.has_differences() => {
                debug!(extra_old = stats.extra_old, extra_new = stats.extra_new, "differences found");
                Err(Error::DiffsFound {
                    extra_old: stats.extra_old,
                    extra_new: stats.extra_new,
                })
            }
            Ok(stats) => {
                // No differences: the empty archive is not worth keeping.
                let _ = self.fs.remove_file(output).await;
                Ok(stats)
            }
            Err(err) => {
                let _ = self.fs.remove_file(output).await;
                Err(err)
            }
        }
    }

    async fn diff_inner(
        &mut self,
        cancel: &CancellationToken,
        old: &Path,
        new: &Path,
        out: Box<dyn std::io::Write + Send + Sync>,
        excludes: ExcludeSet,
    ) -> Result<DiffStats> {
        let old_stream = multi_path_stream(
            self.fs.clone(),
            old,
            true,
            excludes.clone(),
            &self.sort_config,
            cancel,
        )
        .await?;
        let new_stream = multi_path_stream(
            self.fs.clone(),
            new,
            true,
            excludes,
            &self.sort_config,
            cancel,
        )
        .await?;

        let (entry_tx, writer_task) = spawn_archive_writer(out, self.gzip_config.clone());
        let (event_tx, mut event_rx) = mpsc::channel(DELTA_STREAM_BUFFER);

        let engine_cancel = cancel.clone();
        let engine = tokio::spawn(async move {
            let mut old_stream = old_stream;
            let mut new_stream = new_stream;
            diff_paths(&engine_cancel, &mut old_stream, &mut new_stream, event_tx).await
        });

        let mut pump_result: Result<()> = Ok(());
        while let Some((delta, path)) = event_rx.recv().await {
            let (line_prefix, entry_prefix) = match delta {
                Delta::Old => ("--- ", "---/"),
                Delta::New => ("+++ ", "+++/"),
            };

            if entry_tx.send(format!("{entry_prefix}{path}")).await.is_err() {
                // Writer failure; surfaced by its join result below.
                break;
            }
            if let Err(err) = writeln!(self.stdout, "{line_prefix}{path}") {
                pump_result = Err(Error::Stdout(err));
                break;
            }
        }

        // Unblock the engine (its sends fail once the receiver is gone) and
        // finalise the archive before collecting verdicts.
        drop(event_rx);
        drop(entry_tx);

        let engine_result = match engine.await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::Internal),
        };
        let writer_result = join_archive_writer(writer_task).await;

        let stats = engine_result?;
        writer_result?;
        pump_result?;

        self.flush_stdout()?;
        Ok(stats)
    }
}

// =============================================================================
// Tests
// =============================================================================

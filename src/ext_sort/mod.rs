//! External merge sort for path records.
//!
//! Input records arrive on a bounded channel. Workers pull chunks of at most
//! `chunk_size` records, sort them in place, and spill them as runs to
//! anonymous temp files; a sole small chunk stays memory-resident. When the
//! input closes, a k-way merge streams the globally sorted output. Peak
//! memory is bounded by `chunk_size` records per worker plus a one-record
//! merge frontier per run, independent of input size.

mod merge;
mod run;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::path_stream::{PathStream, StreamError, ERROR_STREAM_BUFFER};
use merge::{Run, RunMerger};

/// Buffer capacity of the sorted output channel.
pub const SORTED_STREAM_BUFFER: usize = 1000;

/// Default records per chunk before spilling to disk.
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// Default worker count, bounded to cap temp-file pressure.
pub fn default_num_workers() -> usize {
    num_cpus::get().min(4).max(1)
}

/// Errors raised by the external sorter.
#[derive(Debug, Error)]
pub enum SortError {
    /// Spilling a sorted run to disk failed.
    #[error("failed to spill sorted run: {0}")]
    Spill(#[source] std::io::Error),

    /// Reading runs back during the merge failed.
    #[error("failed to merge sorted runs: {0}")]
    Merge(#[source] std::io::Error),

    /// Sorting was cancelled.
    #[error("sorting was cancelled")]
    Cancelled,

    /// A sorter task ended without reporting a result.
    #[error("sorter task failed unexpectedly")]
    TaskFailed,
}

/// Configuration for the external sorter.
#[derive(Debug, Clone)]
pub struct SortConfig {
    /// Maximum records a worker buffers before spilling.
    pub chunk_size: usize,
    /// Number of concurrent sorting workers.
    pub num_workers: usize,
    /// Spill directory; the platform default when `None`.
    pub tmp_dir: Option<PathBuf>,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            num_workers: default_num_workers(),
            tmp_dir: None,
        }
    }
}

impl SortConfig {
    fn spill_dir(&self) -> PathBuf {
        match &self.tmp_dir {
            Some(dir) if !dir.as_os_str().is_empty() => dir.clone(),
            _ => std::env::temp_dir(),
        }
    }
}

// =============================================================================
// Sorting Wrapper
// =============================================================================

/// Wrap a path stream so that it yields its records in byte-lexicographic
/// order.
///
/// The input's error channel is merged with the sorter's own failures; only
/// the first observed error is surfaced downstream, and the sorted output
/// closes promptly when either side fails. This wrapper is the single
/// synchronisation point between producer errors and sort errors.
pub fn sort_stream(
    input: PathStream,
    config: &SortConfig,
    cancel: &CancellationToken,
) -> PathStream {
    let (input_paths, input_errs) = input.into_parts();
    let (sorted_tx, sorted_rx) = mpsc::channel(SORTED_STREAM_BUFFER);
    let (sort_err_tx, sort_err_rx) = mpsc::channel(ERROR_STREAM_BUFFER);
    let (merged_err_tx, merged_err_rx) = mpsc::channel(ERROR_STREAM_BUFFER);

    let config = config.clone();
    let cancel = cancel.clone();

    tokio::spawn(async move {
        if let Err(err) = run_sort(input_paths, sorted_tx, config, cancel).await {
            let _ = sort_err_tx.send(StreamError::from(err)).await;
        }
    });

    tokio::spawn(merge_errors(input_errs, sort_err_rx, merged_err_tx));

    PathStream::new(sorted_rx, merged_err_rx)
}

/// Forward the first error observed from either source, then stop. Both
/// channels are drained to completion when no error occurs.
async fn merge_errors(
    mut external: mpsc::Receiver<StreamError>,
    mut internal: mpsc::Receiver<StreamError>,
    merged: mpsc::Sender<StreamError>,
) {
    let mut external_done = false;
    let mut internal_done = false;

    while !external_done || !internal_done {
        tokio::select! {
            err = external.recv(), if !external_done => {
                match err {
                    Some(err) => {
                        let _ = merged.send(err).await;
                        return;
                    }
                    None => external_done = true,
                }
            }

            err = internal.recv(), if !internal_done => {
                match err {
                    Some(err) => {
                        let _ = merged.send(err).await;
                        return;
                    }
                    None => internal_done = true,
                }
            }
        }
    }
}

// =============================================================================
// Sort Pipeline
// =============================================================================

async fn run_sort(
    input: mpsc::Receiver<String>,
    output: mpsc::Sender<String>,
    config: SortConfig,
    cancel: CancellationToken,
) -> Result<(), SortError> {
    let spill_dir = config.spill_dir();
    let input = Arc::new(Mutex::new(input));
    let runs = Arc::new(StdMutex::new(Vec::new()));
    let chunk_counter = Arc::new(AtomicU64::new(0));

    let mut workers = Vec::with_capacity(config.num_workers.max(1));
    for _ in 0..config.num_workers.max(1) {
        workers.push(tokio::spawn(worker_loop(
            Arc::clone(&input),
            Arc::clone(&runs),
            Arc::clone(&chunk_counter),
            spill_dir.clone(),
            config.chunk_size.max(1),
            cancel.clone(),
        )));
    }

    let mut first_err = None;
    for worker in workers {
        match worker.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                first_err.get_or_insert(err);
            }
            Err(_) => {
                first_err.get_or_insert(SortError::TaskFailed);
            }
        }
    }
    if let Some(err) = first_err {
        return Err(err);
    }
    if cancel.is_cancelled() {
        return Err(SortError::Cancelled);
    }

    let runs = std::mem::take(&mut *runs.lock().expect("runs lock poisoned"));
    debug!(runs = runs.len(), "merging sorted runs");

    let merge = tokio::task::spawn_blocking(move || merge_runs(runs, output, cancel));
    merge.await.map_err(|_| SortError::TaskFailed)?
}

/// Pull chunks from the shared input, sort them, and register runs.
///
/// The input lock is held while a chunk fills, so chunk boundaries are clean
/// and the "sole small chunk" fast path is race-free.
async fn worker_loop(
    input: Arc<Mutex<mpsc::Receiver<String>>>,
    runs: Arc<StdMutex<Vec<Run>>>,
    chunk_counter: Arc<AtomicU64>,
    spill_dir: PathBuf,
    chunk_size: usize,
    cancel: CancellationToken,
) -> Result<(), SortError> {
    loop {
        let (mut chunk, closed, chunk_index) = {
            let mut rx = input.lock().await;
            let mut chunk = Vec::new();
            let mut closed = false;

            while chunk.len() < chunk_size {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(SortError::Cancelled),
                    record = rx.recv() => match record {
                        Some(record) => chunk.push(record),
                        None => {
                            closed = true;
                            break;
                        }
                    },
                }
            }

            let chunk_index = if chunk.is_empty() {
                None
            } else {
                Some(chunk_counter.fetch_add(1, Ordering::SeqCst))
            };
            (chunk, closed, chunk_index)
        };

        if let Some(index) = chunk_index {
            chunk.sort_unstable();

            if closed && index == 0 {
                // The whole input fit in one chunk; no spill needed.
                runs.lock().expect("runs lock poisoned").push(Run::Memory(chunk));
            } else {
                debug!(index, records = chunk.len(), "spilling run");
                let dir = spill_dir.clone();
                let file = tokio::task::spawn_blocking(move || run::write_run(&chunk, &dir))
                    .await
                    .map_err(|_| SortError::TaskFailed)?
                    .map_err(SortError::Spill)?;
                runs.lock().expect("runs lock poisoned").push(Run::File(file));
            }
        }

        if closed {
            return Ok(());
        }
    }
}

/// Stream the k-way merge into the output channel (blocking context).
fn merge_runs(
    runs: Vec<Run>,
    output: mpsc::Sender<String>,
    cancel: CancellationToken,
) -> Result<(), SortError> {
    let mut merger = RunMerger::new(runs).map_err(SortError::Merge)?;

    while let Some(record) = merger.next_record().map_err(SortError::Merge)? {
        if cancel.is_cancelled() {
            return Err(SortError::Cancelled);
        }
        if output.blocking_send(record).is_err() {
            // Downstream hung up; nothing left to do.
            return Ok(());
        }
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

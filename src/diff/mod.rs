//! Two-way ordered merge of sorted path streams.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::path_stream::{PathStream, StreamError};

/// Buffer capacity of the delta event channel.
pub const DELTA_STREAM_BUFFER: usize = 1000;

/// Which side of the comparison a path belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delta {
    /// Present in the old source only.
    Old,
    /// Present in the new source only.
    New,
}

/// Tally of delta events per side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    /// Paths present in the old source only.
    pub extra_old: u64,
    /// Paths present in the new source only.
    pub extra_new: u64,
}

impl DiffStats {
    /// Whether any difference was observed.
    pub fn has_differences(&self) -> bool {
        self.extra_old + self.extra_new > 0
    }
}

/// Errors raised by the diff engine.
#[derive(Debug, Error)]
pub enum DiffError {
    /// One of the input streams failed.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// The comparison was cancelled.
    #[error("diff was cancelled")]
    Cancelled,
}

impl DiffError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DiffError::Cancelled) || matches!(self, DiffError::Stream(e) if e.is_cancelled())
    }
}

/// Merge two sorted streams, emitting one `(side, path)` event for every path
/// present in exactly one of them.
///
/// Comparison is byte-lexicographic and equality is byte-identical, so the
/// input invariant (strictly sorted streams) makes the merge exact. Events go
/// out over the bounded `events` channel; the first upstream error
/// short-circuits further consumption. If the event receiver hangs up, the
/// merge stops quietly and reports the tally so far.
pub async fn diff_paths(
    cancel: &CancellationToken,
    old: &mut PathStream,
    new: &mut PathStream,
    events: mpsc::Sender<(Delta, String)>,
) -> Result<DiffStats, DiffError> {
    let mut stats = DiffStats::default();

    let mut lookahead_old = old.next().await?;
    let mut lookahead_new = new.next().await?;

    loop {
        if cancel.is_cancelled() {
            return Err(DiffError::Cancelled);
        }

        match (lookahead_old.take(), lookahead_new.take()) {
            (None, None) => break,

            (Some(a), None) => {
                stats.extra_old += 1;
                if events.send((Delta::Old, a)).await.is_err() {
                    break;
                }
                lookahead_old = old.next().await?;
            }

            (None, Some(b)) => {
                stats.extra_new += 1;
                if events.send((Delta::New, b)).await.is_err() {
                    break;
                }
                lookahead_new = new.next().await?;
            }

            (Some(a), Some(b)) => match a.cmp(&b) {
                std::cmp::Ordering::Equal => {
                    lookahead_old = old.next().await?;
                    lookahead_new = new.next().await?;
                }
                std::cmp::Ordering::Less => {
                    stats.extra_old += 1;
                    if events.send((Delta::Old, a)).await.is_err() {
                        break;
                    }
                    lookahead_old = old.next().await?;
                    lookahead_new = Some(b);
                }
                std::cmp::Ordering::Greater => {
                    stats.extra_new += 1;
                    if events.send((Delta::New, b)).await.is_err() {
                        break;
                    }
                    lookahead_old = Some(a);
                    lookahead_new = new.next().await?;
                }
            },
        }
    }

    Ok(stats)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_stream(records: &[&str]) -> PathStream {
        let (path_tx, path_rx) = mpsc::channel(records.len().max(1));
        let (err_tx, err_rx) = mpsc::channel(1);

        for record in records {
            path_tx.try_send(record.to_string()).unwrap();
        }
        drop(path_tx);
        drop(err_tx);

        PathStream::new(path_rx, err_rx)
    }

    fn failing_stream(records: &[&str], err: StreamError) -> PathStream {
        let (path_tx, path_rx) = mpsc::channel(records.len().max(1));
        let (err_tx, err_rx) = mpsc::channel(1);

        for record in records {
            path_tx.try_send(record.to_string()).unwrap();
        }
        err_tx.try_send(err).unwrap();

        PathStream::new(path_rx, err_rx)
    }

    async fn run_diff(
        old: &[&str],
        new: &[&str],
    ) -> (DiffStats, Vec<(Delta, String)>) {
        let cancel = CancellationToken::new();
        let mut old = fixed_stream(old);
        let mut new = fixed_stream(new);
        let (tx, mut rx) = mpsc::channel(DELTA_STREAM_BUFFER);

        let stats = diff_paths(&cancel, &mut old, &mut new, tx).await.unwrap();

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (stats, events)
    }

    #[tokio::test]
    async fn test_identical_streams_produce_no_events() {
        let (stats, events) = run_diff(&["a", "b/", "b/x"], &["a", "b/", "b/x"]).await;
        assert!(!stats.has_differences());
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_interleaved_differences() {
        let (stats, events) =
            run_diff(&["a", "b/", "b/x.txt"], &["a", "b/", "b/y.txt"]).await;

        assert_eq!(stats, DiffStats { extra_old: 1, extra_new: 1 });
        assert_eq!(
            events,
            vec![
                (Delta::Old, "b/x.txt".to_string()),
                (Delta::New, "b/y.txt".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_one_side_empty() {
        let (stats, events) = run_diff(&[], &["a", "b"]).await;
        assert_eq!(stats, DiffStats { extra_old: 0, extra_new: 2 });
        assert_eq!(events.len(), 2);

        let (stats, events) = run_diff(&["a", "b"], &[]).await;
        assert_eq!(stats, DiffStats { extra_old: 2, extra_new: 0 });
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_swapping_sides_swaps_deltas() {
        let (_, forward) = run_diff(&["a", "m"], &["a", "z"]).await;
        let (_, backward) = run_diff(&["a", "z"], &["a", "m"]).await;

        let forward_old: Vec<_> = forward
            .iter()
            .filter(|(d, _)| *d == Delta::Old)
            .map(|(_, p)| p.clone())
            .collect();
        let backward_new: Vec<_> = backward
            .iter()
            .filter(|(d, _)| *d == Delta::New)
            .map(|(_, p)| p.clone())
            .collect();

        assert_eq!(forward_old, backward_new);
    }

    #[tokio::test]
    async fn test_counts_match_set_differences() {
        let (stats, _) = run_diff(&["a", "b", "c", "d"], &["b", "d", "e"]).await;
        assert_eq!(stats, DiffStats { extra_old: 2, extra_new: 1 });
    }

    #[tokio::test]
    async fn test_upstream_error_propagates() {
        let cancel = CancellationToken::new();
        let mut old = failing_stream(
            &["a"],
            StreamError::Tar(std::io::Error::other("broken header")),
        );
        let mut new = fixed_stream(&["a", "b"]);
        let (tx, _rx) = mpsc::channel(DELTA_STREAM_BUFFER);

        let err = diff_paths(&cancel, &mut old, &mut new, tx).await.unwrap_err();
        assert!(matches!(err, DiffError::Stream(StreamError::Tar(_))));
    }

    #[tokio::test]
    async fn test_cancellation_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut old = fixed_stream(&["a"]);
        let mut new = fixed_stream(&["b"]);
        let (tx, _rx) = mpsc::channel(DELTA_STREAM_BUFFER);

        let err = diff_paths(&cancel, &mut old, &mut new, tx).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}

//! K-way merge of sorted runs.
//!
//! Each run contributes one lookahead record to a min-heap, so the merge
//! frontier holds exactly one record per run regardless of run size. Ties
//! between runs are broken by run id, keeping the merge stable.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::File;

use super::run::RunReader;

/// One sorted run, either memory-resident or spilled to disk.
pub(crate) enum Run {
    Memory(Vec<String>),
    File(File),
}

enum RunCursor {
    Memory(std::vec::IntoIter<String>),
    File(RunReader),
}

impl RunCursor {
    fn advance(&mut self) -> std::io::Result<Option<String>> {
        match self {
            RunCursor::Memory(iter) => Ok(iter.next()),
            RunCursor::File(reader) => reader.next_record(),
        }
    }
}

/// Streaming merge over a set of runs.
pub(crate) struct RunMerger {
    cursors: Vec<RunCursor>,
    heap: BinaryHeap<HeapItem>,
}

impl RunMerger {
    pub(crate) fn new(runs: Vec<Run>) -> std::io::Result<Self> {
        let mut cursors = Vec::with_capacity(runs.len());
        let mut heap = BinaryHeap::with_capacity(runs.len());

        for (run, source) in runs.into_iter().enumerate() {
            let mut cursor = match source {
                Run::Memory(records) => RunCursor::Memory(records.into_iter()),
                Run::File(file) => RunCursor::File(RunReader::new(file)),
            };

            if let Some(record) = cursor.advance()? {
                heap.push(HeapItem { record, run });
            }
            cursors.push(cursor);
        }

        Ok(Self { cursors, heap })
    }

    /// Next record in global byte-lexicographic order, or `None` when all
    /// runs are exhausted.
    pub(crate) fn next_record(&mut self) -> std::io::Result<Option<String>> {
        let Some(item) = self.heap.pop() else {
            return Ok(None);
        };

        if let Some(next) = self.cursors[item.run].advance()? {
            self.heap.push(HeapItem {
                record: next,
                run: item.run,
            });
        }

        Ok(Some(item.record))
    }
}

struct HeapItem {
    record: String,
    run: usize,
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behaviour; equal records drain lower run ids
        // first.
        other
            .record
            .cmp(&self.record)
            .then_with(|| other.run.cmp(&self.run))
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.record == other.record && self.run == other.run
    }
}

impl Eq for HeapItem {}

// =============================================================================
// Tests
// =============================================================================

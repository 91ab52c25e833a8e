//! Block-parallel gzip encoder.
//!
//! The incoming byte stream is split into fixed-size blocks; a pool of worker
//! threads compresses each block into an independent gzip member, and a
//! serialiser thread writes the members back out in submission order. The
//! result is a concatenation of gzip members, which standard decoders treat
//! as a single logical stream.

use std::collections::BTreeMap;
use std::io::Write;
use std::thread;

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};
use flate2::write::GzEncoder;
use flate2::Compression;

struct Block {
    index: u64,
    data: Vec<u8>,
}

struct CompressedBlock {
    index: u64,
    data: Bytes,
}

/// A `Write` implementation producing block-parallel gzip output.
///
/// Callers must invoke [`ParallelGzEncoder::finish`] to flush the final block
/// and recover the inner writer; dropping the encoder abandons the pipeline
/// (worker threads drain and exit on their own).
pub struct ParallelGzEncoder<W: Write + Send + 'static> {
    buffer: Vec<u8>,
    block_size: usize,
    next_index: u64,
    block_tx: Sender<Block>,
    workers: Vec<thread::JoinHandle<()>>,
    serializer: thread::JoinHandle<std::io::Result<W>>,
}

impl<W: Write + Send + 'static> ParallelGzEncoder<W> {
    /// Start the compression pipeline over `out`.
    ///
    /// `level` must be a valid gzip level (0..=9) and `block_size` and
    /// `block_count` positive; the archive-level configuration is validated
    /// before this is called.
    pub fn new(out: W, level: u32, block_size: usize, block_count: usize) -> std::io::Result<Self> {
        let (block_tx, block_rx) = crossbeam_channel::bounded::<Block>(block_count);
        let (result_tx, result_rx) =
            crossbeam_channel::bounded::<std::io::Result<CompressedBlock>>(block_count);

        let compression = Compression::new(level);
        let mut workers = Vec::with_capacity(block_count);
        for index in 0..block_count {
            let rx = block_rx.clone();
            let tx = result_tx.clone();
            workers.push(
                thread::Builder::new()
                    .name(format!("gzip-block-{index}"))
                    .spawn(move || compress_blocks(rx, tx, compression))?,
            );
        }
        drop(block_rx);
        drop(result_tx);

        let serializer = thread::Builder::new()
            .name("gzip-serializer".to_string())
            .spawn(move || serialize_blocks(result_rx, out))?;

        Ok(Self {
            buffer: Vec::with_capacity(block_size),
            block_size,
            next_index: 0,
            block_tx,
            workers,
            serializer,
        })
    }

    fn send_block(&mut self) -> std::io::Result<()> {
        let data = std::mem::take(&mut self.buffer);
        let block = Block {
            index: self.next_index,
            data,
        };
        self.next_index += 1;

        self.block_tx.send(block).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "compression pipeline closed")
        })
    }

    /// Flush the final block, wait for the pipeline to drain, and return the
    /// inner writer.
    pub fn finish(mut self) -> std::io::Result<W> {
        // An empty stream still emits one (empty) member so the output is a
        // well-formed gzip stream.
        if !self.buffer.is_empty() || self.next_index == 0 {
            self.send_block()?;
        }

        drop(self.block_tx);
        for worker in self.workers {
            let _ = worker.join();
        }

        match self.serializer.join() {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::other("gzip serializer thread panicked")),
        }
    }
}

impl<W: Write + Send + 'static> Write for ParallelGzEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut offset = 0;
        while offset < buf.len() {
            if self.buffer.len() == self.block_size {
                self.send_block()?;
                self.buffer.reserve(self.block_size);
            }

            let remaining = self.block_size - self.buffer.len();
            let take = remaining.min(buf.len() - offset);
            self.buffer.extend_from_slice(&buf[offset..offset + take]);
            offset += take;
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        // Blocks are member boundaries; partial blocks only flush at finish.
        Ok(())
    }
}

fn compress_blocks(
    blocks: Receiver<Block>,
    results: Sender<std::io::Result<CompressedBlock>>,
    compression: Compression,
) {
    for block in blocks.iter() {
        let mut encoder =
            GzEncoder::new(Vec::with_capacity(block.data.len() / 2 + 64), compression);

        let compressed = encoder
            .write_all(&block.data)
            .and_then(|_| encoder.finish());

        match compressed {
            Ok(data) => {
                let ok = results.send(Ok(CompressedBlock {
                    index: block.index,
                    data: Bytes::from(data),
                }));
                if ok.is_err() {
                    break;
                }
            }
            Err(err) => {
                let _ = results.send(Err(err));
                break;
            }
        }
    }
}

fn serialize_blocks<W: Write>(
    results: Receiver<std::io::Result<CompressedBlock>>,
    mut out: W,
) -> std::io::Result<W> {
    let mut pending = BTreeMap::<u64, Bytes>::new();
    let mut next_index = 0u64;

    for result in results.iter() {
        let block = result?;
        pending.insert(block.index, block.data);

        while let Some(data) = pending.remove(&next_index) {
            out.write_all(&data)?;
            next_index += 1;
        }
    }

    if !pending.is_empty() {
        return Err(std::io::Error::other(
            "compression pipeline terminated with out-of-order blocks",
        ));
    }

    out.flush()?;
    Ok(out)
}

// =============================================================================
// Tests
// =============================================================================

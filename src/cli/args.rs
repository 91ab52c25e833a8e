//! Shared command-line flag groups.

use std::path::PathBuf;

use clap::Args;

use crate::archive::{self, GzipConfig, DEFAULT_BLOCK_SIZE, DEFAULT_COMPRESSION_LEVEL};
use crate::ext_sort::{self, SortConfig, DEFAULT_CHUNK_SIZE};

// =============================================================================
// Exclude Arguments
// =============================================================================

/// Exclude options shared by `create` and `diff`.
#[derive(Args, Debug, Default)]
pub struct ExcludeArgs {
    /// Pattern to exclude; can be repeated multiple times.
    #[arg(long = "exclude", value_name = "PATTERN")]
    pub excludes: Vec<String>,

    /// Path to a file containing exclude patterns.
    #[arg(long = "excludes-from", value_name = "FILE")]
    pub excludes_from: Option<PathBuf>,
}

// =============================================================================
// Compressor Arguments
// =============================================================================

/// Gzip options for archive-producing commands.
#[derive(Args, Debug)]
pub struct CompressArgs {
    /// Level of compression (0: none - 9: highest).
    #[arg(long, value_name = "LEVEL", default_value_t = DEFAULT_COMPRESSION_LEVEL, allow_negative_numbers = true)]
    pub compression: i32,

    /// Block size for compressing.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_BLOCK_SIZE, allow_negative_numbers = true)]
    pub blocksize: i64,

    /// Blocks to compress in parallel.
    #[arg(long, value_name = "COUNT", default_value_t = archive::default_block_count(), allow_negative_numbers = true)]
    pub blockcount: i64,
}

impl CompressArgs {
    /// Convert to a [`GzipConfig`]; validation happens in the archive writer.
    pub fn to_gzip_config(&self) -> GzipConfig {
        GzipConfig {
            block_size: self.blocksize,
            block_count: self.blockcount,
            compression_level: self.compression,
        }
    }
}

// =============================================================================
// Sorter Arguments
// =============================================================================

/// External-sorter options for commands that sort path streams.
#[derive(Args, Debug)]
pub struct SorterArgs {
    /// On-disk location for intermediate files.
    #[arg(long, value_name = "DIR")]
    pub tmpdir: Option<PathBuf>,

    /// Workers for concurrent operations.
    #[arg(long, value_name = "COUNT", default_value_t = ext_sort::default_num_workers())]
    pub workers: usize,

    /// Max records per worker before spilling to disk.
    #[arg(long, value_name = "COUNT", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunksize: usize,
}

impl SorterArgs {
    /// Convert to a [`SortConfig`].
    pub fn to_sort_config(&self) -> SortConfig {
        SortConfig {
            chunk_size: self.chunksize,
            num_workers: self.workers,
            tmp_dir: self.tmpdir.clone(),
        }
    }
}

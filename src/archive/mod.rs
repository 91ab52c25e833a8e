//! Placeholder archive writer.
//!
//! Archives are tar streams of zero-byte entries wrapped in block-parallel
//! gzip. Headers are fully deterministic: zero mtime/uid/gid, empty owner
//! names, fixed modes. The same tree therefore always produces byte-identical
//! output for the same configuration.

mod parallel_gzip;

pub use parallel_gzip::ParallelGzEncoder;

use std::io::Write;

use thiserror::Error;

/// Mode bits for regular placeholder entries.
pub const BASE_FILE_MODE: u32 = 0o666;
/// Mode bits for directory entries.
pub const BASE_DIR_MODE: u32 = 0o777;

/// Default gzip block size (1 MiB).
pub const DEFAULT_BLOCK_SIZE: i64 = 1 << 20;
/// Default gzip compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 9;

/// Default number of blocks compressing in parallel.
pub fn default_block_count() -> i64 {
    num_cpus::get() as i64
}

/// Errors raised by the archive writer.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("invalid compression level {0}: must be between 0 and 9")]
    InvalidCompressionLevel(i32),

    #[error("invalid block size {0}: must be positive")]
    InvalidBlockSize(i64),

    #[error("invalid block count {0}: must be positive")]
    InvalidBlockCount(i64),

    #[error("failed to write archive entry: {0}")]
    Entry(#[source] std::io::Error),

    #[error("failed to finalize archive: {0}")]
    Finish(#[source] std::io::Error),
}

/// Configuration for concurrent gzip output.
#[derive(Debug, Clone)]
pub struct GzipConfig {
    /// Approximate size of independently compressed blocks.
    pub block_size: i64,
    /// Number of blocks compressing in parallel.
    pub block_count: i64,
    /// Compression level, 0 (none) to 9 (highest).
    pub compression_level: i32,
}

impl Default for GzipConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            block_count: default_block_count(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl GzipConfig {
    /// Reject illegal configurations before any output bytes are written.
    pub fn validate(&self) -> Result<(), ArchiveError> {
        if !(0..=9).contains(&self.compression_level) {
            return Err(ArchiveError::InvalidCompressionLevel(self.compression_level));
        }
        if self.block_size < 1 {
            return Err(ArchiveError::InvalidBlockSize(self.block_size));
        }
        if self.block_count < 1 {
            return Err(ArchiveError::InvalidBlockCount(self.block_count));
        }
        Ok(())
    }
}

// =============================================================================
// ArchiveWriter
// =============================================================================

/// Sink producing a tar-in-gzip archive of placeholder entries.
pub struct ArchiveWriter<W: Write + Send + 'static> {
    builder: tar::Builder<ParallelGzEncoder<W>>,
}

impl<W: Write + Send + 'static> ArchiveWriter<W> {
    /// Validate the configuration and start the output pipeline.
    pub fn new(out: W, config: &GzipConfig) -> Result<Self, ArchiveError> {
        config.validate()?;

        let encoder = ParallelGzEncoder::new(
            out,
            config.compression_level as u32,
            config.block_size as usize,
            config.block_count as usize,
        )
        .map_err(ArchiveError::Entry)?;

        Ok(Self {
            builder: tar::Builder::new(encoder),
        })
    }

    /// Append one zero-byte placeholder entry.
    ///
    /// Directory names always gain a trailing `/`; regular names are written
    /// as given. Names longer than 100 bytes go out via a GNU long-name
    /// extension entry.
    pub fn append_placeholder(&mut self, name: &str, is_dir: bool) -> Result<(), ArchiveError> {
        let mut header = tar::Header::new_gnu();
        header.set_size(0);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);

        if is_dir {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_mode(BASE_DIR_MODE);

            let name = if name.ends_with('/') {
                name.to_string()
            } else {
                format!("{name}/")
            };
            self.builder
                .append_data(&mut header, name, std::io::empty())
                .map_err(ArchiveError::Entry)
        } else {
            header.set_entry_type(tar::EntryType::Regular);
            header.set_mode(BASE_FILE_MODE);

            self.builder
                .append_data(&mut header, name, std::io::empty())
                .map_err(ArchiveError::Entry)
        }
    }

    /// Write the tar trailer, drain the compression pipeline, flush, and
    /// return the inner writer.
    pub fn finish(self) -> Result<W, ArchiveError> {
        let encoder = self.builder.into_inner().map_err(ArchiveError::Finish)?;
        encoder.finish().map_err(ArchiveError::Finish)
    }
}

// =============================================================================
// Tests
// =============================================================================

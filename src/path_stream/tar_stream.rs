//! Tar-in-gzip reader stream.

use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::sync::Arc;

use flate2::read::MultiGzDecoder;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{PathStream, StreamError, ERROR_STREAM_BUFFER, TAR_STREAM_BUFFER};
use crate::exclude::ExcludeSet;
use crate::file_system::FileSystem;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Start decoding the archive at `path`, emitting header names verbatim.
///
/// Directoryness is carried by the tar convention of a trailing `/` in the
/// name. The gzip stream may consist of multiple concatenated members, as
/// produced by the block-parallel writer.
pub fn spawn_tar_stream(
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    excludes: ExcludeSet,
    cancel: CancellationToken,
) -> PathStream {
    let (path_tx, path_rx) = mpsc::channel(TAR_STREAM_BUFFER);
    let (err_tx, err_rx) = mpsc::channel(ERROR_STREAM_BUFFER);

    tokio::spawn(async move {
        if let Err(err) = read_archive(fs, path, excludes, cancel, path_tx).await {
            let _ = err_tx.send(err).await;
        }
    });

    PathStream::new(path_rx, err_rx)
}

async fn read_archive(
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    excludes: ExcludeSet,
    cancel: CancellationToken,
    paths: mpsc::Sender<String>,
) -> Result<(), StreamError> {
    let reader = fs.open(&path).await.map_err(StreamError::Open)?;

    let decode = tokio::task::spawn_blocking(move || decode_entries(reader, excludes, cancel, paths));

    decode
        .await
        .unwrap_or_else(|_| Err(StreamError::Tar(std::io::Error::other("decoder task failed"))))
}

fn decode_entries(
    reader: Box<dyn Read + Send>,
    excludes: ExcludeSet,
    cancel: CancellationToken,
    paths: mpsc::Sender<String>,
) -> Result<(), StreamError> {
    let mut buffered = BufReader::new(reader);

    // The gzip magic is checked eagerly so that a non-gzip input is reported
    // as a gzip decode failure rather than a tar one.
    let header = buffered.fill_buf().map_err(StreamError::Gzip)?;
    if header.len() < GZIP_MAGIC.len() || header[..GZIP_MAGIC.len()] != GZIP_MAGIC {
        return Err(StreamError::Gzip(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "invalid gzip header",
        )));
    }

    let gz = MultiGzDecoder::new(buffered);
    let mut archive = tar::Archive::new(gz);

    let entries = archive.entries().map_err(StreamError::Tar)?;
    for entry in entries {
        if cancel.is_cancelled() {
            return Err(StreamError::Cancelled);
        }

        let mut entry = entry.map_err(StreamError::Tar)?;
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let is_dir = name.ends_with('/');

        if !excludes.is_match(&name, is_dir) && paths.blocking_send(name).is_err() {
            // Downstream hung up; stop decoding.
            return Ok(());
        }

        // Skip any payload so the next header can be read. Placeholder
        // entries are zero-sized, but foreign archives may not be.
        std::io::copy(&mut entry, &mut std::io::sink()).map_err(StreamError::Tar)?;
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

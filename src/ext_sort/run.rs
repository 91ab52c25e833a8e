//! Spill-run serialisation.
//!
//! A run is a sorted sequence of records written to an anonymous temp file as
//! `u32`-LE length-prefixed UTF-8 strings. Anonymous files are unlinked at
//! creation, so runs can never outlive the operation.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// I/O buffer size for run files (256 KB).
pub(crate) const IO_BUFFER_SIZE: usize = 256 * 1024;

/// Serialise a sorted chunk into an anonymous temp file in `dir`, rewound and
/// ready for reading.
pub(crate) fn write_run(records: &[String], dir: &Path) -> std::io::Result<File> {
    let file = tempfile::tempfile_in(dir)?;
    let mut writer = BufWriter::with_capacity(IO_BUFFER_SIZE, file);

    for record in records {
        let len = u32::try_from(record.len()).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "record too long")
        })?;
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(record.as_bytes())?;
    }

    let mut file = writer.into_inner().map_err(|e| e.into_error())?;
    file.seek(SeekFrom::Start(0))?;
    Ok(file)
}

/// Sequential reader over a serialised run.
pub(crate) struct RunReader {
    reader: BufReader<File>,
}

impl RunReader {
    pub(crate) fn new(file: File) -> Self {
        Self {
            reader: BufReader::with_capacity(IO_BUFFER_SIZE, file),
        }
    }

    /// Next record, or `None` at end of run.
    pub(crate) fn next_record(&mut self) -> std::io::Result<Option<String>> {
        let mut len_buf = [0u8; 4];
        if !read_exact_or_eof(&mut self.reader, &mut len_buf)? {
            return Ok(None);
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf)?;

        String::from_utf8(buf)
            .map(Some)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "run record is not UTF-8"))
    }
}

/// Fill `buf` completely, or report a clean EOF when no bytes were available.
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "truncated run record",
            ));
        }
        filled += n;
    }
    Ok(true)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_roundtrip() {
        let records = vec![
            "a.txt".to_string(),
            "b/".to_string(),
            "b/c.txt".to_string(),
            String::new(),
        ];

        let file = write_run(&records, &std::env::temp_dir()).unwrap();
        let mut reader = RunReader::new(file);

        let mut out = Vec::new();
        while let Some(record) = reader.next_record().unwrap() {
            out.push(record);
        }

        assert_eq!(out, records);
    }

    #[test]
    fn test_empty_run() {
        let file = write_run(&[], &std::env::temp_dir()).unwrap();
        let mut reader = RunReader::new(file);
        assert!(reader.next_record().unwrap().is_none());
    }
}

//! Real-filesystem implementation of the [`FileSystem`] capability.

use std::io::{Read, Write};
use std::path::Path;

use async_trait::async_trait;
use tokio::fs;

use super::{EntryInfo, Error, FileKind, FileSystem, Result};

/// A [`FileSystem`] backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl OsFileSystem {
    pub fn new() -> Self {
        Self
    }
}

fn map_not_found(err: std::io::Error, path: &Path) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound(path.display().to_string())
    } else {
        Error::Io(err)
    }
}

#[async_trait]
impl FileSystem for OsFileSystem {
    async fn stat(&self, path: &Path) -> Result<FileKind> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| map_not_found(e, path))?;

        if metadata.is_dir() {
            Ok(FileKind::Directory)
        } else {
            Ok(FileKind::File)
        }
    }

    async fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let file = fs::File::open(path)
            .await
            .map_err(|e| map_not_found(e, path))?;

        Ok(Box::new(file.into_std().await))
    }

    async fn create(&self, path: &Path) -> Result<Box<dyn Write + Send + Sync>> {
        let file = fs::File::create(path).await?;

        Ok(Box::new(file.into_std().await))
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await?;
        Ok(())
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await?;
        Ok(())
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<EntryInfo>> {
        let mut reader = fs::read_dir(path).await.map_err(|e| map_not_found(e, path))?;
        let mut entries = Vec::new();

        while let Some(entry) = reader.next_entry().await? {
            let kind = if entry.file_type().await?.is_dir() {
                FileKind::Directory
            } else {
                FileKind::File
            };

            entries.push(EntryInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(entries)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_stat_kinds() {
        let temp = TempDir::new().unwrap();
        File::create(temp.path().join("f.txt")).unwrap();
        std::fs::create_dir(temp.path().join("d")).unwrap();

        let fs = OsFileSystem::new();
        assert_eq!(fs.stat(&temp.path().join("f.txt")).await.unwrap(), FileKind::File);
        assert_eq!(fs.stat(&temp.path().join("d")).await.unwrap(), FileKind::Directory);
    }

    #[tokio::test]
    async fn test_stat_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let fs = OsFileSystem::new();

        let err = fs.stat(&temp.path().join("missing")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_read_dir_is_name_sorted() {
        let temp = TempDir::new().unwrap();
        for name in ["z.txt", "a.txt", "m"] {
            File::create(temp.path().join(name)).unwrap();
        }

        let fs = OsFileSystem::new();
        let names: Vec<_> = fs
            .read_dir(temp.path())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();

        assert_eq!(names, vec!["a.txt", "m", "z.txt"]);
    }

    #[tokio::test]
    async fn test_create_write_open_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.bin");
        let fs = OsFileSystem::new();

        {
            let mut writer = fs.create(&path).await.unwrap();
            writer.write_all(b"shape only").unwrap();
            writer.flush().unwrap();
        }

        let mut reader = fs.open(&path).await.unwrap();
        let mut contents = Vec::new();
        reader.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"shape only");

        fs.remove_file(&path).await.unwrap();
        assert!(matches!(fs.stat(&path).await, Err(Error::NotFound(_))));
    }
}

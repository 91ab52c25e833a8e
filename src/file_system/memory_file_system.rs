//! In-memory implementation of the [`FileSystem`] capability, for tests.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{EntryInfo, Error, FileKind, FileSystem, Result};

/// A node in the in-memory tree.
#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Directory,
}

/// An entry handed to [`MemoryFileSystemBuilder::add`].
#[derive(Debug, Clone)]
pub struct MemoryFsEntry(Node);

impl MemoryFsEntry {
    /// A file with the given contents.
    pub fn file(contents: impl Into<Vec<u8>>) -> Self {
        Self(Node::File(contents.into()))
    }

    /// An (empty) directory.
    pub fn dir() -> Self {
        Self(Node::Directory)
    }
}

/// A [`FileSystem`] held entirely in memory.
///
/// Paths are stored as cleaned, forward-slash, relative keys; absolute and
/// relative spellings of the same path are equivalent.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    nodes: Arc<Mutex<BTreeMap<String, Node>>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> MemoryFileSystemBuilder {
        MemoryFileSystemBuilder::default()
    }

    /// Snapshot of a file's current contents.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let key = normalize(path.as_ref());
        match self.nodes.lock().unwrap().get(&key) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    /// Whether any node exists at the given path.
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        let key = normalize(path.as_ref());
        key.is_empty() || self.nodes.lock().unwrap().contains_key(&key)
    }
}

/// Builder for seeding a [`MemoryFileSystem`].
#[derive(Debug, Default)]
pub struct MemoryFileSystemBuilder {
    nodes: BTreeMap<String, Node>,
}

impl MemoryFileSystemBuilder {
    /// Add an entry, creating any missing parent directories.
    pub fn add(mut self, path: impl AsRef<Path>, entry: MemoryFsEntry) -> Self {
        let key = normalize(path.as_ref());
        insert_parents(&mut self.nodes, &key);
        self.nodes.insert(key, entry.0);
        self
    }

    pub fn build(self) -> MemoryFileSystem {
        MemoryFileSystem {
            nodes: Arc::new(Mutex::new(self.nodes)),
        }
    }
}

fn normalize(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let mut key = String::with_capacity(raw.len());

    for segment in raw.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if !key.is_empty() {
            key.push('/');
        }
        key.push_str(segment);
    }

    key
}

fn insert_parents(nodes: &mut BTreeMap<String, Node>, key: &str) {
    let mut prefix = String::new();
    for segment in key.split('/') {
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(segment);
        if prefix != key {
            nodes.entry(prefix.clone()).or_insert(Node::Directory);
        }
    }
}

// =============================================================================
// Writer Handle
// =============================================================================

/// A write handle that commits into the shared tree on flush and drop.
struct MemoryWriter {
    key: String,
    buffer: Vec<u8>,
    nodes: Arc<Mutex<BTreeMap<String, Node>>>,
}

impl MemoryWriter {
    fn commit(&mut self) {
        self.nodes
            .lock()
            .unwrap()
            .insert(self.key.clone(), Node::File(self.buffer.clone()));
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.commit();
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        // A removed output stays removed; a late-flushing writer must not
        // resurrect it.
        if self.nodes.lock().unwrap().contains_key(&self.key) {
            self.commit();
        }
    }
}

// =============================================================================
// FileSystem Implementation
// =============================================================================

#[async_trait]
impl FileSystem for MemoryFileSystem {
    async fn stat(&self, path: &Path) -> Result<FileKind> {
        let key = normalize(path);
        if key.is_empty() {
            return Ok(FileKind::Directory);
        }

        match self.nodes.lock().unwrap().get(&key) {
            Some(Node::File(_)) => Ok(FileKind::File),
            Some(Node::Directory) => Ok(FileKind::Directory),
            None => Err(Error::NotFound(path.display().to_string())),
        }
    }

    async fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let key = normalize(path);
        match self.nodes.lock().unwrap().get(&key) {
            Some(Node::File(data)) => Ok(Box::new(Cursor::new(data.clone()))),
            Some(Node::Directory) => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("is a directory: {key}"),
            ))),
            None => Err(Error::NotFound(path.display().to_string())),
        }
    }

    async fn create(&self, path: &Path) -> Result<Box<dyn Write + Send + Sync>> {
        let key = normalize(path);
        let mut nodes = self.nodes.lock().unwrap();
        insert_parents(&mut nodes, &key);
        nodes.insert(key.clone(), Node::File(Vec::new()));

        Ok(Box::new(MemoryWriter {
            key,
            buffer: Vec::new(),
            nodes: Arc::clone(&self.nodes),
        }))
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        let key = normalize(path);
        match self.nodes.lock().unwrap().remove(&key) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(path.display().to_string())),
        }
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        let key = normalize(path);
        if key.is_empty() {
            return Ok(());
        }

        let mut nodes = self.nodes.lock().unwrap();
        if matches!(nodes.get(&key), Some(Node::File(_))) {
            return Err(Error::NotADirectory(path.display().to_string()));
        }
        insert_parents(&mut nodes, &key);
        nodes.insert(key, Node::Directory);
        Ok(())
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<EntryInfo>> {
        let key = normalize(path);
        let nodes = self.nodes.lock().unwrap();

        if !key.is_empty() {
            match nodes.get(&key) {
                Some(Node::Directory) => {}
                Some(Node::File(_)) => {
                    return Err(Error::NotADirectory(path.display().to_string()))
                }
                None => return Err(Error::NotFound(path.display().to_string())),
            }
        }

        let prefix = if key.is_empty() { String::new() } else { format!("{key}/") };
        let mut entries = Vec::new();

        for (candidate, node) in nodes.range(prefix.clone()..) {
            if !candidate.starts_with(&prefix) {
                break;
            }
            let rest = &candidate[prefix.len()..];
            if rest.is_empty() || rest.contains('/') {
                continue;
            }
            entries.push(EntryInfo {
                name: rest.to_string(),
                kind: match node {
                    Node::File(_) => FileKind::File,
                    Node::Directory => FileKind::Directory,
                },
            });
        }

        Ok(entries)
    }
}

// =============================================================================
// Tests
// =============================================================================

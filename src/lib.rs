//! hollowtar - preserve, diff, and list directory trees as placeholder
//! archives.
//!
//! A hollowtar archive keeps every path of a directory tree but none of the
//! file contents: files become zero-byte tar entries, wrapped in
//! block-parallel gzip. Two such snapshots (or a snapshot and a live tree)
//! can be compared structurally with bounded memory, courtesy of an external
//! merge sort that spills to disk.

pub mod archive;
pub mod cli;
pub mod diff;
pub mod exclude;
pub mod ext_sort;
pub mod file_system;
pub mod ops;
pub mod path_stream;

pub use archive::{ArchiveWriter, GzipConfig};
pub use exclude::ExcludeSet;
pub use ext_sort::SortConfig;
pub use file_system::{FileSystem, MemoryFileSystem, MemoryFsEntry, OsFileSystem};
pub use ops::Program;

//! Storage abstraction layer for Tessera.
//!
//! The index persists commit files, segment files and deletion files through
//! the [`Storage`] trait, so the same index code runs against a directory on
//! disk or a purely in-memory store.
//!
//! # Storage Types
//!
//! ## FileStorage
//! - Disk-based persistent storage rooted at one directory
//! - Buffered reads and writes, optional fsync on close
//!
//! ## MemoryStorage
//! - In-memory storage for tests and throwaway indexes
//! - Fast but non-persistent
//!
//! # Example
//!
//! ```
//! use tessera::storage::{MemoryStorage, Storage};
//!
//! # fn main() -> tessera::error::Result<()> {
//! let storage = MemoryStorage::new_default();
//! assert!(!storage.file_exists("segments_1"));
//! storage.delete_file("segments_1")?;
//! # Ok(())
//! # }
//! ```

use std::io::{Read, Seek, Write};

use crate::error::{Result, TesseraError};

pub mod file;
pub mod memory;
pub mod structured;

pub use file::{FileStorage, FileStorageConfig};
pub use memory::{MemoryStorage, MemoryStorageConfig};

/// A trait for storage backends that can store and retrieve named files.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Open an existing file for reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create a file for writing, truncating any previous content.
    ///
    /// For the in-memory backend the content becomes visible when the output
    /// is closed.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Check if a file exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Delete a file. Deleting a missing file is not an error.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// List all file names, sorted.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Get the size of a file in bytes.
    fn file_size(&self, name: &str) -> Result<u64>;

    /// Rename a file, replacing `new_name` if it exists.
    ///
    /// Commits write their commit file under a temporary name and rename it
    /// into place, so readers never observe a partially written commit.
    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()>;

    /// Make all closed outputs durable.
    fn sync(&self) -> Result<()>;
}

/// A readable, seekable file handle.
pub trait StorageInput: Read + Seek + Send + std::fmt::Debug {
    /// Total size of the underlying file.
    fn size(&self) -> Result<u64>;

    /// Release the handle.
    fn close(&mut self) -> Result<()>;
}

/// A writable file handle.
pub trait StorageOutput: Write + Send + std::fmt::Debug {
    /// Flush buffers and, where the backend supports it, fsync.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Number of bytes written so far.
    fn position(&self) -> Result<u64>;

    /// Finish the file. Further writes fail.
    fn close(&mut self) -> Result<()>;
}

// Implement StorageOutput for Box<dyn StorageOutput> to allow trait objects
impl StorageOutput for Box<dyn StorageOutput> {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.as_mut().flush_and_sync()
    }

    fn position(&self) -> Result<u64> {
        self.as_ref().position()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }
}

// Implement StorageInput for Box<dyn StorageInput> to allow trait objects
impl StorageInput for Box<dyn StorageInput> {
    fn size(&self) -> Result<u64> {
        self.as_ref().size()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }
}

/// Errors specific to storage backends, converted into [`TesseraError`].
#[derive(Debug, Clone)]
pub enum StorageError {
    FileNotFound(String),
    IoError(String),
    OutputClosed(String),
    ChecksumMismatch(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::FileNotFound(name) => write!(f, "File not found: {name}"),
            StorageError::IoError(msg) => write!(f, "I/O error: {msg}"),
            StorageError::OutputClosed(name) => write!(f, "Output already closed: {name}"),
            StorageError::ChecksumMismatch(name) => write!(f, "Checksum mismatch: {name}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for TesseraError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::FileNotFound(name) => TesseraError::not_found(name),
            other => TesseraError::storage(other.to_string()),
        }
    }
}

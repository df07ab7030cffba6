//! Virtual filesystem abstraction for the SFTP session engine.
//!
//! A backend implements [`Vfs`] (path-scoped operations) and [`VfsFile`]
//! (operations on an open file or directory). Backends register themselves
//! in a process-wide engine registry under a short name and are opened with
//! a backend-specific parameter string.
//!
//! Backends must be reentrant: the session invokes the [`Vfs`] concurrently
//! from its dispatcher and from multiple per-handle workers. A backend that
//! is not internally reentrant must supply its own serialization.

mod error;
pub mod local;
mod readonly;
mod registry;

use std::time::SystemTime;

use async_trait::async_trait;

pub use error::VfsError;
pub use readonly::read_only;
pub use registry::{open_engine, register_engine, VfsFactory};

/// Access mode requested in [`Vfs::open_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}

/// POSIX-style open flags, already decoded from the wire representation.
#[derive(Debug, Clone, Copy)]
pub struct OpenFlags {
    pub access: AccessMode,
    pub append: bool,
    pub create: bool,
    pub truncate: bool,
    pub exclusive: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        OpenFlags {
            access: AccessMode::Read,
            append: false,
            create: false,
            truncate: false,
            exclusive: false,
        }
    }

    /// True when the flags request any form of mutation.
    pub fn wants_write(&self) -> bool {
        self.access != AccessMode::Read
            || self.append
            || self.create
            || self.truncate
            || self.exclusive
    }
}

/// Metadata for one filesystem entry.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    /// Permission bits only; the file-type bits are derived from `is_dir`.
    pub mode: u32,
    pub modified: SystemTime,
    pub is_dir: bool,
}

/// Path-scoped filesystem capabilities.
#[async_trait]
pub trait Vfs: Send + Sync {
    /// Open a file or directory for reading.
    async fn open(&self, path: &str) -> Result<Box<dyn VfsFile>, VfsError>;

    /// Open a file with explicit flags; `mode` applies when creating.
    async fn open_file(
        &self,
        path: &str,
        flags: OpenFlags,
        mode: u32,
    ) -> Result<Box<dyn VfsFile>, VfsError>;

    async fn mkdir(&self, path: &str, mode: u32) -> Result<(), VfsError>;

    /// Remove a file or an empty directory.
    async fn remove(&self, path: &str) -> Result<(), VfsError>;

    async fn rename(&self, from: &str, to: &str) -> Result<(), VfsError>;

    async fn stat(&self, path: &str) -> Result<FileInfo, VfsError>;

    async fn chmod(&self, path: &str, mode: u32) -> Result<(), VfsError>;

    /// Release backend resources. Called once, at session end.
    async fn close(&self) -> Result<(), VfsError>;
}

/// Capabilities of an open file or directory.
///
/// A `VfsFile` is owned by a single per-handle worker, which serializes all
/// calls on it; implementations need not be thread-safe internally.
#[async_trait]
pub trait VfsFile: Send {
    fn name(&self) -> &str;

    async fn stat(&mut self) -> Result<FileInfo, VfsError>;

    /// Read up to `buf.len()` bytes at `offset`. A short count is returned
    /// when fewer bytes are available; `Err(VfsError::Eof)` when none are.
    async fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, VfsError>;

    async fn write_at(&mut self, data: &[u8], offset: u64) -> Result<usize, VfsError>;

    /// Return the next batch of directory entries, at most `n` of them
    /// (non-positive `n` reads the remainder). Returns `Err(VfsError::Eof)`
    /// once the listing is exhausted.
    async fn readdir(&mut self, n: i64) -> Result<Vec<FileInfo>, VfsError>;

    async fn readdir_names(&mut self, n: i64) -> Result<Vec<String>, VfsError>;

    async fn chmod(&mut self, mode: u32) -> Result<(), VfsError>;

    async fn close(&mut self) -> Result<(), VfsError>;
}

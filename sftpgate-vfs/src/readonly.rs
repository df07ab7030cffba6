//! Read-only policy wrapper.
//!
//! Intercepts every mutating call before it reaches the wrapped backend and
//! answers with `PermissionDenied`. Read paths pass through unchanged;
//! files handed out by the wrapper are themselves wrapped so that
//! `write_at`/`chmod` on an open file are refused too.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{FileInfo, OpenFlags, Vfs, VfsError, VfsFile};

/// Wrap a backend so that all mutating operations fail with
/// `PermissionDenied`.
pub fn read_only(inner: Arc<dyn Vfs>) -> Arc<dyn Vfs> {
    Arc::new(ReadOnlyVfs { inner })
}

struct ReadOnlyVfs {
    inner: Arc<dyn Vfs>,
}

#[async_trait]
impl Vfs for ReadOnlyVfs {
    async fn open(&self, path: &str) -> Result<Box<dyn VfsFile>, VfsError> {
        let file = self.inner.open(path).await?;
        Ok(Box::new(ReadOnlyFile { inner: file }))
    }

    async fn open_file(
        &self,
        path: &str,
        flags: OpenFlags,
        mode: u32,
    ) -> Result<Box<dyn VfsFile>, VfsError> {
        if flags.wants_write() {
            return Err(VfsError::PermissionDenied);
        }
        let file = self.inner.open_file(path, flags, mode).await?;
        Ok(Box::new(ReadOnlyFile { inner: file }))
    }

    async fn mkdir(&self, _path: &str, _mode: u32) -> Result<(), VfsError> {
        Err(VfsError::PermissionDenied)
    }

    async fn remove(&self, _path: &str) -> Result<(), VfsError> {
        Err(VfsError::PermissionDenied)
    }

    async fn rename(&self, _from: &str, _to: &str) -> Result<(), VfsError> {
        Err(VfsError::PermissionDenied)
    }

    async fn stat(&self, path: &str) -> Result<FileInfo, VfsError> {
        self.inner.stat(path).await
    }

    async fn chmod(&self, _path: &str, _mode: u32) -> Result<(), VfsError> {
        Err(VfsError::PermissionDenied)
    }

    async fn close(&self) -> Result<(), VfsError> {
        self.inner.close().await
    }
}

struct ReadOnlyFile {
    inner: Box<dyn VfsFile>,
}

#[async_trait]
impl VfsFile for ReadOnlyFile {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn stat(&mut self) -> Result<FileInfo, VfsError> {
        self.inner.stat().await
    }

    async fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, VfsError> {
        self.inner.read_at(buf, offset).await
    }

    async fn write_at(&mut self, _data: &[u8], _offset: u64) -> Result<usize, VfsError> {
        Err(VfsError::PermissionDenied)
    }

    async fn readdir(&mut self, n: i64) -> Result<Vec<FileInfo>, VfsError> {
        self.inner.readdir(n).await
    }

    async fn readdir_names(&mut self, n: i64) -> Result<Vec<String>, VfsError> {
        self.inner.readdir_names(n).await
    }

    async fn chmod(&mut self, _mode: u32) -> Result<(), VfsError> {
        Err(VfsError::PermissionDenied)
    }

    async fn close(&mut self) -> Result<(), VfsError> {
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::AccessMode;

    /// Counts mutating calls that reach it; all operations succeed.
    struct CountingVfs {
        mutations: AtomicUsize,
    }

    struct NullFile;

    #[async_trait]
    impl VfsFile for NullFile {
        fn name(&self) -> &str {
            "null"
        }
        async fn stat(&mut self) -> Result<FileInfo, VfsError> {
            Err(VfsError::Unsupported)
        }
        async fn read_at(&mut self, _buf: &mut [u8], _offset: u64) -> Result<usize, VfsError> {
            Ok(0)
        }
        async fn write_at(&mut self, data: &[u8], _offset: u64) -> Result<usize, VfsError> {
            Ok(data.len())
        }
        async fn readdir(&mut self, _n: i64) -> Result<Vec<FileInfo>, VfsError> {
            Err(VfsError::Eof)
        }
        async fn readdir_names(&mut self, _n: i64) -> Result<Vec<String>, VfsError> {
            Err(VfsError::Eof)
        }
        async fn chmod(&mut self, _mode: u32) -> Result<(), VfsError> {
            Ok(())
        }
        async fn close(&mut self) -> Result<(), VfsError> {
            Ok(())
        }
    }

    #[async_trait]
    impl Vfs for CountingVfs {
        async fn open(&self, _path: &str) -> Result<Box<dyn VfsFile>, VfsError> {
            Ok(Box::new(NullFile))
        }
        async fn open_file(
            &self,
            _path: &str,
            _flags: OpenFlags,
            _mode: u32,
        ) -> Result<Box<dyn VfsFile>, VfsError> {
            self.mutations.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NullFile))
        }
        async fn mkdir(&self, _path: &str, _mode: u32) -> Result<(), VfsError> {
            self.mutations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn remove(&self, _path: &str) -> Result<(), VfsError> {
            self.mutations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn rename(&self, _from: &str, _to: &str) -> Result<(), VfsError> {
            self.mutations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn stat(&self, _path: &str) -> Result<FileInfo, VfsError> {
            Ok(FileInfo {
                name: "x".into(),
                size: 0,
                mode: 0o644,
                modified: std::time::SystemTime::UNIX_EPOCH,
                is_dir: false,
            })
        }
        async fn chmod(&self, _path: &str, _mode: u32) -> Result<(), VfsError> {
            self.mutations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn close(&self) -> Result<(), VfsError> {
            Ok(())
        }
    }

    fn write_flags() -> OpenFlags {
        OpenFlags {
            access: AccessMode::Write,
            append: false,
            create: true,
            truncate: false,
            exclusive: false,
        }
    }

    #[tokio::test]
    async fn mutating_calls_never_reach_the_backend() {
        let inner = Arc::new(CountingVfs {
            mutations: AtomicUsize::new(0),
        });
        let ro = read_only(inner.clone());

        assert!(matches!(
            ro.mkdir("/d", 0o755).await,
            Err(VfsError::PermissionDenied)
        ));
        assert!(matches!(
            ro.remove("/f").await,
            Err(VfsError::PermissionDenied)
        ));
        assert!(matches!(
            ro.rename("/a", "/b").await,
            Err(VfsError::PermissionDenied)
        ));
        assert!(matches!(
            ro.chmod("/f", 0o600).await,
            Err(VfsError::PermissionDenied)
        ));
        assert!(matches!(
            ro.open_file("/f", write_flags(), 0o644).await,
            Err(VfsError::PermissionDenied)
        ));

        assert_eq!(inner.mutations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn read_paths_pass_through() {
        let inner = Arc::new(CountingVfs {
            mutations: AtomicUsize::new(0),
        });
        let ro = read_only(inner.clone());

        assert!(ro.stat("/f").await.is_ok());
        assert!(ro.open("/f").await.is_ok());
        assert!(ro
            .open_file("/f", OpenFlags::read_only(), 0o644)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn open_file_writes_are_refused() {
        let inner = Arc::new(CountingVfs {
            mutations: AtomicUsize::new(0),
        });
        let ro = read_only(inner);

        let mut file = ro.open("/f").await.unwrap();
        assert!(matches!(
            file.write_at(b"x", 0).await,
            Err(VfsError::PermissionDenied)
        ));
        assert!(matches!(
            file.chmod(0o600).await,
            Err(VfsError::PermissionDenied)
        ));
        assert_eq!(file.read_at(&mut [0u8; 4], 0).await.unwrap(), 0);
    }
}

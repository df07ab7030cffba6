//! Local-filesystem backend.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::{register_engine, AccessMode, FileInfo, OpenFlags, Vfs, VfsError, VfsFile};

/// Register this backend in the engine registry as `"local"`.
pub fn register() {
    register_engine("local", |_params| Ok(Arc::new(LocalFs)));
}

pub struct LocalFs;

#[async_trait]
impl Vfs for LocalFs {
    async fn open(&self, path: &str) -> Result<Box<dyn VfsFile>, VfsError> {
        let meta = fs::metadata(path).await?;
        if meta.is_dir() {
            let entries = fs::read_dir(path).await?;
            Ok(Box::new(LocalDir {
                name: base_name(path),
                path: PathBuf::from(path),
                entries,
            }))
        } else {
            let file = fs::File::open(path).await?;
            Ok(Box::new(LocalFile {
                name: base_name(path),
                file,
            }))
        }
    }

    async fn open_file(
        &self,
        path: &str,
        flags: OpenFlags,
        mode: u32,
    ) -> Result<Box<dyn VfsFile>, VfsError> {
        let mut options = fs::OpenOptions::new();
        match flags.access {
            AccessMode::Read => options.read(true),
            AccessMode::Write => options.write(true),
            AccessMode::ReadWrite => options.read(true).write(true),
        };
        if flags.append {
            options.append(true);
        }
        if flags.exclusive {
            options.create_new(true);
        } else if flags.create {
            options.create(true);
        }
        if flags.truncate {
            options.truncate(true);
        }
        #[cfg(unix)]
        options.mode(mode);
        #[cfg(not(unix))]
        let _ = mode;

        let file = options.open(path).await?;
        Ok(Box::new(LocalFile {
            name: base_name(path),
            file,
        }))
    }

    async fn mkdir(&self, path: &str, mode: u32) -> Result<(), VfsError> {
        let mut builder = fs::DirBuilder::new();
        #[cfg(unix)]
        builder.mode(mode);
        #[cfg(not(unix))]
        let _ = mode;
        builder.create(path).await?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), VfsError> {
        let meta = fs::metadata(path).await?;
        if meta.is_dir() {
            fs::remove_dir(path).await?;
        } else {
            fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), VfsError> {
        fs::rename(from, to).await?;
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<FileInfo, VfsError> {
        let meta = fs::metadata(path).await?;
        Ok(file_info(base_name(path), &meta))
    }

    async fn chmod(&self, path: &str, mode: u32) -> Result<(), VfsError> {
        chmod_path(Path::new(path), mode).await
    }

    async fn close(&self) -> Result<(), VfsError> {
        Ok(())
    }
}

struct LocalFile {
    name: String,
    file: fs::File,
}

#[async_trait]
impl VfsFile for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stat(&mut self) -> Result<FileInfo, VfsError> {
        let meta = self.file.metadata().await?;
        Ok(file_info(self.name.clone(), &meta))
    }

    async fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, VfsError> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        let mut total = 0;
        while total < buf.len() {
            let n = self.file.read(&mut buf[total..]).await?;
            if n == 0 {
                break;
            }
            total += n;
        }
        if total == 0 && !buf.is_empty() {
            return Err(VfsError::Eof);
        }
        Ok(total)
    }

    async fn write_at(&mut self, data: &[u8], offset: u64) -> Result<usize, VfsError> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.write_all(data).await?;
        Ok(data.len())
    }

    async fn readdir(&mut self, _n: i64) -> Result<Vec<FileInfo>, VfsError> {
        Err(VfsError::Other("not a directory".into()))
    }

    async fn readdir_names(&mut self, _n: i64) -> Result<Vec<String>, VfsError> {
        Err(VfsError::Other("not a directory".into()))
    }

    async fn chmod(&mut self, mode: u32) -> Result<(), VfsError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            self.file
                .set_permissions(std::fs::Permissions::from_mode(mode))
                .await?;
            Ok(())
        }
        #[cfg(not(unix))]
        {
            let _ = mode;
            Err(VfsError::Unsupported)
        }
    }

    async fn close(&mut self) -> Result<(), VfsError> {
        self.file.flush().await?;
        Ok(())
    }
}

struct LocalDir {
    name: String,
    path: PathBuf,
    entries: fs::ReadDir,
}

#[async_trait]
impl VfsFile for LocalDir {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stat(&mut self) -> Result<FileInfo, VfsError> {
        let meta = fs::metadata(&self.path).await?;
        Ok(file_info(self.name.clone(), &meta))
    }

    async fn read_at(&mut self, _buf: &mut [u8], _offset: u64) -> Result<usize, VfsError> {
        Err(VfsError::Other("is a directory".into()))
    }

    async fn write_at(&mut self, _data: &[u8], _offset: u64) -> Result<usize, VfsError> {
        Err(VfsError::Other("is a directory".into()))
    }

    async fn readdir(&mut self, n: i64) -> Result<Vec<FileInfo>, VfsError> {
        let limit = if n <= 0 { usize::MAX } else { n as usize };
        let mut batch = Vec::new();
        while batch.len() < limit {
            match self.entries.next_entry().await? {
                Some(entry) => {
                    let meta = entry.metadata().await?;
                    let name = entry.file_name().to_string_lossy().into_owned();
                    batch.push(file_info(name, &meta));
                }
                None => break,
            }
        }
        if batch.is_empty() && n > 0 {
            return Err(VfsError::Eof);
        }
        Ok(batch)
    }

    async fn readdir_names(&mut self, n: i64) -> Result<Vec<String>, VfsError> {
        Ok(self
            .readdir(n)
            .await?
            .into_iter()
            .map(|info| info.name)
            .collect())
    }

    async fn chmod(&mut self, mode: u32) -> Result<(), VfsError> {
        chmod_path(&self.path, mode).await
    }

    async fn close(&mut self) -> Result<(), VfsError> {
        Ok(())
    }
}

fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_owned())
}

fn file_info(name: String, meta: &std::fs::Metadata) -> FileInfo {
    FileInfo {
        name,
        size: meta.len(),
        mode: mode_bits(meta),
        modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        is_dir: meta.is_dir(),
    }
}

#[cfg(unix)]
fn mode_bits(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn mode_bits(meta: &std::fs::Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o555
    } else {
        0o755
    }
}

async fn chmod_path(path: &Path, mode: u32) -> Result<(), VfsError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
        Ok(())
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
        Err(VfsError::Unsupported)
    }
}

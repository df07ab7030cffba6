use std::io;

/// Error kinds a backend can surface to the session.
///
/// The session maps these to SFTP status codes by kind, never by message
/// content, so backends must pick the matching variant rather than encode
/// the condition in `Other`.
#[derive(Debug, thiserror::Error)]
pub enum VfsError {
    #[error("end of file")]
    Eof,
    #[error("file does not exist")]
    NotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("unsupported operation")]
    Unsupported,
    #[error(transparent)]
    Io(io::Error),
    #[error("{0}")]
    Other(String),
}

impl From<io::Error> for VfsError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => VfsError::NotFound,
            io::ErrorKind::PermissionDenied => VfsError::PermissionDenied,
            io::ErrorKind::UnexpectedEof => VfsError::Eof,
            _ => VfsError::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kinds_map_to_variants() {
        assert!(matches!(
            VfsError::from(io::Error::new(io::ErrorKind::NotFound, "x")),
            VfsError::NotFound
        ));
        assert!(matches!(
            VfsError::from(io::Error::new(io::ErrorKind::PermissionDenied, "x")),
            VfsError::PermissionDenied
        ));
        assert!(matches!(
            VfsError::from(io::Error::new(io::ErrorKind::Other, "x")),
            VfsError::Io(_)
        ));
    }
}

//! Error types for the VFS layer.

use std::fmt;

/// Filesystem operation that produced an error, rendered POSIX-style.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VfsOp {
    /// Read a file
    Open,
    /// Write a file
    Write,
    /// Create a directory
    Mkdir,
    /// Remove a directory
    Rmdir,
    /// Remove a file
    Unlink,
    /// List a directory
    Scandir,
    /// Read metadata
    Stat,
}

impl fmt::Display for VfsOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VfsOp::Open => "open",
            VfsOp::Write => "write",
            VfsOp::Mkdir => "mkdir",
            VfsOp::Rmdir => "rmdir",
            VfsOp::Unlink => "unlink",
            VfsOp::Scandir => "scandir",
            VfsOp::Stat => "stat",
        };
        f.write_str(name)
    }
}

/// Errors from VFS operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum VfsError {
    /// Path not found
    #[error("ENOENT: no such file or directory, {op} '{path}'")]
    NotFound { op: VfsOp, path: String },

    /// Expected a file, found a directory
    #[error("EISDIR: illegal operation on a directory, {op} '{path}'")]
    IsADirectory { op: VfsOp, path: String },

    /// Expected a directory, found a file
    #[error("ENOTDIR: not a directory, {op} '{path}'")]
    NotADirectory { op: VfsOp, path: String },

    /// Path already exists
    #[error("EEXIST: file already exists, {op} '{path}'")]
    AlreadyExists { op: VfsOp, path: String },

    /// Directory not empty
    #[error("ENOTEMPTY: directory not empty, {op} '{path}'")]
    NotEmpty { op: VfsOp, path: String },

    /// Operation refused (removing the root)
    #[error("EPERM: operation not permitted, {op} '{path}'")]
    PermissionDenied { op: VfsOp, path: String },

    /// Storage backend error
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl VfsError {
    pub(crate) fn not_found(op: VfsOp, path: &str) -> Self {
        Self::NotFound {
            op,
            path: path.to_string(),
        }
    }

    pub(crate) fn is_a_directory(op: VfsOp, path: &str) -> Self {
        Self::IsADirectory {
            op,
            path: path.to_string(),
        }
    }

    pub(crate) fn not_a_directory(op: VfsOp, path: &str) -> Self {
        Self::NotADirectory {
            op,
            path: path.to_string(),
        }
    }

    pub(crate) fn already_exists(op: VfsOp, path: &str) -> Self {
        Self::AlreadyExists {
            op,
            path: path.to_string(),
        }
    }

    /// POSIX errno name for this error, if it has one.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::NotFound { .. } => Some("ENOENT"),
            Self::IsADirectory { .. } => Some("EISDIR"),
            Self::NotADirectory { .. } => Some("ENOTDIR"),
            Self::AlreadyExists { .. } => Some("EEXIST"),
            Self::NotEmpty { .. } => Some("ENOTEMPTY"),
            Self::PermissionDenied { .. } => Some("EPERM"),
            Self::Store(_) => None,
        }
    }

    /// True for `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias for VFS operations
pub type VfsResult<T> = Result<T, VfsError>;

/// Errors from entry store backends.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Backing file could not be read or written
    #[error("io error: {0}")]
    Io(String),

    /// Stored data could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The store has been closed
    #[error("store is closed")]
    Closed,
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VfsError::not_found(VfsOp::Open, "/missing.txt");
        assert_eq!(
            err.to_string(),
            "ENOENT: no such file or directory, open '/missing.txt'"
        );
        assert_eq!(err.code(), Some("ENOENT"));

        let err = VfsError::NotEmpty {
            op: VfsOp::Rmdir,
            path: "/d".into(),
        };
        assert_eq!(err.to_string(), "ENOTEMPTY: directory not empty, rmdir '/d'");
    }

    #[test]
    fn test_store_error_conversion() {
        let vfs_err: VfsError = StoreError::Closed.into();
        assert!(matches!(vfs_err, VfsError::Store(StoreError::Closed)));
        assert_eq!(vfs_err.code(), None);
    }
}

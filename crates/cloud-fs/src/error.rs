use std::io;
use thiserror::Error;

/// Errors returned by the filesystem core and its node operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The path is absent from the namespace.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation is not supported on this handle or entry.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A file operation was attempted on a directory.
    #[error("is a directory: {0}")]
    IsDirectory(String),

    /// A directory operation was attempted on a file.
    #[error("not a directory: {0}")]
    NotDirectory(String),

    /// A write would grow a file past the size limit.
    #[error("file too large: {0}")]
    FileTooLarge(String),

    /// Extended attributes are not supported.
    #[error("extended attributes not supported")]
    NoXattr,

    /// The remote provider failed.
    #[error(transparent)]
    Remote(#[from] cloud_remote::Error),

    /// Invalid or unreadable configuration.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Map the error onto the errno reported to the kernel.
    #[cfg(feature = "fuse")]
    pub fn errno(&self) -> i32 {
        use cloud_remote::Error as RemoteError;

        match self {
            Error::NotFound(_) => libc::ENOENT,
            Error::Unsupported(_) => libc::ENOTSUP,
            Error::IsDirectory(_) => libc::EISDIR,
            Error::NotDirectory(_) => libc::ENOTDIR,
            Error::FileTooLarge(_) => libc::EFBIG,
            Error::NoXattr => libc::ENODATA,
            Error::Remote(RemoteError::Authentication(_)) => libc::EACCES,
            Error::Remote(RemoteError::NotFound(_)) => libc::ENOENT,
            Error::Remote(_) => libc::EIO,
            Error::Config(_) => libc::EINVAL,
            Error::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

/// Result type for cloud-fs operations.
pub type Result<T> = std::result::Result<T, Error>;

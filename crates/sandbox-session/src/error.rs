//! Validation errors raised by the session subsystem (SPEC_FULL.md §7).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session id must be a UUID v4 with no path separators")]
    InvalidSessionId,

    #[error("path escapes the session workspace")]
    PathEscape,

    #[error("relative path must not be absolute")]
    AbsolutePath,

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("file already exists and overwrite was not requested: {0}")]
    AlreadyExists(String),

    #[error("directory deletion requires recursive=true: {0}")]
    NotRecursive(String),

    #[error("path refers to a reserved host-managed file: {0}")]
    ReservedPath(String),

    #[error("session workspace I/O error: {0}")]
    Io(#[from] std::io::Error),
}

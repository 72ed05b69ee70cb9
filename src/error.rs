use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(
        "Source path not found: {path}\nMake sure the path exists and you have read permissions."
    )]
    SourceNotFound { path: PathBuf },

    #[error("Destination path not found: {path}\nCreate the directory before syncing.")]
    DestinationNotFound { path: PathBuf },

    #[error("Not a directory: {path}\nBoth sides of a two-way sync must be directories.")]
    NotADirectory { path: PathBuf },

    #[error("Source and destination resolve to the same directory: {path}")]
    SamePath { path: PathBuf },

    #[error("Source and destination overlap: {source_dir} and {dest_dir}\nOne directory must not live inside the other.")]
    NestedPaths { source_dir: PathBuf, dest_dir: PathBuf },

    #[error("Sync engine '{engine}' is not available: {reason}\nInstall it or point --rsync-path at the binary.")]
    EngineUnavailable { engine: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read directory: {path}\nCause: {source}\nCheck that the directory exists and you have read permissions.")]
    ReadDirError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to copy file: {path}\nCause: {source}\nCheck disk space and write permissions on the destination.")]
    CopyError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to remove: {path}\nCause: {source}")]
    RemoveError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to open session log: {path}\nCause: {source}\nCheck that the log directory is writable.")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid exclude pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

impl SyncError {
    /// Fatal before any sync attempt; never worth retrying.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SyncError::SourceNotFound { .. }
                | SyncError::DestinationNotFound { .. }
                | SyncError::NotADirectory { .. }
                | SyncError::SamePath { .. }
                | SyncError::NestedPaths { .. }
                | SyncError::EngineUnavailable { .. }
                | SyncError::LogFile { .. }
                | SyncError::InvalidPattern { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

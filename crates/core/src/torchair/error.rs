//! Error types for torchair cache operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the on-disk torchair cache.
#[derive(Error, Debug)]
pub enum TorchairCacheError {
    /// Filesystem operation failed.
    #[error("cache io error at {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A kv-cache-bytes file held something other than a decimal integer.
    #[error("invalid kv cache bytes in {}: {:?}", .path.display(), .content)]
    Parse { path: PathBuf, content: String },
}

pub type Result<T> = std::result::Result<T, TorchairCacheError>;

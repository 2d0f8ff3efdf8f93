//! Torchair cache-directory management.
//!
//! - [`TorchairCache`] - per-deployment cache root with the per-rank
//!   kv-cache-bytes files used for warm restarts

mod cache;
mod error;

pub use cache::{
    TorchairCache, KV_CACHE_BYTES_DIR_NAME, KV_CACHE_BYTES_FILE_NAME, TORCHAIR_CACHE_DIR_NAME,
    TORCHAIR_CACHE_HOME_ENV,
};
pub use error::{Result, TorchairCacheError};

//! On-disk cache shared between the processes of one node.
//!
//! The torchair graph compiler keeps its artifacts under a per-deployment
//! cache root. Next to those artifacts this module stores one small file per
//! rank holding the usable kv-cache byte count, so a warm restart can skip
//! memory profiling and size its kv cache from the previous run:
//!
//! ```text
//! {root}/                         torchair graph artifacts
//! {root}/.kv_cache_bytes/
//! {root}/.kv_cache_bytes/{rank}_kv_cache_bytes
//! ```
//!
//! Each rank writes only its own file and any process may read any file, so
//! advisory file locks (exclusive for write, shared for read) are enough to
//! keep readers from observing a half-written value. There is no cross-rank
//! barrier here; callers sequence writes before reads with their own
//! collective synchronization.

use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;

use super::error::{Result, TorchairCacheError};

/// Environment variable overriding the cache root.
pub const TORCHAIR_CACHE_HOME_ENV: &str = "TORCHAIR_CACHE_HOME";

/// Default cache directory name under the working directory.
pub const TORCHAIR_CACHE_DIR_NAME: &str = ".torchair_cache";

/// Subdirectory holding the per-rank kv-cache-bytes files.
pub const KV_CACHE_BYTES_DIR_NAME: &str = ".kv_cache_bytes";

/// Per-rank file name suffix; the full name is `{rank}_kv_cache_bytes`.
pub const KV_CACHE_BYTES_FILE_NAME: &str = "kv_cache_bytes";

/// Handle to one torchair cache root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorchairCache {
    root: PathBuf,
}

impl TorchairCache {
    /// Cache rooted at `TORCHAIR_CACHE_HOME`, or `.torchair_cache` under the
    /// working directory when the variable is unset.
    pub fn from_env() -> Self {
        let root = env::var_os(TORCHAIR_CACHE_HOME_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                env::current_dir()
                    .map(|cwd| cwd.join(TORCHAIR_CACHE_DIR_NAME))
                    .unwrap_or_else(|_| PathBuf::from(TORCHAIR_CACHE_DIR_NAME))
            });
        Self { root }
    }

    /// Cache rooted at an explicit directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kv_cache_bytes_dir(&self) -> PathBuf {
        self.root.join(KV_CACHE_BYTES_DIR_NAME)
    }

    fn kv_cache_bytes_file(&self, rank: usize) -> PathBuf {
        self.kv_cache_bytes_dir()
            .join(format!("{rank}_{KV_CACHE_BYTES_FILE_NAME}"))
    }

    /// Records `kv_cache_bytes` for `rank`, replacing any previous value.
    pub fn write_kv_cache_bytes(&self, rank: usize, kv_cache_bytes: i64) -> Result<()> {
        let dir = self.kv_cache_bytes_dir();
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

        let path = self.kv_cache_bytes_file(rank);
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        // Advisory lock; released when the handle drops.
        FileExt::lock_exclusive(&file).map_err(|e| io_err(&path, e))?;
        write!(file, "{kv_cache_bytes}").map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    /// Reads the recorded kv-cache byte count for `rank`.
    pub fn read_kv_cache_bytes(&self, rank: usize) -> Result<i64> {
        let path = self.kv_cache_bytes_file(rank);
        let file = File::open(&path).map_err(|e| io_err(&path, e))?;
        FileExt::lock_shared(&file).map_err(|e| io_err(&path, e))?;

        let mut line = String::new();
        BufReader::new(&file)
            .read_line(&mut line)
            .map_err(|e| io_err(&path, e))?;
        line.trim().parse().map_err(|_| TorchairCacheError::Parse {
            path,
            content: line.trim().to_string(),
        })
    }

    /// Whether the cache root exists and holds at least one entry.
    pub fn cache_dir_exists(&self) -> bool {
        dir_non_empty(&self.root)
    }

    /// Whether the kv-cache-bytes subdirectory exists and holds at least one
    /// entry.
    pub fn kv_cache_bytes_cache_exists(&self) -> bool {
        dir_non_empty(&self.kv_cache_bytes_dir())
    }

    /// Removes the whole cache root. Missing roots are not an error.
    pub fn delete_cache_dir(&self) -> Result<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&self.root, e)),
        }
    }
}

fn dir_non_empty(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

fn io_err(path: &Path, source: io::Error) -> TorchairCacheError {
    TorchairCacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

//! Runtime context and configuration for model-parallel topology setup.
//!
//! The topology layer never talks to a rendezvous service directly. It reads
//! everything it needs about the launched world from a [`DistributedRuntime`]
//! and the local device inventory from a [`DeviceQuery`], so tests can swap in
//! static fakes and production can bind the real runtime.

use std::env;

use serde::Deserialize;

use super::error::{DistributedError, Result};

/// Default collective backend when the environment does not name one.
pub const DEFAULT_BACKEND: &str = "hccl";

// ─── Parallel configuration ───

/// Degrees of parallelism requested for the model-parallel topology.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ParallelConfig {
    /// Number of data-parallel replicas.
    pub data_parallel_size: usize,
    /// Tensor-parallel degree within each replica.
    pub tensor_parallel_size: usize,
    /// Whether to also build the node-local MLP TP group.
    #[serde(default)]
    pub enable_node_mlp: bool,
    /// Collective backend override; falls back to the runtime's backend.
    #[serde(default)]
    pub backend: Option<String>,
}

impl ParallelConfig {
    /// Creates a config with the given data-parallel and tensor-parallel sizes.
    pub fn new(data_parallel_size: usize, tensor_parallel_size: usize) -> Self {
        assert!(data_parallel_size > 0, "data_parallel_size must be > 0");
        assert!(tensor_parallel_size > 0, "tensor_parallel_size must be > 0");
        Self {
            data_parallel_size,
            tensor_parallel_size,
            enable_node_mlp: false,
            backend: None,
        }
    }

    /// Single-device config: one replica, no tensor parallelism.
    pub fn no_parallelism() -> Self {
        Self::new(1, 1)
    }

    /// Pure tensor-parallel config with a single replica.
    pub fn tensor_parallel(size: usize) -> Self {
        Self::new(1, size)
    }

    /// Enables the node-local MLP tensor-parallel group.
    pub fn with_node_mlp(mut self) -> Self {
        self.enable_node_mlp = true;
        self
    }

    /// Overrides the collective backend for all groups built from this config.
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    /// Ranks per MC2 group: `data_parallel_size * tensor_parallel_size`.
    pub fn group_size(&self) -> usize {
        self.data_parallel_size * self.tensor_parallel_size
    }
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self::no_parallelism()
    }
}

// ─── World context ───

/// Identity of this process within the launched distributed world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldContext {
    /// Total number of processes in the world.
    pub world_size: usize,
    /// Global rank of this process, in `0..world_size`.
    pub rank: usize,
    /// Device index of this process on its node.
    pub local_rank: usize,
    /// Collective backend the runtime was brought up with.
    pub backend: String,
}

impl WorldContext {
    pub fn new(world_size: usize, rank: usize, local_rank: usize) -> Self {
        assert!(world_size > 0, "world_size must be > 0");
        assert!(
            rank < world_size,
            "rank {rank} out of range for world_size {world_size}"
        );
        Self {
            world_size,
            rank,
            local_rank,
            backend: DEFAULT_BACKEND.to_string(),
        }
    }

    /// Context for a single process running without a launcher.
    pub fn single_process() -> Self {
        Self::new(1, 0, 0)
    }

    /// Reads `WORLD_SIZE`, `RANK` and `LOCAL_RANK` from the environment.
    ///
    /// Missing variables default to a single-process world so the library
    /// stays usable outside a launcher.
    pub fn from_env() -> Self {
        let world_size = env::var("WORLD_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        let rank = env::var("RANK")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let local_rank = env::var("LOCAL_RANK")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Self::new(world_size, rank, local_rank)
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }
}

// ─── Runtime binding ───

/// Handle to the external distributed runtime that performed rendezvous.
///
/// Group construction refuses to run until [`is_initialized`] reports true,
/// mirroring the requirement that the launcher brings the world up before
/// any topology is carved out of it.
///
/// [`is_initialized`]: DistributedRuntime::is_initialized
pub trait DistributedRuntime: Send + Sync {
    /// Whether the runtime has completed rendezvous.
    fn is_initialized(&self) -> bool;

    /// World identity of the calling process.
    fn world(&self) -> Result<WorldContext>;
}

/// Runtime backed by a fixed [`WorldContext`], or nothing at all.
///
/// Production wiring constructs this from the launcher environment; tests
/// construct it directly with whatever world they want to simulate.
pub struct StaticRuntime {
    world: Option<WorldContext>,
}

impl StaticRuntime {
    pub fn new(world: WorldContext) -> Self {
        Self { world: Some(world) }
    }

    /// A runtime that has not completed rendezvous.
    pub fn uninitialized() -> Self {
        Self { world: None }
    }

    /// Binds the world described by the launcher environment variables.
    pub fn from_env() -> Self {
        Self::new(WorldContext::from_env())
    }
}

impl DistributedRuntime for StaticRuntime {
    fn is_initialized(&self) -> bool {
        self.world.is_some()
    }

    fn world(&self) -> Result<WorldContext> {
        self.world
            .clone()
            .ok_or(DistributedError::RuntimeNotInitialized)
    }
}

// ─── Device inventory ───

/// Source of the per-node accelerator count.
pub trait DeviceQuery: Send + Sync {
    /// Number of devices visible to this process on its node.
    fn local_device_count(&self) -> usize;
}

/// Fixed device count, for tests and explicit wiring.
#[derive(Debug, Clone, Copy)]
pub struct FixedDeviceCount(pub usize);

impl DeviceQuery for FixedDeviceCount {
    fn local_device_count(&self) -> usize {
        self.0
    }
}

/// Device count derived from `ASCEND_RT_VISIBLE_DEVICES`.
///
/// The variable holds a comma-separated device list; its entry count is the
/// visible device count. When unset, `fallback` is used.
#[derive(Debug, Clone)]
pub struct EnvDeviceCount {
    pub fallback: usize,
}

impl EnvDeviceCount {
    pub fn new(fallback: usize) -> Self {
        Self { fallback }
    }
}

impl DeviceQuery for EnvDeviceCount {
    fn local_device_count(&self) -> usize {
        match env::var("ASCEND_RT_VISIBLE_DEVICES") {
            Ok(list) => {
                let count = list.split(',').filter(|s| !s.trim().is_empty()).count();
                if count == 0 {
                    self.fallback
                } else {
                    count
                }
            }
            Err(_) => self.fallback,
        }
    }
}

//! Model-parallel topology management for Ascend NPU inference.
//!
//! This module builds and owns the communication groups that the fused
//! MC2 ops and the node-local MLP sharding run over:
//! - [`AscendParallelState`] - lifecycle of the MC2 and MLP TP groups
//! - [`GroupCoordinator`] / [`GroupFactory`] - collective transport seam
//! - [`GroupPartition`] - disjoint rank partitioning
//! - [`DistributedRuntime`] / [`DeviceQuery`] - bindings to the launched world
//!
//! # Architecture
//!
//! Every process derives the same rank partition from the parallel config,
//! then joins the one group containing its own rank. Construction goes
//! through a [`GroupFactory`] so tests can run the full lifecycle in a single
//! process with [`MockGroupFactory`].
//!
//! # Usage
//!
//! ```ignore
//! use vllm_ascend_core::distributed::{
//!     AscendParallelState, ParallelConfig, StaticRuntime,
//! };
//!
//! let mut state = AscendParallelState::new(runtime, devices, factory, tp_group);
//! state.initialize(&ParallelConfig::new(2, 4).with_node_mlp())?;
//! let gathered = state.mlp_tp_all_gather(&hidden, -1)?;
//! ```

mod coordinator;
mod error;
mod parallel_state;
mod partition;
mod process_group;

pub use coordinator::{
    GroupCoordinator, GroupFactory, GroupOptions, MockCoordinator, MockFactoryCall,
    MockGroupFactory,
};
pub use error::{DistributedError, Result};
pub use parallel_state::{AscendParallelState, MC2_GROUP_NAME, MLP_TP_GROUP_NAME};
pub use partition::{calculate_effective_local_size, GroupPartition};
pub use process_group::{
    DeviceQuery, DistributedRuntime, EnvDeviceCount, FixedDeviceCount, ParallelConfig,
    StaticRuntime, WorldContext, DEFAULT_BACKEND,
};

//! Lifecycle of the Ascend model-parallel groups.
//!
//! Two groups are managed here. The MC2 group spans `data_parallel_size *
//! tensor_parallel_size` consecutive ranks and backs the fused
//! communication-computation ops. The optional node-local MLP TP group
//! re-partitions the same world by node so MLP layers can shard across every
//! device of a node regardless of the attention TP degree.
//!
//! [`AscendParallelState`] owns both groups and all the bindings they are
//! built from, so the whole lifecycle is testable in one process with mock
//! factories.

use std::fmt;
use std::sync::Arc;

use candle_core::Tensor;
use tracing::info;

use super::coordinator::{GroupCoordinator, GroupFactory, GroupOptions};
use super::error::{DistributedError, Result};
use super::partition::{calculate_effective_local_size, GroupPartition};
use super::process_group::{DeviceQuery, DistributedRuntime, ParallelConfig};

/// Name registered for the MC2 group.
pub const MC2_GROUP_NAME: &str = "mc2";

/// Name registered for the node-local MLP TP group.
pub const MLP_TP_GROUP_NAME: &str = "world_local";

/// Which groups are currently live.
///
/// The MLP TP slot can only be occupied while the MC2 group exists, so a
/// standalone MLP group is unrepresentable.
enum ModelParallelState {
    Uninitialized,
    Ready {
        mc2: Box<dyn GroupCoordinator>,
        mlp_tp: Option<Box<dyn GroupCoordinator>>,
        node_mlp_enabled: bool,
    },
}

/// Owner of the Ascend model-parallel topology for one process.
pub struct AscendParallelState {
    runtime: Arc<dyn DistributedRuntime>,
    devices: Arc<dyn DeviceQuery>,
    factory: Arc<dyn GroupFactory>,
    /// Externally owned standard TP group, used by the `mlp_*` wrappers when
    /// the node-local group is not enabled. Never destroyed here.
    tp_group: Arc<dyn GroupCoordinator>,
    state: ModelParallelState,
}

impl AscendParallelState {
    pub fn new(
        runtime: Arc<dyn DistributedRuntime>,
        devices: Arc<dyn DeviceQuery>,
        factory: Arc<dyn GroupFactory>,
        tp_group: Arc<dyn GroupCoordinator>,
    ) -> Self {
        Self {
            runtime,
            devices,
            factory,
            tp_group,
            state: ModelParallelState::Uninitialized,
        }
    }

    /// Builds the MC2 group and, when requested, the node-local MLP TP group.
    ///
    /// The world is split into consecutive blocks of `data_parallel_size *
    /// tensor_parallel_size` ranks, one MC2 group per block. A second call
    /// while both groups are live is a no-op; a second call while only the
    /// MC2 group is live is an error.
    pub fn initialize(&mut self, config: &ParallelConfig) -> Result<()> {
        match &self.state {
            ModelParallelState::Ready {
                mlp_tp: Some(_), ..
            } => return Ok(()),
            ModelParallelState::Ready { .. } => {
                return Err(DistributedError::AlreadyInitialized)
            }
            ModelParallelState::Uninitialized => {}
        }
        if !self.runtime.is_initialized() {
            return Err(DistributedError::RuntimeNotInitialized);
        }
        let world = self.runtime.world()?;
        let backend = config
            .backend
            .clone()
            .unwrap_or_else(|| world.backend.clone());

        let partition = GroupPartition::contiguous(world.world_size, config.group_size())?;
        let mc2 = self.factory.init_group(
            &partition,
            world.local_rank,
            &backend,
            &GroupOptions::named(MC2_GROUP_NAME),
        )?;
        self.state = ModelParallelState::Ready {
            mc2,
            mlp_tp: None,
            node_mlp_enabled: false,
        };

        if config.enable_node_mlp {
            // A failure here leaves the MC2 group live with no MLP group;
            // destroy() recovers from that state.
            self.initialize_mlp_tp_group(Some(backend.as_str()))?;
            if let ModelParallelState::Ready {
                node_mlp_enabled, ..
            } = &mut self.state
            {
                *node_mlp_enabled = true;
            }
            info!(
                rank = world.rank,
                world_size = world.world_size,
                mlp_tp_rank = self.mlp_tp_rank(),
                "rank assigned as MLP TP rank"
            );
        }
        Ok(())
    }

    /// Builds the node-local MLP TP group next to an existing MC2 group.
    ///
    /// Group size is the node's device count capped at the world size; the
    /// world is split into consecutive blocks of that size. The group routes
    /// CPU metadata through a message-queue broadcaster.
    pub fn initialize_mlp_tp_group(&mut self, backend: Option<&str>) -> Result<()> {
        if !self.runtime.is_initialized() {
            return Err(DistributedError::RuntimeNotInitialized);
        }
        let world = self.runtime.world()?;
        match &self.state {
            ModelParallelState::Uninitialized => return Err(DistributedError::NotInitialized),
            ModelParallelState::Ready {
                mlp_tp: Some(_), ..
            } => return Err(DistributedError::MlpGroupAlreadyInitialized),
            ModelParallelState::Ready { .. } => {}
        }
        let backend = backend
            .map(str::to_string)
            .unwrap_or_else(|| world.backend.clone());

        let local_size =
            calculate_effective_local_size(self.devices.local_device_count(), world.world_size)?;
        let partition = GroupPartition::contiguous(world.world_size, local_size)?;
        let options = GroupOptions::named(MLP_TP_GROUP_NAME).with_message_queue_broadcaster();
        let mlp_tp = self
            .factory
            .init_group(&partition, world.local_rank, &backend, &options)?;

        if let ModelParallelState::Ready { mlp_tp: slot, .. } = &mut self.state {
            *slot = Some(mlp_tp);
        }
        Ok(())
    }

    /// Tears down both groups and returns to the uninitialized state.
    /// Idempotent.
    pub fn destroy(&mut self) {
        let prev = std::mem::replace(&mut self.state, ModelParallelState::Uninitialized);
        if let ModelParallelState::Ready { mut mc2, mlp_tp, .. } = prev {
            mc2.destroy();
            if let Some(mut mlp) = mlp_tp {
                mlp.destroy();
            }
        }
    }

    /// Whether the full topology is up.
    ///
    /// True only when both the MC2 group and the MLP TP group are live; a
    /// topology initialized without `enable_node_mlp` reports false even
    /// though its MC2 group is usable.
    pub fn is_initialized(&self) -> bool {
        matches!(
            self.state,
            ModelParallelState::Ready {
                mlp_tp: Some(_),
                ..
            }
        )
    }

    /// Whether `initialize` was asked to route MLP collectives through the
    /// node-local group.
    pub fn is_node_mlp_enabled(&self) -> bool {
        matches!(
            self.state,
            ModelParallelState::Ready {
                node_mlp_enabled: true,
                ..
            }
        )
    }

    /// The MC2 group.
    ///
    /// # Panics
    ///
    /// Panics if [`initialize`](Self::initialize) has not run.
    pub fn mc2_group(&self) -> &dyn GroupCoordinator {
        match &self.state {
            ModelParallelState::Ready { mc2, .. } => mc2.as_ref(),
            ModelParallelState::Uninitialized => panic!("mc2 group is not initialized"),
        }
    }

    /// The node-local MLP TP group.
    ///
    /// # Panics
    ///
    /// Panics if the group has not been initialized.
    pub fn mlp_tp_group(&self) -> &dyn GroupCoordinator {
        match &self.state {
            ModelParallelState::Ready {
                mlp_tp: Some(mlp), ..
            } => mlp.as_ref(),
            _ => panic!("MLP TP group is not initialized"),
        }
    }

    /// The group MLP collectives actually run over: the node-local group when
    /// enabled, the standard TP group otherwise.
    pub fn mlp_world_group(&self) -> &dyn GroupCoordinator {
        if self.is_node_mlp_enabled() {
            self.mlp_tp_group()
        } else {
            self.tp_group.as_ref()
        }
    }

    /// This process's rank within the effective MLP group.
    pub fn mlp_tp_rank(&self) -> usize {
        self.mlp_world_group().rank_in_group()
    }

    /// Size of the effective MLP group.
    pub fn mlp_tp_world_size(&self) -> usize {
        self.mlp_world_group().world_size()
    }

    /// All-gather across the effective MLP group.
    ///
    /// `dim` may be negative to count from the last dimension, so `-1`
    /// gathers along the hidden dimension.
    pub fn mlp_tp_all_gather(&self, input: &Tensor, dim: isize) -> Result<Tensor> {
        let dim = resolve_dim(input.rank(), dim)?;
        self.mlp_world_group().all_gather(input, dim)
    }

    /// All-reduce across the effective MLP group.
    pub fn mlp_tp_all_reduce(&self, input: &Tensor) -> Result<Tensor> {
        self.mlp_world_group().all_reduce(input)
    }

    /// Reduce-scatter over the leading dimension across the effective MLP
    /// group.
    pub fn mlp_tp_reduce_scatter(&self, input: &Tensor) -> Result<Tensor> {
        self.mlp_world_group().reduce_scatter(input, 0)
    }
}

impl Drop for AscendParallelState {
    fn drop(&mut self) {
        // Best effort cleanup - destroy() is safe to call twice
        self.destroy();
    }
}

impl fmt::Debug for AscendParallelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (state, node_mlp_enabled) = match &self.state {
            ModelParallelState::Uninitialized => ("uninitialized", false),
            ModelParallelState::Ready {
                mlp_tp,
                node_mlp_enabled,
                ..
            } => (
                if mlp_tp.is_some() {
                    "ready(mc2+mlp_tp)"
                } else {
                    "ready(mc2)"
                },
                *node_mlp_enabled,
            ),
        };
        f.debug_struct("AscendParallelState")
            .field("state", &state)
            .field("node_mlp_enabled", &node_mlp_enabled)
            .finish()
    }
}

/// Resolves a possibly negative dimension index against a tensor rank.
fn resolve_dim(ndims: usize, dim: isize) -> Result<usize> {
    let resolved = if dim < 0 { dim + ndims as isize } else { dim };
    if resolved < 0 || resolved >= ndims as isize {
        return Err(DistributedError::DimOutOfRange { dim, ndims });
    }
    Ok(resolved as usize)
}

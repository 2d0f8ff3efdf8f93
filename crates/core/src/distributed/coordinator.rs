//! Group coordinator abstraction over collective communication.
//!
//! A [`GroupCoordinator`] wraps one live communication group: the member list
//! was fixed at construction and the collectives run over exactly those ranks.
//! The topology layer builds coordinators through a [`GroupFactory`] so tests
//! can observe construction and swap in in-process mocks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use candle_core::Tensor;

use super::error::{DistributedError, Result};
use super::partition::GroupPartition;

/// Construction options for a communication group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOptions {
    /// Human-readable group name, used for logging and transport registration.
    pub group_name: String,
    /// Route CPU-side metadata through a shared-memory message queue instead
    /// of the collective transport.
    pub use_message_queue_broadcaster: bool,
}

impl GroupOptions {
    pub fn named(group_name: impl Into<String>) -> Self {
        Self {
            group_name: group_name.into(),
            use_message_queue_broadcaster: false,
        }
    }

    pub fn with_message_queue_broadcaster(mut self) -> Self {
        self.use_message_queue_broadcaster = true;
        self
    }
}

/// One live communication group from the calling process's point of view.
pub trait GroupCoordinator: Send + Sync {
    /// This process's rank within the group, in `0..world_size`.
    fn rank_in_group(&self) -> usize;

    /// Number of ranks in the group.
    fn world_size(&self) -> usize;

    /// All-gather along `dim`: output is `world_size` inputs concatenated.
    fn all_gather(&self, tensor: &Tensor, dim: usize) -> Result<Tensor>;

    /// All-reduce (sum): same shape in and out, result on every rank.
    fn all_reduce(&self, tensor: &Tensor) -> Result<Tensor>;

    /// Reduce-scatter along `dim`: each rank keeps its `1/world_size` slice
    /// of the reduced result.
    fn reduce_scatter(&self, tensor: &Tensor, dim: usize) -> Result<Tensor>;

    /// Tears down the group's transport resources. Idempotent.
    fn destroy(&mut self);
}

// `unwrap_err` in the tests needs the trait object to be `Debug`; the
// production API keeps the trait free of a `Debug` supertrait (see the
// manual `Debug` on `AscendParallelState`).
#[cfg(test)]
impl std::fmt::Debug for dyn GroupCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupCoordinator")
            .field("rank_in_group", &self.rank_in_group())
            .field("world_size", &self.world_size())
            .finish()
    }
}

/// Builds [`GroupCoordinator`]s for the group containing the calling process.
pub trait GroupFactory: Send + Sync {
    /// Initializes the group of `partition` that contains this process.
    fn init_group(
        &self,
        partition: &GroupPartition,
        local_rank: usize,
        backend: &str,
        options: &GroupOptions,
    ) -> Result<Box<dyn GroupCoordinator>>;
}

/// In-process coordinator that simulates collectives on one rank.
///
/// All-gather concatenates `world_size` copies of the input, reduce-scatter
/// slices out this rank's chunk, and all-reduce is identity. That matches
/// what a real group produces when every rank holds the same data, which is
/// what single-process tests feed in.
pub struct MockCoordinator {
    rank_in_group: usize,
    world_size: usize,
    destroyed: Arc<AtomicBool>,
}

impl MockCoordinator {
    pub fn new(rank_in_group: usize, world_size: usize) -> Self {
        assert!(world_size > 0, "world_size must be > 0");
        assert!(
            rank_in_group < world_size,
            "rank_in_group {rank_in_group} out of range for world_size {world_size}"
        );
        Self {
            rank_in_group,
            world_size,
            destroyed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares the destroyed flag so tests can observe teardown after the
    /// coordinator itself has been dropped.
    pub fn destroyed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.destroyed)
    }

    fn check_live(&self) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(DistributedError::Collective(
                "group has been destroyed".to_string(),
            ));
        }
        Ok(())
    }
}

impl GroupCoordinator for MockCoordinator {
    fn rank_in_group(&self) -> usize {
        self.rank_in_group
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn all_gather(&self, tensor: &Tensor, dim: usize) -> Result<Tensor> {
        self.check_live()?;
        let copies: Vec<Tensor> = (0..self.world_size).map(|_| tensor.clone()).collect();
        Ok(Tensor::cat(&copies, dim)?)
    }

    fn all_reduce(&self, tensor: &Tensor) -> Result<Tensor> {
        self.check_live()?;
        // Every simulated rank holds the same data, so the sum is a scale;
        // identity keeps test fixtures simple.
        Ok(tensor.clone())
    }

    fn reduce_scatter(&self, tensor: &Tensor, dim: usize) -> Result<Tensor> {
        self.check_live()?;
        let dim_size = tensor.dim(dim)?;
        let chunk = dim_size / self.world_size;
        Ok(tensor.narrow(dim, self.rank_in_group * chunk, chunk)?)
    }

    fn destroy(&mut self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

/// Record of one [`MockGroupFactory::init_group`] call.
#[derive(Clone)]
pub struct MockFactoryCall {
    pub partition: GroupPartition,
    pub local_rank: usize,
    pub backend: String,
    pub options: GroupOptions,
    /// Set once the coordinator built by this call is destroyed.
    pub destroyed: Arc<AtomicBool>,
}

/// Factory that hands out [`MockCoordinator`]s and records every call.
pub struct MockGroupFactory {
    global_rank: usize,
    calls: Arc<Mutex<Vec<MockFactoryCall>>>,
}

impl MockGroupFactory {
    /// Factory that resolves groups as seen by `global_rank`.
    pub fn new(global_rank: usize) -> Self {
        Self {
            global_rank,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<MockFactoryCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

impl GroupFactory for MockGroupFactory {
    fn init_group(
        &self,
        partition: &GroupPartition,
        local_rank: usize,
        backend: &str,
        options: &GroupOptions,
    ) -> Result<Box<dyn GroupCoordinator>> {
        let (group_idx, rank_in_group) = partition.locate(self.global_rank).ok_or_else(|| {
            DistributedError::GroupConstruction(format!(
                "rank {} is not covered by the partition",
                self.global_rank
            ))
        })?;
        let group_size = partition.groups()[group_idx].len();
        let coordinator = MockCoordinator::new(rank_in_group, group_size);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(MockFactoryCall {
                partition: partition.clone(),
                local_rank,
                backend: backend.to_string(),
                options: options.clone(),
                destroyed: coordinator.destroyed_flag(),
            });
        }
        Ok(Box::new(coordinator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    fn make_test_tensor(shape: &[usize]) -> Tensor {
        Tensor::ones(shape, DType::F32, &Device::Cpu).unwrap()
    }

    #[test]
    fn group_options_builder() {
        let options = GroupOptions::named("mc2");
        assert_eq!(options.group_name, "mc2");
        assert!(!options.use_message_queue_broadcaster);

        let options = GroupOptions::named("world_local").with_message_queue_broadcaster();
        assert!(options.use_message_queue_broadcaster);
    }

    #[test]
    fn mock_all_gather_concatenates_along_dim() {
        let coordinator = MockCoordinator::new(0, 4);
        let input = make_test_tensor(&[2, 3]);
        let output = coordinator.all_gather(&input, 0).unwrap();
        assert_eq!(output.dims(), &[8, 3]);
    }

    #[test]
    fn mock_all_gather_along_last_dim() {
        let coordinator = MockCoordinator::new(1, 2);
        let input = make_test_tensor(&[2, 3]);
        let output = coordinator.all_gather(&input, 1).unwrap();
        assert_eq!(output.dims(), &[2, 6]);
    }

    #[test]
    fn mock_all_reduce_keeps_shape() {
        let coordinator = MockCoordinator::new(2, 4);
        let input = make_test_tensor(&[4, 4]);
        let output = coordinator.all_reduce(&input).unwrap();
        assert_eq!(output.dims(), input.dims());
    }

    #[test]
    fn mock_reduce_scatter_takes_rank_slice() {
        let coordinator = MockCoordinator::new(1, 4);
        let input = make_test_tensor(&[8, 3]);
        let output = coordinator.reduce_scatter(&input, 0).unwrap();
        // Rank 1 of 4 gets rows [2, 4).
        assert_eq!(output.dims(), &[2, 3]);
    }

    #[test]
    fn mock_single_rank_collectives_are_identity() {
        let coordinator = MockCoordinator::new(0, 1);
        let input = make_test_tensor(&[2, 3]);
        assert_eq!(coordinator.all_gather(&input, 0).unwrap().dims(), &[2, 3]);
        assert_eq!(
            coordinator.reduce_scatter(&input, 0).unwrap().dims(),
            &[2, 3]
        );
    }

    #[test]
    fn mock_destroy_poisons_collectives() {
        let mut coordinator = MockCoordinator::new(0, 2);
        coordinator.destroy();
        let input = make_test_tensor(&[2, 2]);
        assert!(matches!(
            coordinator.all_reduce(&input),
            Err(DistributedError::Collective(_))
        ));
    }

    #[test]
    fn factory_resolves_rank_within_group() {
        let factory = MockGroupFactory::new(5);
        let partition = GroupPartition::contiguous(8, 4).unwrap();
        let coordinator = factory
            .init_group(&partition, 1, "hccl", &GroupOptions::named("mc2"))
            .unwrap();
        // Rank 5 sits at position 1 of group [4, 5, 6, 7].
        assert_eq!(coordinator.rank_in_group(), 1);
        assert_eq!(coordinator.world_size(), 4);
    }

    #[test]
    fn factory_records_calls() {
        let factory = MockGroupFactory::new(0);
        let partition = GroupPartition::contiguous(4, 2).unwrap();
        factory
            .init_group(
                &partition,
                0,
                "hccl",
                &GroupOptions::named("world_local").with_message_queue_broadcaster(),
            )
            .unwrap();

        assert_eq!(factory.call_count(), 1);
        let call = &factory.calls()[0];
        assert_eq!(call.backend, "hccl");
        assert_eq!(call.options.group_name, "world_local");
        assert!(call.options.use_message_queue_broadcaster);
        assert_eq!(call.partition, partition);
    }

    #[test]
    fn factory_rejects_uncovered_rank() {
        let factory = MockGroupFactory::new(9);
        let partition = GroupPartition::contiguous(8, 4).unwrap();
        let err = factory
            .init_group(&partition, 1, "hccl", &GroupOptions::named("mc2"))
            .unwrap_err();
        assert!(matches!(err, DistributedError::GroupConstruction(_)));
    }

    #[test]
    fn factory_call_exposes_destroy_flag() {
        let factory = MockGroupFactory::new(0);
        let partition = GroupPartition::contiguous(2, 2).unwrap();
        let mut coordinator = factory
            .init_group(&partition, 0, "hccl", &GroupOptions::named("mc2"))
            .unwrap();

        let call = factory.calls().pop().unwrap();
        assert!(!call.destroyed.load(Ordering::SeqCst));
        coordinator.destroy();
        assert!(call.destroyed.load(Ordering::SeqCst));
    }
}

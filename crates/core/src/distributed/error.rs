//! Error types for model-parallel topology operations.

use thiserror::Error;

/// Errors that can occur while building or using model-parallel groups.
#[derive(Error, Debug)]
pub enum DistributedError {
    /// The external distributed runtime has not completed rendezvous.
    #[error("distributed runtime is not initialized")]
    RuntimeNotInitialized,

    /// A call arrived before `initialize` populated the topology.
    #[error("model parallel groups are not initialized")]
    NotInitialized,

    /// `initialize` was called while the MC2 group is still live.
    #[error("model parallel groups are already initialized; call destroy() first")]
    AlreadyInitialized,

    /// The node-local MLP TP group was initialized twice without a destroy.
    #[error("MLP TP group is already initialized; call destroy() first")]
    MlpGroupAlreadyInitialized,

    /// World size cannot be split into equal groups of the requested size.
    #[error("world_size ({world_size}) must be divisible by group size ({group_size})")]
    IndivisibleWorldSize {
        world_size: usize,
        group_size: usize,
    },

    /// A hand-built partition did not cover every rank exactly once.
    #[error("invalid partition: {0}")]
    InvalidPartition(String),

    /// Collective dimension outside the tensor's rank.
    #[error("dim {dim} is out of range for a tensor with {ndims} dimensions")]
    DimOutOfRange { dim: isize, ndims: usize },

    /// The group construction capability rejected the request.
    #[error("group construction failed: {0}")]
    GroupConstruction(String),

    /// Opaque failure from the underlying collective transport.
    #[error("collective error: {0}")]
    Collective(String),

    /// Underlying tensor operation failed.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

pub type Result<T> = std::result::Result<T, DistributedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_indivisible_world_size() {
        let e = DistributedError::IndivisibleWorldSize {
            world_size: 6,
            group_size: 4,
        };
        assert_eq!(
            e.to_string(),
            "world_size (6) must be divisible by group size (4)"
        );
    }

    #[test]
    fn error_display_dim_out_of_range() {
        let e = DistributedError::DimOutOfRange { dim: -4, ndims: 2 };
        assert_eq!(
            e.to_string(),
            "dim -4 is out of range for a tensor with 2 dimensions"
        );
    }

    #[test]
    fn error_display_not_initialized() {
        let e = DistributedError::NotInitialized;
        assert_eq!(e.to_string(), "model parallel groups are not initialized");
    }
}

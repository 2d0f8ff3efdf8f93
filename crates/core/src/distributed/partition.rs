//! Rank partitioning for model-parallel group construction.
//!
//! A [`GroupPartition`] splits the global rank space into disjoint groups.
//! Every process in the world derives the same partition and then joins the
//! one group containing its own rank, so the construction must be a pure
//! function of `(world_size, group_size)`.

use tracing::info;

use super::error::{DistributedError, Result};

/// A complete, disjoint partition of ranks `0..world_size` into groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPartition {
    groups: Vec<Vec<usize>>,
}

impl GroupPartition {
    /// Splits `0..world_size` into consecutive blocks of `group_size` ranks.
    ///
    /// With `world_size = 8` and `group_size = 4` this yields
    /// `[[0, 1, 2, 3], [4, 5, 6, 7]]`.
    pub fn contiguous(world_size: usize, group_size: usize) -> Result<Self> {
        if group_size == 0 || world_size % group_size != 0 {
            return Err(DistributedError::IndivisibleWorldSize {
                world_size,
                group_size,
            });
        }
        let groups = (0..world_size / group_size)
            .map(|g| (g * group_size..(g + 1) * group_size).collect())
            .collect();
        Ok(Self { groups })
    }

    /// Builds a partition from explicit rank groups.
    ///
    /// The groups must cover `0..n` exactly once for some `n`, with no rank
    /// repeated or skipped.
    pub fn from_groups(groups: Vec<Vec<usize>>) -> Result<Self> {
        let world_size: usize = groups.iter().map(Vec::len).sum();
        let mut seen = vec![false; world_size];
        for group in &groups {
            if group.is_empty() {
                return Err(DistributedError::InvalidPartition(
                    "empty rank group".to_string(),
                ));
            }
            for &rank in group {
                if rank >= world_size {
                    return Err(DistributedError::InvalidPartition(format!(
                        "rank {rank} out of range for world size {world_size}"
                    )));
                }
                if seen[rank] {
                    return Err(DistributedError::InvalidPartition(format!(
                        "rank {rank} appears in more than one group"
                    )));
                }
                seen[rank] = true;
            }
        }
        Ok(Self { groups })
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// Ranks per group. Uniform for contiguous partitions; for explicit
    /// groups this is the size of the first one.
    pub fn group_size(&self) -> usize {
        self.groups.first().map(Vec::len).unwrap_or(0)
    }

    pub fn groups(&self) -> &[Vec<usize>] {
        &self.groups
    }

    /// Total number of ranks covered by the partition.
    pub fn world_size(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    /// Finds `rank` in the partition, returning `(group index, rank in group)`.
    pub fn locate(&self, rank: usize) -> Option<(usize, usize)> {
        self.groups.iter().enumerate().find_map(|(g, group)| {
            group
                .iter()
                .position(|&r| r == rank)
                .map(|position| (g, position))
        })
    }
}

/// Size of the node-local MLP TP group given the node's device count.
///
/// Small worlds may not fill a node, so the group size is capped at the world
/// size. The capped size must still divide the world evenly or the node-local
/// groups would straddle node boundaries.
pub fn calculate_effective_local_size(local_size: usize, world_size: usize) -> Result<usize> {
    let effective = local_size.min(world_size);
    if effective < local_size {
        info!(
            effective,
            local_size, "using only {effective} of {local_size} available NPU devices"
        );
    }
    if effective == 0 || world_size % effective != 0 {
        return Err(DistributedError::IndivisibleWorldSize {
            world_size,
            group_size: effective,
        });
    }
    Ok(effective)
}

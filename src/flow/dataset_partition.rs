//! Re-sharding: hash partitioning, round robin, broadcast and unordered merge.

use crate::error::{FlowError, Result};
use crate::flow::dataset::{Dataset, check_indexes};
use crate::flow::step::ShardWiring;
use crate::instruction::{Broadcast, CollectPartitions, MergeTo, RoundRobin, ScatterPartitions};
use std::sync::Arc;

fn check_shards(op: &str, shard_count: usize) -> Result<()> {
    if shard_count == 0 {
        return Err(FlowError::Topology(format!("{op} to zero shards")));
    }
    Ok(())
}

impl Dataset {
    /// Hash-partition rows by `indexes` into `shard_count` shards.
    ///
    /// Returns `self` unchanged when it is already partitioned by `indexes`
    /// into that many shards, or when both it and the target have one shard.
    /// Otherwise every shard scatters into `shard_count` pieces and, when there
    /// was more than one source shard, the pieces for each target shard are
    /// collected. Local sort order does not survive.
    ///
    /// # Errors
    /// [`FlowError::Topology`] for a zero shard count or empty/zero indexes.
    pub fn partition(&self, shard_count: usize, indexes: &[usize]) -> Result<Dataset> {
        check_shards("partition", shard_count)?;
        check_indexes("partition", indexes)?;
        if self.partitioned_by() == indexes && self.shard_count() == shard_count {
            return Ok(self.clone());
        }
        if self.shard_count() == 1 && shard_count == 1 {
            return Ok(self.clone());
        }
        let scattered = self.flow().add_step(
            Arc::new(ScatterPartitions::new(indexes.to_vec())),
            &[self],
            ShardWiring::OneToEveryN(shard_count),
            Vec::new(),
            indexes.to_vec(),
        )?;
        if self.shard_count() == 1 {
            return Ok(scattered);
        }
        self.flow().add_step(
            Arc::new(CollectPartitions),
            &[&scattered],
            ShardWiring::LinkedNToOne(shard_count),
            Vec::new(),
            indexes.to_vec(),
        )
    }

    /// [`Self::partition`] into the flow's default shard count.
    ///
    /// # Errors
    /// As [`Self::partition`].
    pub fn partition_default(&self, indexes: &[usize]) -> Result<Dataset> {
        self.partition(self.flow().config().default_shards, indexes)
    }

    /// Deal the rows of every shard across `n` new shards each. Local sort
    /// order survives; partitioning does not.
    ///
    /// # Errors
    /// [`FlowError::Topology`] for `n == 0`.
    pub fn round_robin(&self, n: usize) -> Result<Dataset> {
        check_shards("round_robin", n)?;
        self.flow().add_step(
            Arc::new(RoundRobin),
            &[self],
            ShardWiring::OneToEveryN(n),
            self.sorted_by().to_vec(),
            Vec::new(),
        )
    }

    /// Copy a dataset to `n` shards, each holding every row. A multi-shard
    /// dataset is first merged into one.
    ///
    /// # Errors
    /// [`FlowError::Topology`] for `n == 0`.
    pub fn broadcast(&self, n: usize) -> Result<Dataset> {
        check_shards("broadcast", n)?;
        let single = self.merge_to(1)?;
        let sorted_by = single.sorted_by().to_vec();
        self.flow().add_step(
            Arc::new(Broadcast),
            &[&single],
            ShardWiring::OneToAll(n),
            sorted_by,
            Vec::new(),
        )
    }

    /// Concatenate shards down to `shard_count`, without ordering.
    ///
    /// # Errors
    /// [`FlowError::Topology`] when `shard_count` is zero or exceeds the
    /// current shard count.
    pub fn merge_to(&self, shard_count: usize) -> Result<Dataset> {
        check_shards("merge_to", shard_count)?;
        if shard_count == self.shard_count() {
            return Ok(self.clone());
        }
        self.flow().add_step(
            Arc::new(MergeTo),
            &[self],
            ShardWiring::LinkedNToOne(shard_count),
            Vec::new(),
            Vec::new(),
        )
    }
}

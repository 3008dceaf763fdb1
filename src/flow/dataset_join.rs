//! Joins: broadcast hash join and sort-merge co-group.

use crate::error::Result;
use crate::flow::dataset::{Dataset, check_indexes};
use crate::flow::step::ShardWiring;
use crate::instruction::order::order_bys_from_indexes;
use crate::instruction::{CoGroupPartitionedSorted, LocalHashAndJoinWith};
use std::sync::Arc;

/// Leading key positions of a row whose first `k` fields are the key.
fn leading(k: usize) -> Vec<usize> {
    (1..=k).collect()
}

impl Dataset {
    /// Inner join: `self` (the small side) is held in memory and `bigger` is
    /// streamed past it.
    ///
    /// `self` is merged into one shard and broadcast to every shard of
    /// `bigger`. Each output row is `bigger`'s key fields, then `bigger`'s other
    /// fields, then `self`'s non-key fields.
    ///
    /// # Errors
    /// [`crate::FlowError::Topology`] for empty/zero indexes or datasets of
    /// different flows.
    pub fn hash_join(&self, bigger: &Dataset, indexes: &[usize]) -> Result<Dataset> {
        check_indexes("hash_join", indexes)?;
        let small = self.broadcast(bigger.shard_count())?;
        let partitioned_by = if bigger.partitioned_by() == indexes {
            leading(indexes.len())
        } else {
            Vec::new()
        };
        self.flow().add_step(
            Arc::new(LocalHashAndJoinWith::new(indexes.to_vec())),
            &[&small, bigger],
            ShardWiring::OneToOne,
            Vec::new(),
            partitioned_by,
        )
    }

    /// Full outer co-group by `indexes`.
    ///
    /// Both sides are partitioned into the larger of their shard counts and
    /// sorted ascending by the key (each step skipped when already true). Every
    /// key of either side yields one row
    /// `[keys.., Seq(self values), Seq(other values)]`.
    ///
    /// # Errors
    /// [`crate::FlowError::Topology`] for empty/zero indexes or datasets of
    /// different flows.
    pub fn cogroup(&self, other: &Dataset, indexes: &[usize]) -> Result<Dataset> {
        check_indexes("cogroup", indexes)?;
        let shards = self.shard_count().max(other.shard_count());
        let order = order_bys_from_indexes(indexes);
        let left = self.partition(shards, indexes)?.local_sort(&order)?;
        let right = other.partition(shards, indexes)?.local_sort(&order)?;
        let keys = leading(indexes.len());
        self.flow().add_step(
            Arc::new(CoGroupPartitionedSorted::new(indexes.to_vec())),
            &[&left, &right],
            ShardWiring::OneToOne,
            order_bys_from_indexes(&keys),
            keys,
        )
    }
}

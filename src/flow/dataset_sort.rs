//! Sorting, top-k and distinct.

use crate::error::{FlowError, Result};
use crate::flow::dataset::{Dataset, check_order_bys};
use crate::flow::step::ShardWiring;
use crate::instruction::order::{OrderBy, is_order_by_equal};
use crate::instruction::{LocalDistinct, LocalSort, LocalTop, MergeSortedTo};
use std::sync::Arc;

impl Dataset {
    /// Sort every shard by `order_bys`. A no-op when the shards are already
    /// sorted by exactly that order.
    ///
    /// # Errors
    /// [`FlowError::Topology`] for an empty or zero index.
    pub fn local_sort(&self, order_bys: &[OrderBy]) -> Result<Dataset> {
        check_order_bys("local_sort", order_bys)?;
        if is_order_by_equal(self.sorted_by(), order_bys) {
            return Ok(self.clone());
        }
        let config = self.flow().config();
        let instruction =
            LocalSort::new(order_bys.to_vec(), config.sort_memory_mb()).with_spill_dir(config.spill_dir);
        self.one_to_one(instruction, order_bys.to_vec(), self.partitioned_by().to_vec())
    }

    /// Keep the `n` rows of every shard that come first under `order_bys`,
    /// emitted in that order. A descending key keeps the largest values.
    ///
    /// Data already sorted by exactly that order only needs its first `n`
    /// rows, so a [`Self::local_limit`] is used instead.
    ///
    /// # Errors
    /// [`FlowError::Topology`] for an empty or zero index, or `n` over `i32::MAX`.
    pub fn local_top(&self, n: usize, order_bys: &[OrderBy]) -> Result<Dataset> {
        check_order_bys("local_top", order_bys)?;
        if is_order_by_equal(self.sorted_by(), order_bys) {
            return self.local_limit(n, 0);
        }
        let n = i32::try_from(n).map_err(|_| FlowError::Topology(format!("top n {n} too large")))?;
        self.one_to_one(
            LocalTop::new(n, order_bys.to_vec()),
            order_bys.to_vec(),
            self.partitioned_by().to_vec(),
        )
    }

    /// Drop consecutive rows with equal keys in every shard. Meaningful on
    /// shards sorted by the same key; metadata is preserved.
    ///
    /// # Errors
    /// [`FlowError::Topology`] for an empty or zero index.
    pub fn local_distinct(&self, order_bys: &[OrderBy]) -> Result<Dataset> {
        check_order_bys("local_distinct", order_bys)?;
        self.one_to_one(
            LocalDistinct::new(order_bys.to_vec()),
            self.sorted_by().to_vec(),
            self.partitioned_by().to_vec(),
        )
    }

    /// Merge shards that are sorted by `order_bys` down to `shard_count`
    /// sorted shards.
    ///
    /// # Errors
    /// [`FlowError::Topology`] when the shards are not known to be sorted by
    /// `order_bys`, or `shard_count` is zero or exceeds the current shard count.
    pub fn merge_sorted_to(&self, shard_count: usize, order_bys: &[OrderBy]) -> Result<Dataset> {
        check_order_bys("merge_sorted_to", order_bys)?;
        if !is_order_by_equal(self.sorted_by(), order_bys) {
            return Err(FlowError::Topology(format!(
                "merge_sorted_to by {order_bys:?} on shards sorted by {:?}",
                self.sorted_by()
            )));
        }
        if shard_count == self.shard_count() {
            return Ok(self.clone());
        }
        self.flow().add_step(
            Arc::new(MergeSortedTo::new(order_bys.to_vec())),
            &[self],
            ShardWiring::LinkedNToOne(shard_count),
            order_bys.to_vec(),
            Vec::new(),
        )
    }

    /// Merge sorted shards into one, at most `factor` inputs per merge.
    ///
    /// # Errors
    /// [`FlowError::Topology`] when `factor` is below 2.
    pub fn tree_merge_sorted_to(&self, factor: usize, order_bys: &[OrderBy]) -> Result<Dataset> {
        if factor < 2 {
            return Err(FlowError::Topology(format!("tree merge factor {factor} below 2")));
        }
        let mut current = self.clone();
        while current.shard_count() > 1 {
            let next = current.shard_count().div_ceil(factor);
            current = current.merge_sorted_to(next, order_bys)?;
        }
        Ok(current)
    }

    /// Sort the whole dataset into one shard.
    ///
    /// # Errors
    /// [`FlowError::Topology`] for an empty or zero index.
    pub fn sort(&self, order_bys: &[OrderBy]) -> Result<Dataset> {
        let factor = self.flow().config().tree_merge_factor;
        self.local_sort(order_bys)?.tree_merge_sorted_to(factor, order_bys)
    }

    /// Distinct rows by `order_bys`, sorted, in one shard when the input has
    /// several.
    ///
    /// # Errors
    /// [`FlowError::Topology`] for an empty or zero index.
    pub fn distinct(&self, order_bys: &[OrderBy]) -> Result<Dataset> {
        let ret = self.local_sort(order_bys)?.local_distinct(order_bys)?;
        if ret.shard_count() == 1 {
            return Ok(ret);
        }
        ret.merge_sorted_to(1, order_bys)?.local_distinct(order_bys)
    }

    /// The first `k` rows of the whole dataset under `order_bys`, in one shard.
    ///
    /// # Errors
    /// [`FlowError::Topology`] for an empty or zero index.
    pub fn top(&self, k: usize, order_bys: &[OrderBy]) -> Result<Dataset> {
        let ret = self.local_top(k, order_bys)?;
        if ret.shard_count() == 1 {
            return Ok(ret);
        }
        ret.merge_sorted_to(1, order_bys)?.local_limit(k, 0)
    }
}

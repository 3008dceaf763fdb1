//! Keyed reductions.

use crate::error::Result;
use crate::flow::dataset::{Dataset, check_indexes};
use crate::functions;
use crate::instruction::LocalReduceBy;
use crate::instruction::order::order_bys_from_indexes;
use crate::value::Value;

impl Dataset {
    /// Fold consecutive equal-key rows of every shard with `f`. Each output row
    /// is the key followed by the folded values.
    ///
    /// # Errors
    /// [`crate::FlowError::Topology`] for empty/zero indexes.
    pub fn local_reduce_by<F>(&self, indexes: &[usize], f: F) -> Result<Dataset>
    where
        F: Fn(&[Value], &[Value]) -> Result<Vec<Value>> + Send + Sync + 'static,
    {
        self.local_reduce_by_id(&functions::register_reducer(f), indexes)
    }

    /// [`Self::local_reduce_by`] with an already registered reducer id.
    ///
    /// The key moves to the front of each row, so sort and partition metadata on
    /// the key carry over at positions `1..=k`; anything else is dropped.
    ///
    /// # Errors
    /// [`crate::FlowError::Topology`] for empty/zero indexes.
    pub fn local_reduce_by_id(&self, reducer_id: &str, indexes: &[usize]) -> Result<Dataset> {
        check_indexes("local_reduce_by", indexes)?;
        let keys: Vec<usize> = (1..=indexes.len()).collect();
        let sorted_by = if self.sorted_by() == order_bys_from_indexes(indexes).as_slice() {
            order_bys_from_indexes(&keys)
        } else {
            Vec::new()
        };
        let partitioned_by = if self.partitioned_by() == indexes {
            keys
        } else {
            Vec::new()
        };
        self.one_to_one(
            LocalReduceBy::new(reducer_id, indexes.to_vec()),
            sorted_by,
            partitioned_by,
        )
    }

    /// Reduce all rows sharing a key to one row, over the whole dataset.
    ///
    /// Shards are sorted and reduced locally first; with several shards the
    /// partial results are merged into one shard and reduced again, so `f` must
    /// be associative.
    ///
    /// # Errors
    /// [`crate::FlowError::Topology`] for empty/zero indexes.
    pub fn reduce_by<F>(&self, indexes: &[usize], f: F) -> Result<Dataset>
    where
        F: Fn(&[Value], &[Value]) -> Result<Vec<Value>> + Send + Sync + 'static,
    {
        check_indexes("reduce_by", indexes)?;
        let id = functions::register_reducer(f);
        let ret = self
            .local_sort(&order_bys_from_indexes(indexes))?
            .local_reduce_by_id(&id, indexes)?;
        if ret.shard_count() == 1 {
            return Ok(ret);
        }
        let keys: Vec<usize> = (1..=indexes.len()).collect();
        ret.merge_sorted_to(1, &order_bys_from_indexes(&keys))?
            .local_reduce_by_id(&id, &keys)
    }
}

//! Dataset handles and the per-row transformations.

use crate::error::{FlowError, Result};
use crate::flow::ids::DatasetId;
use crate::flow::step::ShardWiring;
use crate::flow::Flow;
use crate::functions;
use crate::instruction::order::OrderBy;
use crate::instruction::{Filter, LocalLimit, Map, Select};
use crate::row::Row;
use std::sync::Arc;

/// What is known about the data of a dataset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatasetMeta {
    pub shard_count: usize,
    /// Every shard is sorted by this order; empty when unknown.
    pub sorted_by: Vec<OrderBy>,
    /// Rows with equal values at these indexes share a shard; empty when unknown.
    pub partitioned_by: Vec<usize>,
}

/// A node of a [`Flow`]. Cheap to clone; never changes.
#[derive(Clone)]
pub struct Dataset {
    flow: Flow,
    id: DatasetId,
    meta: DatasetMeta,
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("id", &self.id)
            .field("meta", &self.meta)
            .finish()
    }
}

impl Dataset {
    pub(crate) fn new(flow: Flow, id: DatasetId, meta: DatasetMeta) -> Self {
        Self { flow, id, meta }
    }

    #[must_use]
    pub fn id(&self) -> DatasetId {
        self.id
    }

    #[must_use]
    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    #[must_use]
    pub fn meta(&self) -> &DatasetMeta {
        &self.meta
    }

    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.meta.shard_count
    }

    #[must_use]
    pub fn sorted_by(&self) -> &[OrderBy] {
        &self.meta.sorted_by
    }

    #[must_use]
    pub fn partitioned_by(&self) -> &[usize] {
        &self.meta.partitioned_by
    }

    /// Project every row onto 1-based `indexes`. Clears sort and partition
    /// metadata, since field positions move.
    ///
    /// # Errors
    /// [`FlowError::Topology`] for an empty or zero index.
    pub fn select(&self, indexes: &[usize]) -> Result<Dataset> {
        check_indexes("select", indexes)?;
        self.one_to_one(Select::new(indexes.to_vec()), Vec::new(), Vec::new())
    }

    /// Apply `f` to every row. Clears sort and partition metadata.
    ///
    /// The function is registered in [`functions`] under a generated id.
    ///
    /// # Errors
    /// Wiring errors.
    pub fn map<F>(&self, f: F) -> Result<Dataset>
    where
        F: Fn(Row) -> Result<Vec<Row>> + Send + Sync + 'static,
    {
        self.map_by_id(&functions::register_mapper(f))
    }

    /// [`Self::map`] with an already registered mapper id.
    ///
    /// # Errors
    /// Wiring errors.
    pub fn map_by_id(&self, mapper_id: &str) -> Result<Dataset> {
        self.one_to_one(Map::new(mapper_id), Vec::new(), Vec::new())
    }

    /// Keep rows for which `f` returns `true`. Metadata is preserved.
    ///
    /// # Errors
    /// Wiring errors.
    pub fn filter<F>(&self, f: F) -> Result<Dataset>
    where
        F: Fn(&Row) -> Result<bool> + Send + Sync + 'static,
    {
        self.filter_by_id(&functions::register_predicate(f))
    }

    /// [`Self::filter`] with an already registered predicate id.
    ///
    /// # Errors
    /// Wiring errors.
    pub fn filter_by_id(&self, predicate_id: &str) -> Result<Dataset> {
        self.one_to_one(
            Filter::new(predicate_id),
            self.meta.sorted_by.clone(),
            self.meta.partitioned_by.clone(),
        )
    }

    /// First `n` rows after skipping `offset`, per shard. Metadata is preserved.
    ///
    /// # Errors
    /// Wiring errors.
    pub fn local_limit(&self, n: usize, offset: usize) -> Result<Dataset> {
        self.one_to_one(
            LocalLimit::new(n, offset),
            self.meta.sorted_by.clone(),
            self.meta.partitioned_by.clone(),
        )
    }

    /// First `n` rows after skipping `offset`, over the whole dataset. The
    /// result has one shard; which rows are "first" across shards follows
    /// arrival order unless the dataset was merged sorted beforehand.
    ///
    /// # Errors
    /// Wiring errors.
    pub fn limit(&self, n: usize, offset: usize) -> Result<Dataset> {
        if self.shard_count() == 1 {
            return self.local_limit(n, offset);
        }
        self.local_limit(n.saturating_add(offset), 0)?
            .merge_to(1)?
            .local_limit(n, offset)
    }

    pub(crate) fn one_to_one(
        &self,
        instruction: impl crate::instruction::Instruction + 'static,
        sorted_by: Vec<OrderBy>,
        partitioned_by: Vec<usize>,
    ) -> Result<Dataset> {
        self.flow.add_step(
            Arc::new(instruction),
            &[self],
            ShardWiring::OneToOne,
            sorted_by,
            partitioned_by,
        )
    }
}

/// Keyed steps need at least one key, and keys are 1-based.
pub(crate) fn check_indexes(op: &str, indexes: &[usize]) -> Result<()> {
    if indexes.is_empty() {
        return Err(FlowError::Topology(format!("{op} needs at least one key index")));
    }
    if indexes.contains(&0) {
        return Err(FlowError::Topology(format!("{op}: key indexes are 1-based, got 0")));
    }
    Ok(())
}

pub(crate) fn check_order_bys(op: &str, order_bys: &[OrderBy]) -> Result<()> {
    let indexes: Vec<usize> = order_bys.iter().map(|o| o.index).collect();
    check_indexes(op, &indexes)
}

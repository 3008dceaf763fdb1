//! The pipeline graph: datasets connected by steps.
//!
//! A [`Flow`] owns an append-only graph. Every transformation on a [`Dataset`]
//! adds zero or more [`Step`]s and returns a new `Dataset` handle; nothing in the
//! graph changes after it is added. Each dataset records its shard count, the
//! order its shards are locally sorted by, and the key it is partitioned by.
//! Transformations read that metadata to skip work that would be a no-op, and
//! must keep it literally true of the data.
//!
//! Building is single-threaded in practice; the graph sits behind a mutex only so
//! that cheap `Flow` clones can share it.

mod dataset;
mod dataset_join;
mod dataset_partition;
mod dataset_reduce;
mod dataset_sort;
mod ids;
mod step;

pub use dataset::{Dataset, DatasetMeta};
pub use ids::{DatasetId, StepId};
pub use step::{ShardRef, ShardWiring, Step, Task};

use crate::codec::encode_row;
use crate::config::FlowConfig;
use crate::error::{FlowError, Result};
use crate::instruction::order::OrderBy;
use crate::instruction::{InlineSource, Instruction};
use crate::row::{Row, now_ms};
use crate::value::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

pub(crate) struct FlowInner {
    config: FlowConfig,
    datasets: Vec<DatasetMeta>,
    steps: Vec<Step>,
}

#[derive(Clone)]
pub struct Flow {
    inner: Arc<Mutex<FlowInner>>,
}

impl Default for Flow {
    fn default() -> Self {
        Self::from_config(FlowConfig::default())
    }
}

impl Flow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// [`FlowError::Config`] if `config` does not validate.
    pub fn with_config(config: FlowConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: FlowConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FlowInner {
                config,
                datasets: Vec::new(),
                steps: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FlowInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn config(&self) -> FlowConfig {
        self.lock().config.clone()
    }

    /// Snapshot of every step, in creation order.
    #[must_use]
    pub fn steps(&self) -> Vec<Step> {
        self.lock().steps.clone()
    }

    #[must_use]
    pub fn step_count(&self) -> usize {
        self.lock().steps.len()
    }

    #[must_use]
    pub fn dataset_count(&self) -> usize {
        self.lock().datasets.len()
    }

    #[must_use]
    pub fn dataset_meta(&self, id: DatasetId) -> Option<DatasetMeta> {
        self.lock().datasets.get(id.raw()).cloned()
    }

    /// True when both handles share one graph.
    #[must_use]
    pub fn same_flow(&self, other: &Flow) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// A single-shard dataset holding `rows`, carried inline in the step.
    ///
    /// # Errors
    /// [`FlowError::Encode`] if a row cannot be encoded.
    pub fn rows(&self, rows: impl IntoIterator<Item = Row>) -> Result<Dataset> {
        let frames = rows
            .into_iter()
            .map(|r| encode_row(r.ts, &r.fields))
            .collect::<Result<Vec<_>>>()?;
        self.source(InlineSource::new(frames))
    }

    /// One single-field row per string, stamped with the current time.
    ///
    /// # Errors
    /// [`FlowError::Encode`] if a row cannot be encoded.
    pub fn strings<I, S>(&self, lines: I) -> Result<Dataset>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ts = now_ms();
        self.rows(
            lines
                .into_iter()
                .map(|s| Row::new(ts, vec![Value::Str(s.into())])),
        )
    }

    /// A single-shard dataset produced by a 0-input instruction.
    ///
    /// # Errors
    /// [`FlowError::Topology`] if the step cannot be wired.
    pub fn source(&self, instruction: impl Instruction + 'static) -> Result<Dataset> {
        self.add_step(Arc::new(instruction), &[], ShardWiring::Source, Vec::new(), Vec::new())
    }

    /// Append a step reading `inputs` and producing a new dataset.
    pub(crate) fn add_step(
        &self,
        instruction: Arc<dyn Instruction>,
        inputs: &[&Dataset],
        wiring: ShardWiring,
        sorted_by: Vec<OrderBy>,
        partitioned_by: Vec<usize>,
    ) -> Result<Dataset> {
        if let Some(foreign) = inputs.iter().find(|d| !self.same_flow(d.flow())) {
            return Err(FlowError::Topology(format!(
                "dataset {} belongs to a different flow",
                foreign.id()
            )));
        }
        let input_shards: Vec<(DatasetId, usize)> =
            inputs.iter().map(|d| (d.id(), d.shard_count())).collect();
        let counts: Vec<usize> = input_shards.iter().map(|&(_, s)| s).collect();
        let shard_count = step::output_shards(wiring, &counts)?;

        let meta = DatasetMeta {
            shard_count,
            sorted_by,
            partitioned_by,
        };
        let mut g = self.lock();
        let output = DatasetId::new(g.datasets.len());
        g.datasets.push(meta.clone());
        let id = StepId::new(g.steps.len());
        let tasks = step::build_tasks(wiring, &input_shards, output, shard_count);
        debug!(
            step = id.raw(),
            instruction = instruction.name(),
            tasks = tasks.len(),
            shards = shard_count,
            "added step"
        );
        g.steps.push(Step {
            id,
            instruction,
            inputs: input_shards.iter().map(|&(d, _)| d).collect(),
            output,
            wiring,
            tasks,
        });
        drop(g);
        Ok(Dataset::new(self.clone(), output, meta))
    }
}

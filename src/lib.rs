//! # Shardflow
//!
//! A **sharded dataflow engine**. A pipeline is described as a graph of datasets
//! connected by steps; every dataset is split into shards and every step runs one
//! task per output shard. Tasks exchange rows as length-prefixed MessagePack
//! frames over byte streams, so an instruction only needs readers and writers and
//! never cares where its peers run.
//!
//! ## Key Features
//!
//! - **Row wire protocol** - `[timestamp, field...]` frames with a total order on keys
//! - **Shard-local instructions** - sort (with spilling), top-k, distinct, limit,
//!   reduce, hash join, co-group and more
//! - **Re-sharding** - hash partitioning, round robin, broadcast, sorted and unsorted merges
//! - **Metadata-aware planning** - sort and partition facts let no-op steps be elided
//! - **Serializable instructions** - every instruction round-trips through an
//!   [`InstructionDescriptor`] and an [`InstructionRegistry`]
//! - **Local execution** - [`LocalRunner`] runs every task on its own thread over bounded pipes
//!
//! ## Quick Start
//!
//! ```
//! use shardflow::*;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let flow = Flow::new();
//! let words = flow.rows(vec![row![1; "b", 2], row![2; "a", 1], row![3; "b", 2]])?;
//!
//! let distinct = words.distinct(&[OrderBy::asc(1), OrderBy::asc(2)])?;
//!
//! let rows = LocalRunner::new().run_collect(&distinct)?;
//! assert_eq!(rows.len(), 2);
//! assert_eq!(rows[0].fields[0], Value::from("a"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! 1. [`value`], [`row`] and [`codec`] define the data and its framing
//! 2. [`pipe`] and [`plumbing`] move frames between streams
//! 3. [`instruction`] holds the executable units and their descriptors
//! 4. [`flow`] builds the dataset graph and tracks shard metadata
//! 5. [`runner`] wires the graph into pipes and threads and runs it
//!
//! Logging goes through `tracing`; call [`logging::init`] (filter from
//! `SHARDFLOW_LOG`) or install your own subscriber.

pub mod codec;
pub mod config;
pub mod error;
pub mod flow;
pub mod functions;
pub mod instruction;
pub mod logging;
pub mod pipe;
pub mod plumbing;
pub mod row;
pub mod runner;
pub mod value;

// General re-exports
pub use config::FlowConfig;
pub use error::{FlowError, Result};
pub use flow::{Dataset, DatasetId, Flow, ShardWiring, StepId};
pub use instruction::{
    Instruction, InstructionDescriptor, InstructionParams, InstructionRegistry, InstructionStat,
    Order, OrderBy,
};
pub use row::{Row, TimestampMs};
pub use runner::{LocalRunner, RunReport, TaskReport};
pub use value::Value;

//! Instructions: the unit of computable work.
//!
//! An [`Instruction`] consumes N input frame streams and produces M output frame
//! streams. Each one exposes four capabilities:
//!
//! - [`Instruction::name`]: stable identifier, matched against descriptors;
//! - [`Instruction::function`]: the executable form, an [`InstructionFn`];
//! - [`Instruction::serialize_to_command`]: its [`InstructionDescriptor`];
//! - [`Instruction::memory_cost_mb`]: a placement estimate, never enforced.
//!
//! A descriptor received from elsewhere is turned back into a runnable instruction
//! through an [`InstructionRegistry`]. The registry is built explicitly
//! ([`InstructionRegistry::with_builtins`]) and may be installed once as the
//! process-wide instance with [`install_registry`].

mod broadcast;
mod cogroup_partitioned_sorted;
mod collect_partitions;
mod descriptor;
mod inline_source;
mod local_distinct;
mod local_hash_and_join_with;
mod local_limit;
mod local_reduce_by;
mod local_sort;
mod local_top;
mod map;
mod merge_sorted_to;
pub mod order;
mod registry;
mod round_robin;
mod scatter_partitions;
mod select;

pub use broadcast::{Broadcast, do_broadcast};
pub use cogroup_partitioned_sorted::{CoGroupPartitionedSorted, do_cogroup_partitioned_sorted};
pub use collect_partitions::{CollectPartitions, MergeTo, do_collect_partitions};
pub use descriptor::{InstructionDescriptor, InstructionParams};
pub use inline_source::{InlineSource, do_inline_source};
pub use local_distinct::{LocalDistinct, do_local_distinct};
pub use local_hash_and_join_with::{LocalHashAndJoinWith, do_local_hash_and_join_with};
pub use local_limit::{LocalLimit, do_local_limit};
pub use local_reduce_by::{LocalReduceBy, do_local_reduce_by};
pub use local_sort::{LocalSort, do_local_sort};
pub use local_top::{LocalTop, do_local_top};
pub use map::{Filter, Map, do_filter, do_map};
pub use merge_sorted_to::{MergeSortedTo, do_merge_sorted_to};
pub use order::{Order, OrderBy};
pub use registry::{Constructor, InstructionRegistry, install_registry, registry};
pub use round_robin::{RoundRobin, do_round_robin};
pub use scatter_partitions::{ScatterPartitions, do_scatter_partitions};
pub use select::{Select, do_select};

use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// An input stream handed to an instruction.
pub type StreamReader = Box<dyn Read + Send>;
/// An output stream handed to an instruction. Dropping it ends the stream.
pub type StreamWriter = Box<dyn Write + Send>;

/// The executable form of an instruction.
pub type InstructionFn =
    Box<dyn FnOnce(Vec<StreamReader>, Vec<StreamWriter>, &mut InstructionStat) -> Result<()> + Send>;

/// Per-invocation counters.
///
/// Owned by the single invocation that updates them; anyone else reading them
/// gets a snapshot at best.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionStat {
    pub step_id: usize,
    pub task_id: usize,
    pub input_counter: i64,
    pub output_counter: i64,
}

pub trait Instruction: Send + Sync {
    fn name(&self) -> &'static str;

    fn function(&self) -> InstructionFn;

    fn serialize_to_command(&self) -> InstructionDescriptor;

    /// Estimated peak memory in MiB for a partition of about `partition_size_mb`.
    fn memory_cost_mb(&self, partition_size_mb: i64) -> i64 {
        let _ = partition_size_mb;
        1
    }
}

/// Take the single stream of a 1-input or 1-output instruction.
pub(crate) fn single<T>(name: &str, what: &str, mut streams: Vec<T>) -> Result<T> {
    if streams.len() != 1 {
        return Err(FlowError::instruction(
            name,
            format!("expected 1 {what} stream, got {}", streams.len()),
        ));
    }
    streams
        .pop()
        .ok_or_else(|| FlowError::instruction(name, format!("missing {what} stream")))
}

/// Take the two inputs of a binary instruction, left first.
pub(crate) fn pair<T>(name: &str, streams: Vec<T>) -> Result<(T, T)> {
    let n = streams.len();
    let mut it = streams.into_iter();
    match (it.next(), it.next(), it.next()) {
        (Some(left), Some(right), None) => Ok((left, right)),
        _ => Err(FlowError::instruction(name, format!("expected 2 input streams, got {n}"))),
    }
}

/// Log an instruction failure before handing it back.
pub(crate) fn logged<T>(name: &str, stats: &InstructionStat, res: Result<T>) -> Result<T> {
    if let Err(e) = &res
        && !e.is_broken_pipe()
    {
        tracing::error!(
            instruction = name,
            input = stats.input_counter,
            output = stats.output_counter,
            "{e}"
        );
    }
    res
}

//! Steps, their shard wiring, and the per-shard tasks they expand into.

use crate::error::{FlowError, Result};
use crate::flow::ids::{DatasetId, StepId};
use crate::instruction::Instruction;
use std::fmt;
use std::sync::Arc;

/// How the shards of a step's inputs connect to the shards of its output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShardWiring {
    /// No inputs; one task producing the single output shard.
    Source,
    /// Task `i` reads shard `i` of every input and writes output shard `i`.
    OneToOne,
    /// One single-shard input; one task writes all `n` output shards.
    OneToAll(usize),
    /// Task `i` reads input shard `i` and writes output shards `i*n .. i*n+n`.
    OneToEveryN(usize),
    /// `n` output shards; output `i` reads input shards `i, i+n, i+2n, …`.
    LinkedNToOne(usize),
}

/// One shard of one dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShardRef {
    pub dataset: DatasetId,
    pub shard: usize,
}

impl ShardRef {
    #[must_use]
    pub fn new(dataset: DatasetId, shard: usize) -> Self {
        Self { dataset, shard }
    }
}

/// One instruction invocation: which shards it reads, which it writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    pub inputs: Vec<ShardRef>,
    pub outputs: Vec<ShardRef>,
}

/// An edge set of the flow graph carrying one instruction.
#[derive(Clone)]
pub struct Step {
    pub id: StepId,
    pub instruction: Arc<dyn Instruction>,
    pub inputs: Vec<DatasetId>,
    pub output: DatasetId,
    pub wiring: ShardWiring,
    pub tasks: Vec<Task>,
}

impl Step {
    /// Diagnostic name, e.g. `LocalSort#3`.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}#{}", self.instruction.name(), self.id.raw())
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("instruction", &self.instruction.name())
            .field("inputs", &self.inputs)
            .field("output", &self.output)
            .field("wiring", &self.wiring)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

/// Output shard count implied by `wiring` for inputs of `input_shards` shards.
///
/// # Errors
/// [`FlowError::Topology`] when the inputs cannot be wired that way.
pub(crate) fn output_shards(wiring: ShardWiring, input_shards: &[usize]) -> Result<usize> {
    let topo = |msg: String| Err(FlowError::Topology(msg));
    match wiring {
        ShardWiring::Source if input_shards.is_empty() => Ok(1),
        ShardWiring::Source => topo(format!("source step given {} inputs", input_shards.len())),
        _ if input_shards.is_empty() => topo(format!("{wiring:?} step needs at least one input")),
        ShardWiring::OneToOne => {
            let first = input_shards[0];
            if input_shards.iter().any(|&s| s != first) {
                return topo(format!("one-to-one inputs disagree on shard count: {input_shards:?}"));
            }
            Ok(first)
        }
        ShardWiring::OneToAll(_) | ShardWiring::OneToEveryN(_) | ShardWiring::LinkedNToOne(_)
            if input_shards.len() != 1 =>
        {
            topo(format!("{wiring:?} takes one input, got {}", input_shards.len()))
        }
        ShardWiring::OneToAll(_) if input_shards[0] != 1 => {
            topo(format!("one-to-all input must have 1 shard, has {}", input_shards[0]))
        }
        ShardWiring::OneToAll(0) | ShardWiring::OneToEveryN(0) | ShardWiring::LinkedNToOne(0) => {
            topo(format!("{wiring:?} needs a positive shard count"))
        }
        ShardWiring::OneToAll(n) => Ok(n),
        ShardWiring::OneToEveryN(n) => Ok(input_shards[0] * n),
        ShardWiring::LinkedNToOne(n) if n > input_shards[0] => topo(format!(
            "cannot gather {} shards into {n}",
            input_shards[0]
        )),
        ShardWiring::LinkedNToOne(n) => Ok(n),
    }
}

/// Expand a step into tasks.
pub(crate) fn build_tasks(
    wiring: ShardWiring,
    inputs: &[(DatasetId, usize)],
    output: DatasetId,
    output_shards: usize,
) -> Vec<Task> {
    match wiring {
        ShardWiring::Source => vec![Task {
            inputs: Vec::new(),
            outputs: vec![ShardRef::new(output, 0)],
        }],
        ShardWiring::OneToOne => (0..output_shards)
            .map(|i| Task {
                inputs: inputs.iter().map(|&(d, _)| ShardRef::new(d, i)).collect(),
                outputs: vec![ShardRef::new(output, i)],
            })
            .collect(),
        ShardWiring::OneToAll(_) => vec![Task {
            inputs: inputs.iter().map(|&(d, _)| ShardRef::new(d, 0)).collect(),
            outputs: (0..output_shards).map(|i| ShardRef::new(output, i)).collect(),
        }],
        ShardWiring::OneToEveryN(n) => {
            let (input, shards) = inputs[0];
            (0..shards)
                .map(|i| Task {
                    inputs: vec![ShardRef::new(input, i)],
                    outputs: (i * n..i * n + n).map(|o| ShardRef::new(output, o)).collect(),
                })
                .collect()
        }
        ShardWiring::LinkedNToOne(n) => {
            let (input, shards) = inputs[0];
            (0..n)
                .map(|i| Task {
                    inputs: (i..shards).step_by(n).map(|s| ShardRef::new(input, s)).collect(),
                    outputs: vec![ShardRef::new(output, i)],
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linked_wiring_is_strided() {
        let input = DatasetId::new(0);
        let output = DatasetId::new(1);
        let tasks = build_tasks(ShardWiring::LinkedNToOne(2), &[(input, 5)], output, 2);
        let shards: Vec<Vec<usize>> = tasks
            .iter()
            .map(|t| t.inputs.iter().map(|s| s.shard).collect())
            .collect();
        assert_eq!(shards, vec![vec![0, 2, 4], vec![1, 3]]);
    }

    #[test]
    fn one_to_one_rejects_mismatched_inputs() {
        assert!(output_shards(ShardWiring::OneToOne, &[2, 3]).is_err());
        assert_eq!(output_shards(ShardWiring::OneToOne, &[3, 3]).unwrap(), 3);
    }
}

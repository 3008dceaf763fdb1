//! In-process execution of a [`Flow`].
//!
//! [`LocalRunner`] runs every task that contributes to a target dataset on its
//! own thread. Each dataset shard is an in-memory [`pipe`]: bounded, so a slow
//! consumer throttles its producer. A shard read by several tasks is fanned out
//! through a [`TeeWriter`] over one [`spool`] per reader, so a reader that has
//! not started yet never holds up the others; a shard nobody reads is drained.
//! Task outputs are buffered before they reach a pipe. The target's shards are
//! decoded concurrently and concatenated in shard order.
//!
//! A failed task is reported as [`FlowError::Task`]. A failure usually echoes
//! upstream as broken pipes; those echoes are never chosen as the reported cause
//! when a real one exists, and on their own they are logged, not escalated.

use crate::codec::read_row;
use crate::error::FlowError;
use crate::flow::{Dataset, DatasetId, ShardRef, Step, StepId};
use crate::instruction::{InstructionFn, InstructionStat, StreamReader, StreamWriter};
use crate::pipe::{PipeReader, TeeWriter, pipe, spool};
use crate::row::Row;
use anyhow::{Context, Result, anyhow};
use std::collections::{BTreeSet, HashMap};
use std::io::{self, BufWriter};
use std::thread;
use tracing::{debug, info, warn};

const WRITE_BUFFER: usize = 64 * 1024;

/// Counters of one finished task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskReport {
    pub step: String,
    pub stat: InstructionStat,
}

/// Everything a run produced.
#[derive(Clone, Debug, Default)]
pub struct RunReport {
    pub rows: Vec<Row>,
    pub tasks: Vec<TaskReport>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LocalRunner {
    /// Overrides the flow's `pipe_capacity`.
    pub pipe_capacity: Option<usize>,
}

struct Job {
    step: String,
    stat: InstructionStat,
    function: InstructionFn,
    inputs: Vec<StreamReader>,
    outputs: Vec<StreamWriter>,
}

/// Steps whose output `target` depends on, in creation order.
fn needed_steps(steps: &[Step], target: DatasetId) -> Vec<&Step> {
    let producer: HashMap<DatasetId, &Step> = steps.iter().map(|s| (s.output, s)).collect();
    let mut keep: BTreeSet<StepId> = BTreeSet::new();
    let mut stack = vec![target];
    while let Some(d) = stack.pop() {
        if let Some(s) = producer.get(&d)
            && keep.insert(s.id)
        {
            stack.extend(s.inputs.iter().copied());
        }
    }
    steps.iter().filter(|s| keep.contains(&s.id)).collect()
}

fn collect_rows(mut reader: PipeReader) -> crate::error::Result<Vec<Row>> {
    let mut rows = Vec::new();
    while let Some(row) = read_row(&mut reader)? {
        rows.push(row);
    }
    Ok(rows)
}

impl LocalRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_pipe_capacity(capacity: usize) -> Self {
        Self {
            pipe_capacity: Some(capacity),
        }
    }

    /// Run the flow up to `target` and return its rows, shard by shard.
    ///
    /// # Errors
    /// The failing task's [`FlowError::Task`], with context.
    pub fn run_collect(&self, target: &Dataset) -> Result<Vec<Row>> {
        self.run(target).map(|r| r.rows)
    }

    /// Run the flow up to `target` and return per-task counters.
    ///
    /// # Errors
    /// As [`Self::run_collect`].
    pub fn run_stats(&self, target: &Dataset) -> Result<Vec<TaskReport>> {
        self.run(target).map(|r| r.tasks)
    }

    /// Run the flow up to `target`.
    ///
    /// # Errors
    /// As [`Self::run_collect`].
    pub fn run(&self, target: &Dataset) -> Result<RunReport> {
        let flow = target.flow();
        let capacity = self.pipe_capacity.unwrap_or(flow.config().pipe_capacity);
        let all_steps = flow.steps();
        let steps = needed_steps(&all_steps, target.id());
        if !steps.iter().any(|s| s.output == target.id()) {
            return Err(anyhow!("dataset {} has no producing step", target.id()));
        }

        // every reader of every shard, including the final collection
        let mut consumers: HashMap<ShardRef, usize> = HashMap::new();
        for task in steps.iter().flat_map(|s| &s.tasks) {
            for input in &task.inputs {
                *consumers.entry(*input).or_default() += 1;
            }
        }
        let target_shards: Vec<ShardRef> = (0..target.shard_count())
            .map(|i| ShardRef::new(target.id(), i))
            .collect();
        for shard in &target_shards {
            *consumers.entry(*shard).or_default() += 1;
        }

        let mut readers: HashMap<ShardRef, Vec<PipeReader>> = HashMap::new();
        let mut writers: HashMap<ShardRef, StreamWriter> = HashMap::new();
        let mut drains: Vec<PipeReader> = Vec::new();
        for output in steps.iter().flat_map(|s| &s.tasks).flat_map(|t| &t.outputs) {
            let n = consumers.get(output).copied().unwrap_or(0);
            let writer: StreamWriter;
            let rs: Vec<PipeReader>;
            if n > 1 {
                let (ws, branches): (Vec<_>, Vec<_>) = (0..n).map(|_| spool()).unzip();
                writer = Box::new(BufWriter::with_capacity(WRITE_BUFFER, TeeWriter::new(ws)));
                rs = branches;
            } else {
                let (w, r) = pipe(capacity);
                writer = Box::new(BufWriter::with_capacity(WRITE_BUFFER, w));
                rs = vec![r];
            }
            writers.insert(*output, writer);
            if n == 0 {
                drains.extend(rs);
            } else {
                readers.insert(*output, rs);
            }
        }

        let mut take_reader = |shard: &ShardRef| -> Result<StreamReader> {
            let r = readers
                .get_mut(shard)
                .and_then(Vec::pop)
                .with_context(|| format!("no producer for {}:{}", shard.dataset, shard.shard))?;
            Ok(Box::new(r))
        };

        // wire everything before starting any thread
        let mut jobs = Vec::new();
        for step in &steps {
            for (task_id, task) in step.tasks.iter().enumerate() {
                let inputs = task.inputs.iter().map(&mut take_reader).collect::<Result<Vec<_>>>()?;
                let outputs = task
                    .outputs
                    .iter()
                    .map(|o| writers.remove(o).with_context(|| format!("shard {}:{} written twice", o.dataset, o.shard)))
                    .collect::<Result<Vec<_>>>()?;
                jobs.push(Job {
                    step: step.name(),
                    stat: InstructionStat {
                        step_id: step.id.raw(),
                        task_id,
                        ..InstructionStat::default()
                    },
                    function: step.instruction.function(),
                    inputs,
                    outputs,
                });
            }
        }
        let collectors = target_shards
            .iter()
            .map(|s| {
                readers
                    .get_mut(s)
                    .and_then(Vec::pop)
                    .with_context(|| format!("target shard {} not produced", s.shard))
            })
            .collect::<Result<Vec<_>>>()?;

        info!(steps = steps.len(), tasks = jobs.len(), "running flow");
        let (finished, collected) = thread::scope(|s| {
            let tasks: Vec<_> = jobs
                .into_iter()
                .map(|job| {
                    let step = job.step.clone();
                    let stat = job.stat.clone();
                    (step, stat, s.spawn(move || run_job(job)))
                })
                .collect();
            for mut r in drains {
                s.spawn(move || io::copy(&mut r, &mut io::sink()));
            }
            let shards: Vec<_> = collectors
                .into_iter()
                .map(|r| s.spawn(move || collect_rows(r)))
                .collect();

            let finished: Vec<(String, InstructionStat, crate::error::Result<()>)> = tasks
                .into_iter()
                .map(|(step, stat, h)| match h.join() {
                    Ok(done) => done,
                    Err(_) => (step, stat, Err(FlowError::Io(io::Error::other("task panicked")))),
                })
                .collect();
            let collected: Vec<crate::error::Result<Vec<Row>>> = shards
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or_else(|_| Err(FlowError::Io(io::Error::other("collector panicked"))))
                })
                .collect();
            (finished, collected)
        });

        let mut report = RunReport::default();
        let mut failures = Vec::new();
        for (step, stat, res) in finished {
            if let Err(source) = res {
                failures.push(FlowError::Task {
                    step: step.clone(),
                    task: stat.task_id,
                    input: stat.input_counter,
                    output: stat.output_counter,
                    source: Box::new(source),
                });
            }
            report.tasks.push(TaskReport { step, stat });
        }
        if let Some(root) = pick_root_cause(failures) {
            return Err(anyhow::Error::new(root).context(format!("flow run to dataset {} failed", target.id())));
        }
        for shard in collected {
            report
                .rows
                .extend(shard.with_context(|| format!("collecting dataset {}", target.id()))?);
        }
        info!(rows = report.rows.len(), "flow finished");
        Ok(report)
    }
}

fn run_job(job: Job) -> (String, InstructionStat, crate::error::Result<()>) {
    let Job {
        step,
        mut stat,
        function,
        inputs,
        outputs,
    } = job;
    debug!(step = %step, task = stat.task_id, "task started");
    let res = function(inputs, outputs, &mut stat);
    debug!(
        step = %step,
        task = stat.task_id,
        input = stat.input_counter,
        output = stat.output_counter,
        ok = res.is_ok(),
        "task finished"
    );
    (step, stat, res)
}

/// First failure that is not a broken-pipe echo; echoes alone are benign.
fn pick_root_cause(failures: Vec<FlowError>) -> Option<FlowError> {
    let (echoes, causes): (Vec<_>, Vec<_>) = failures.into_iter().partition(FlowError::is_broken_pipe);
    for echo in &echoes {
        warn!("{echo}");
    }
    causes.into_iter().next()
}

//! LocalSort: sort one shard by a list of [`OrderBy`].
//!
//! Rows are buffered until their encoded size reaches the memory budget. A full
//! buffer is stably sorted and spilled to an anonymous temp file as a run of
//! frames; at end of input the in-memory tail and all runs are merged. The output
//! is a complete sort of the shard whatever its size, and equal keys keep their
//! arrival order.

use crate::codec::{decode_row_keys, process_message, write_message};
use crate::error::{FlowError, Result};
use crate::instruction::merge_sorted_to::{Keyed, KeyedFrames, merge_sorted};
use crate::instruction::order::{OrderBy, compare_keys, indexes_of};
use crate::instruction::{
    Instruction, InstructionDescriptor, InstructionFn, InstructionParams, InstructionStat, StreamReader,
    StreamWriter, logged, single,
};
use rayon::slice::ParallelSliceMut;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Below this many rows a buffer is sorted on the calling thread.
const PARALLEL_SORT_MIN: usize = 8 * 1024;

const MIB: usize = 1024 * 1024;

fn sort_buffer(buffer: &mut [Keyed], order_bys: &[OrderBy]) {
    let cmp = |a: &Keyed, b: &Keyed| compare_keys(order_bys, &a.0, &b.0);
    if buffer.len() >= PARALLEL_SORT_MIN {
        buffer.par_sort_by(cmp);
    } else {
        buffer.sort_by(cmp);
    }
}

fn spill_run(buffer: &mut Vec<Keyed>, order_bys: &[OrderBy], spill_dir: Option<&Path>) -> Result<File> {
    sort_buffer(buffer, order_bys);
    let file = match spill_dir {
        Some(dir) => tempfile::tempfile_in(dir)?,
        None => tempfile::tempfile()?,
    };
    let mut w = BufWriter::new(file);
    let rows = buffer.len();
    for (_, frame) in buffer.drain(..) {
        write_message(&mut w, &frame)?;
    }
    let mut file = w.into_inner().map_err(|e| FlowError::Write(e.into_error()))?;
    file.seek(SeekFrom::Start(0))?;
    debug!(rows, "spilled sort run");
    Ok(file)
}

/// Sort every frame of `reader` into `writer`.
///
/// `buffer_bytes` bounds the encoded bytes held in memory before a run is
/// spilled (only with the `spilling` feature; otherwise the whole shard is
/// buffered).
///
/// # Errors
/// Decode errors, spill file failures, or write errors.
pub fn do_local_sort<R: Read, W: Write>(
    mut reader: R,
    writer: &mut W,
    order_bys: &[OrderBy],
    buffer_bytes: usize,
    spill_dir: Option<&Path>,
    stats: &mut InstructionStat,
) -> Result<()> {
    let indexes = indexes_of(order_bys);
    let mut buffer: Vec<Keyed> = Vec::new();
    let mut buffered = 0usize;
    let mut runs: Vec<File> = Vec::new();

    process_message(&mut reader, |frame| {
        let (_, keys) = decode_row_keys(&frame, &indexes)?;
        stats.input_counter += 1;
        buffered += frame.len();
        buffer.push((keys, frame));
        if cfg!(feature = "spilling") && buffered >= buffer_bytes {
            runs.push(spill_run(&mut buffer, order_bys, spill_dir)?);
            buffered = 0;
        }
        Ok(())
    })?;

    sort_buffer(&mut buffer, order_bys);
    if runs.is_empty() {
        for (_, frame) in buffer {
            write_message(writer, &frame)?;
            stats.output_counter += 1;
        }
        return writer.flush().map_err(FlowError::Write);
    }

    debug!(runs = runs.len(), tail = buffer.len(), "merging sort runs");
    // the tail holds the latest rows, so it merges last
    let mut sources: Vec<Box<dyn Iterator<Item = Result<Keyed>>>> = runs
        .into_iter()
        .map(|f| Box::new(KeyedFrames::new(BufReader::new(f), order_bys)) as Box<dyn Iterator<Item = _>>)
        .collect();
    sources.push(Box::new(buffer.into_iter().map(Ok::<Keyed, FlowError>)));
    merge_sorted(sources, order_bys, writer, stats, false)
}

#[derive(Clone, Debug)]
pub struct LocalSort {
    order_bys: Vec<OrderBy>,
    memory_mb: i64,
    spill_dir: Option<PathBuf>,
}

impl LocalSort {
    /// Sort with an in-memory budget of `memory_mb` MiB of encoded rows.
    #[must_use]
    pub fn new(order_bys: Vec<OrderBy>, memory_mb: i64) -> Self {
        Self {
            order_bys,
            memory_mb,
            spill_dir: None,
        }
    }

    /// Place spill runs under `dir` instead of the system temp directory.
    #[must_use]
    pub fn with_spill_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.spill_dir = dir;
        self
    }

    pub(crate) fn from_descriptor(d: &InstructionDescriptor) -> Result<Box<dyn Instruction>> {
        match &d.params {
            InstructionParams::LocalSort {
                order_bys,
                memory_mb,
                spill_dir,
            } => Ok(Box::new(
                Self::new(order_bys.clone(), *memory_mb).with_spill_dir(spill_dir.clone()),
            )),
            _ => Err(d.mismatch()),
        }
    }

    fn buffer_bytes(&self) -> usize {
        usize::try_from(self.memory_mb.max(1))
            .unwrap_or(usize::MAX / MIB)
            .saturating_mul(MIB)
    }
}

impl Instruction for LocalSort {
    fn name(&self) -> &'static str {
        "LocalSort"
    }

    fn function(&self) -> InstructionFn {
        let this = self.clone();
        Box::new(
            move |readers: Vec<StreamReader>, writers: Vec<StreamWriter>, stats: &mut InstructionStat| {
                let name = this.name();
                let reader = single(name, "input", readers)?;
                let mut writer = single(name, "output", writers)?;
                let res = do_local_sort(
                    reader,
                    &mut writer,
                    &this.order_bys,
                    this.buffer_bytes(),
                    this.spill_dir.as_deref(),
                    stats,
                );
                logged(name, stats, res)
            },
        )
    }

    fn serialize_to_command(&self) -> InstructionDescriptor {
        InstructionDescriptor::new(
            self.name(),
            InstructionParams::LocalSort {
                order_bys: self.order_bys.clone(),
                memory_mb: self.memory_mb,
                spill_dir: self.spill_dir.clone(),
            },
        )
    }

    fn memory_cost_mb(&self, _partition_size_mb: i64) -> i64 {
        self.memory_mb
    }
}

//! ScatterPartitions: route each row to `hash(key) % N`.

use crate::codec::{decode_row_keys, hash_keys, process_message, write_message};
use crate::error::{FlowError, Result};
use crate::instruction::{
    Instruction, InstructionDescriptor, InstructionFn, InstructionParams, InstructionStat, StreamReader,
    StreamWriter, logged, single,
};
use std::io::{Read, Write};

/// Shard a key lands on among `shard_count` shards.
///
/// # Errors
/// [`FlowError::Encode`] if a key value cannot be encoded.
pub fn shard_of(keys: &[crate::value::Value], shard_count: usize) -> Result<usize> {
    Ok(hash_keys(keys)? as usize % shard_count.max(1))
}

/// # Errors
/// Decode errors or write errors; fails up front when there are no outputs.
pub fn do_scatter_partitions<R: Read, W: Write>(
    mut reader: R,
    writers: &mut [W],
    indexes: &[usize],
    stats: &mut InstructionStat,
) -> Result<()> {
    if writers.is_empty() {
        return Err(FlowError::instruction("ScatterPartitions", "no output streams"));
    }
    let shard_count = writers.len();
    process_message(&mut reader, |frame| {
        let (_, keys) = decode_row_keys(&frame, indexes)?;
        stats.input_counter += 1;
        write_message(&mut writers[shard_of(&keys, shard_count)?], &frame)?;
        stats.output_counter += 1;
        Ok(())
    })?;
    writers
        .iter_mut()
        .try_for_each(|w| w.flush().map_err(FlowError::Write))
}

#[derive(Clone, Debug)]
pub struct ScatterPartitions {
    indexes: Vec<usize>,
}

impl ScatterPartitions {
    #[must_use]
    pub fn new(indexes: Vec<usize>) -> Self {
        Self { indexes }
    }

    pub(crate) fn from_descriptor(d: &InstructionDescriptor) -> Result<Box<dyn Instruction>> {
        match &d.params {
            InstructionParams::Indexes { indexes } => Ok(Box::new(Self::new(indexes.clone()))),
            _ => Err(d.mismatch()),
        }
    }
}

impl Instruction for ScatterPartitions {
    fn name(&self) -> &'static str {
        "ScatterPartitions"
    }

    fn function(&self) -> InstructionFn {
        let indexes = self.indexes.clone();
        let name = self.name();
        Box::new(
            move |readers: Vec<StreamReader>, mut writers: Vec<StreamWriter>, stats: &mut InstructionStat| {
                let reader = single(name, "input", readers)?;
                let res = do_scatter_partitions(reader, &mut writers, &indexes, stats);
                logged(name, stats, res)
            },
        )
    }

    fn serialize_to_command(&self) -> InstructionDescriptor {
        InstructionDescriptor::new(
            self.name(),
            InstructionParams::Indexes {
                indexes: self.indexes.clone(),
            },
        )
    }
}

//! CollectPartitions and MergeTo: unordered N -> 1 fan-in.
//!
//! Both concatenate their inputs in arrival order through
//! [`copy_multiple_readers`]; they differ only in name, which tells the reader
//! of a plan whether the inputs came from a scatter.

use crate::error::{FlowError, Result};
use crate::instruction::{
    Instruction, InstructionDescriptor, InstructionFn, InstructionParams, InstructionStat, StreamReader,
    StreamWriter, logged, single,
};
use crate::plumbing::{CopyCounts, copy_multiple_readers};
use std::io::{Read, Write};

/// # Errors
/// The first read, decode or write error among the inputs.
pub fn do_collect_partitions<R: Read + Send, W: Write>(
    readers: Vec<R>,
    writer: &mut W,
    stats: &mut InstructionStat,
) -> Result<()> {
    let mut counts = CopyCounts::default();
    let res = copy_multiple_readers(readers, writer, &mut counts);
    stats.input_counter += counts.input;
    stats.output_counter += counts.output;
    res?;
    writer.flush().map_err(FlowError::Write)
}

fn fan_in(name: &'static str) -> InstructionFn {
    Box::new(
        move |readers: Vec<StreamReader>, writers: Vec<StreamWriter>, stats: &mut InstructionStat| {
            let mut writer = single(name, "output", writers)?;
            let res = do_collect_partitions(readers, &mut writer, stats);
            logged(name, stats, res)
        },
    )
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CollectPartitions;

impl CollectPartitions {
    pub(crate) fn from_descriptor(d: &InstructionDescriptor) -> Result<Box<dyn Instruction>> {
        match d.params {
            InstructionParams::Empty => Ok(Box::new(Self)),
            _ => Err(d.mismatch()),
        }
    }
}

impl Instruction for CollectPartitions {
    fn name(&self) -> &'static str {
        "CollectPartitions"
    }

    fn function(&self) -> InstructionFn {
        fan_in(self.name())
    }

    fn serialize_to_command(&self) -> InstructionDescriptor {
        InstructionDescriptor::new(self.name(), InstructionParams::Empty)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MergeTo;

impl MergeTo {
    pub(crate) fn from_descriptor(d: &InstructionDescriptor) -> Result<Box<dyn Instruction>> {
        match d.params {
            InstructionParams::Empty => Ok(Box::new(Self)),
            _ => Err(d.mismatch()),
        }
    }
}

impl Instruction for MergeTo {
    fn name(&self) -> &'static str {
        "MergeTo"
    }

    fn function(&self) -> InstructionFn {
        fan_in(self.name())
    }

    fn serialize_to_command(&self) -> InstructionDescriptor {
        InstructionDescriptor::new(self.name(), InstructionParams::Empty)
    }
}

//! Select: project each row onto 1-based field indexes.

use crate::codec::{decode_row_keys, process_message, write_row};
use crate::error::{FlowError, Result};
use crate::instruction::{
    Instruction, InstructionDescriptor, InstructionFn, InstructionParams, InstructionStat, StreamReader,
    StreamWriter, logged, single,
};
use std::io::{Read, Write};

/// # Errors
/// Decode errors (including an index past the row) or write errors.
pub fn do_select<R: Read, W: Write>(
    mut reader: R,
    writer: &mut W,
    indexes: &[usize],
    stats: &mut InstructionStat,
) -> Result<()> {
    process_message(&mut reader, |frame| {
        let (ts, fields) = decode_row_keys(&frame, indexes)?;
        stats.input_counter += 1;
        write_row(writer, ts, &fields)?;
        stats.output_counter += 1;
        Ok(())
    })?;
    writer.flush().map_err(FlowError::Write)
}

#[derive(Clone, Debug)]
pub struct Select {
    indexes: Vec<usize>,
}

impl Select {
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

impl Instruction for Select {
    fn name(&self) -> &'static str {
        "Select"
    }

    fn function(&self) -> InstructionFn {
        let indexes = self.indexes.clone();
        let name = self.name();
        Box::new(
            move |readers: Vec<StreamReader>, writers: Vec<StreamWriter>, stats: &mut InstructionStat| {
                let reader = single(name, "input", readers)?;
                let mut writer = single(name, "output", writers)?;
                let res = do_select(reader, &mut writer, &indexes, stats);
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

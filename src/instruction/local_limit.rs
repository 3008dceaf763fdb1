//! LocalLimit: skip `offset` rows, pass the next `n`.
//!
//! Input past the limit is still read to the end and discarded, so upstream
//! stages sharing the same source are never stalled.

use crate::codec::{read_message, write_message};
use crate::error::{FlowError, Result};
use crate::instruction::{
    Instruction, InstructionDescriptor, InstructionFn, InstructionParams, InstructionStat, StreamReader,
    StreamWriter, logged, single,
};
use std::io::{self, Read, Write};

/// # Errors
/// Read errors or write errors.
pub fn do_local_limit<R: Read, W: Write>(
    mut reader: R,
    writer: &mut W,
    n: usize,
    offset: usize,
    stats: &mut InstructionStat,
) -> Result<()> {
    let mut seen = 0usize;
    while seen < offset.saturating_add(n) {
        let Some(frame) = read_message(&mut reader)? else {
            return writer.flush().map_err(FlowError::Write);
        };
        stats.input_counter += 1;
        if seen >= offset {
            write_message(writer, &frame)?;
            stats.output_counter += 1;
        }
        seen += 1;
    }
    writer.flush().map_err(FlowError::Write)?;
    io::copy(&mut reader, &mut io::sink())?;
    Ok(())
}

#[derive(Clone, Copy, Debug)]
pub struct LocalLimit {
    n: usize,
    offset: usize,
}

impl LocalLimit {
    #[must_use]
    pub fn new(n: usize, offset: usize) -> Self {
        Self { n, offset }
    }

    pub(crate) fn from_descriptor(d: &InstructionDescriptor) -> Result<Box<dyn Instruction>> {
        match d.params {
            InstructionParams::LocalLimit { n, offset } => Ok(Box::new(Self::new(n, offset))),
            _ => Err(d.mismatch()),
        }
    }
}

impl Instruction for LocalLimit {
    fn name(&self) -> &'static str {
        "LocalLimit"
    }

    fn function(&self) -> InstructionFn {
        let Self { n, offset } = *self;
        let name = self.name();
        Box::new(
            move |readers: Vec<StreamReader>, writers: Vec<StreamWriter>, stats: &mut InstructionStat| {
                let reader = single(name, "input", readers)?;
                let mut writer = single(name, "output", writers)?;
                let res = do_local_limit(reader, &mut writer, n, offset, stats);
                logged(name, stats, res)
            },
        )
    }

    fn serialize_to_command(&self) -> InstructionDescriptor {
        InstructionDescriptor::new(
            self.name(),
            InstructionParams::LocalLimit {
                n: self.n,
                offset: self.offset,
            },
        )
    }
}

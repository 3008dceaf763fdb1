//! Broadcast: copy every row to every output.

use crate::codec::{process_message, write_message};
use crate::error::{FlowError, Result};
use crate::instruction::{
    Instruction, InstructionDescriptor, InstructionFn, InstructionParams, InstructionStat, StreamReader,
    StreamWriter, logged, single,
};
use std::io::{Read, Write};

/// # Errors
/// Read errors or write errors.
pub fn do_broadcast<R: Read, W: Write>(
    mut reader: R,
    writers: &mut [W],
    stats: &mut InstructionStat,
) -> Result<()> {
    process_message(&mut reader, |frame| {
        stats.input_counter += 1;
        for w in writers.iter_mut() {
            write_message(w, &frame)?;
            stats.output_counter += 1;
        }
        Ok(())
    })?;
    writers
        .iter_mut()
        .try_for_each(|w| w.flush().map_err(FlowError::Write))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Broadcast;

impl Broadcast {
    pub(crate) fn from_descriptor(d: &InstructionDescriptor) -> Result<Box<dyn Instruction>> {
        match d.params {
            InstructionParams::Empty => Ok(Box::new(Self)),
            _ => Err(d.mismatch()),
        }
    }
}

impl Instruction for Broadcast {
    fn name(&self) -> &'static str {
        "Broadcast"
    }

    fn function(&self) -> InstructionFn {
        let name = self.name();
        Box::new(
            move |readers: Vec<StreamReader>, mut writers: Vec<StreamWriter>, stats: &mut InstructionStat| {
                let reader = single(name, "input", readers)?;
                let res = do_broadcast(reader, &mut writers, stats);
                logged(name, stats, res)
            },
        )
    }

    fn serialize_to_command(&self) -> InstructionDescriptor {
        InstructionDescriptor::new(self.name(), InstructionParams::Empty)
    }
}

//! RoundRobin: deal rows across outputs in turn.

use crate::codec::{process_message, write_message};
use crate::error::{FlowError, Result};
use crate::instruction::{
    Instruction, InstructionDescriptor, InstructionFn, InstructionParams, InstructionStat, StreamReader,
    StreamWriter, logged, single,
};
use std::io::{Read, Write};

/// # Errors
/// Read errors or write errors; fails up front when there are no outputs.
pub fn do_round_robin<R: Read, W: Write>(
    mut reader: R,
    writers: &mut [W],
    stats: &mut InstructionStat,
) -> Result<()> {
    if writers.is_empty() {
        return Err(FlowError::instruction("RoundRobin", "no output streams"));
    }
    let mut next = 0usize;
    process_message(&mut reader, |frame| {
        stats.input_counter += 1;
        write_message(&mut writers[next], &frame)?;
        stats.output_counter += 1;
        next = (next + 1) % writers.len();
        Ok(())
    })?;
    writers
        .iter_mut()
        .try_for_each(|w| w.flush().map_err(FlowError::Write))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RoundRobin;

impl RoundRobin {
    pub(crate) fn from_descriptor(d: &InstructionDescriptor) -> Result<Box<dyn Instruction>> {
        match d.params {
            InstructionParams::Empty => Ok(Box::new(Self)),
            _ => Err(d.mismatch()),
        }
    }
}

impl Instruction for RoundRobin {
    fn name(&self) -> &'static str {
        "RoundRobin"
    }

    fn function(&self) -> InstructionFn {
        let name = self.name();
        Box::new(
            move |readers: Vec<StreamReader>, mut writers: Vec<StreamWriter>, stats: &mut InstructionStat| {
                let reader = single(name, "input", readers)?;
                let res = do_round_robin(reader, &mut writers, stats);
                logged(name, stats, res)
            },
        )
    }

    fn serialize_to_command(&self) -> InstructionDescriptor {
        InstructionDescriptor::new(self.name(), InstructionParams::Empty)
    }
}

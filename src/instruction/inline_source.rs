//! InlineSource: a 0 -> 1 instruction that emits frames carried in its own
//! descriptor. Small in-process inputs (`Flow::rows`) travel this way.

use crate::codec::write_message;
use crate::error::{FlowError, Result};
use crate::instruction::{
    Instruction, InstructionDescriptor, InstructionFn, InstructionParams, InstructionStat, StreamReader,
    StreamWriter, logged, single,
};
use std::io::Write;

/// # Errors
/// Write errors.
pub fn do_inline_source<W: Write>(frames: &[Vec<u8>], writer: &mut W, stats: &mut InstructionStat) -> Result<()> {
    for frame in frames {
        write_message(writer, frame)?;
        stats.output_counter += 1;
    }
    writer.flush().map_err(FlowError::Write)
}

#[derive(Clone, Debug)]
pub struct InlineSource {
    frames: Vec<Vec<u8>>,
}

impl InlineSource {
    /// `frames` are encoded row payloads, without length prefixes.
    #[must_use]
    pub fn new(frames: Vec<Vec<u8>>) -> Self {
        Self { frames }
    }

    pub(crate) fn from_descriptor(d: &InstructionDescriptor) -> Result<Box<dyn Instruction>> {
        match &d.params {
            InstructionParams::Frames { frames } => Ok(Box::new(Self::new(frames.clone()))),
            _ => Err(d.mismatch()),
        }
    }
}

impl Instruction for InlineSource {
    fn name(&self) -> &'static str {
        "InlineSource"
    }

    fn function(&self) -> InstructionFn {
        let frames = self.frames.clone();
        let name = self.name();
        Box::new(
            move |readers: Vec<StreamReader>, writers: Vec<StreamWriter>, stats: &mut InstructionStat| {
                if !readers.is_empty() {
                    return Err(FlowError::instruction(
                        name,
                        format!("expected no input streams, got {}", readers.len()),
                    ));
                }
                let mut writer = single(name, "output", writers)?;
                let res = do_inline_source(&frames, &mut writer, stats);
                logged(name, stats, res)
            },
        )
    }

    fn serialize_to_command(&self) -> InstructionDescriptor {
        InstructionDescriptor::new(
            self.name(),
            InstructionParams::Frames {
                frames: self.frames.clone(),
            },
        )
    }
}

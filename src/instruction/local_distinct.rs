//! LocalDistinct: drop consecutive rows with an equal key.
//!
//! The input must already be sorted by the same key, otherwise duplicates that
//! are not adjacent survive.

use crate::codec::{decode_row_keys, process_message, write_message};
use crate::error::{FlowError, Result};
use crate::instruction::order::{OrderBy, indexes_of};
use crate::instruction::{
    Instruction, InstructionDescriptor, InstructionFn, InstructionParams, InstructionStat, StreamReader,
    StreamWriter, logged, single,
};
use crate::value::Value;
use std::io::{Read, Write};

/// # Errors
/// Decode errors or write errors.
pub fn do_local_distinct<R: Read, W: Write>(
    mut reader: R,
    writer: &mut W,
    order_bys: &[OrderBy],
    stats: &mut InstructionStat,
) -> Result<()> {
    let indexes = indexes_of(order_bys);
    let mut previous: Option<Vec<Value>> = None;
    process_message(&mut reader, |frame| {
        let (_, keys) = decode_row_keys(&frame, &indexes)?;
        stats.input_counter += 1;
        if previous.as_ref() == Some(&keys) {
            return Ok(());
        }
        write_message(writer, &frame)?;
        stats.output_counter += 1;
        previous = Some(keys);
        Ok(())
    })?;
    writer.flush().map_err(FlowError::Write)
}

#[derive(Clone, Debug)]
pub struct LocalDistinct {
    order_bys: Vec<OrderBy>,
}

impl LocalDistinct {
    #[must_use]
    pub fn new(order_bys: Vec<OrderBy>) -> Self {
        Self { order_bys }
    }

    pub(crate) fn from_descriptor(d: &InstructionDescriptor) -> Result<Box<dyn Instruction>> {
        match &d.params {
            InstructionParams::OrderBys { order_bys } => Ok(Box::new(Self::new(order_bys.clone()))),
            _ => Err(d.mismatch()),
        }
    }
}

impl Instruction for LocalDistinct {
    fn name(&self) -> &'static str {
        "LocalDistinct"
    }

    fn function(&self) -> InstructionFn {
        let order_bys = self.order_bys.clone();
        let name = self.name();
        Box::new(
            move |readers: Vec<StreamReader>, writers: Vec<StreamWriter>, stats: &mut InstructionStat| {
                let reader = single(name, "input", readers)?;
                let mut writer = single(name, "output", writers)?;
                let res = do_local_distinct(reader, &mut writer, &order_bys, stats);
                logged(name, stats, res)
            },
        )
    }

    fn serialize_to_command(&self) -> InstructionDescriptor {
        InstructionDescriptor::new(
            self.name(),
            InstructionParams::OrderBys {
                order_bys: self.order_bys.clone(),
            },
        )
    }
}

//! LocalReduceBy: fold the non-key fields of consecutive equal-key rows.
//!
//! The input must be sorted by the key. Each run of equal keys becomes one row
//! `keys ++ folded values`, stamped with the greatest timestamp of the run.

use crate::codec::{decode_row_keys_values, process_message, write_row};
use crate::error::{FlowError, Result};
use crate::functions::{self, Reducer};
use crate::instruction::{
    Instruction, InstructionDescriptor, InstructionFn, InstructionParams, InstructionStat, StreamReader,
    StreamWriter, logged, single,
};
use crate::row::TimestampMs;
use crate::value::Value;
use std::io::{Read, Write};

struct Pending {
    ts: TimestampMs,
    keys: Vec<Value>,
    acc: Vec<Value>,
}

fn flush_pending<W: Write>(writer: &mut W, pending: Pending, stats: &mut InstructionStat) -> Result<()> {
    let mut fields = pending.keys;
    fields.extend(pending.acc);
    write_row(writer, pending.ts, &fields)?;
    stats.output_counter += 1;
    Ok(())
}

/// # Errors
/// Decode errors, reducer errors or write errors.
pub fn do_local_reduce_by<R: Read, W: Write>(
    mut reader: R,
    writer: &mut W,
    indexes: &[usize],
    reducer: &Reducer,
    stats: &mut InstructionStat,
) -> Result<()> {
    let mut pending: Option<Pending> = None;
    process_message(&mut reader, |frame| {
        let (ts, keys, values) = decode_row_keys_values(&frame, indexes)?;
        stats.input_counter += 1;
        match pending.as_mut() {
            Some(p) if p.keys == keys => {
                p.acc = reducer(&p.acc, &values)?;
                p.ts = p.ts.max(ts);
            }
            _ => {
                if let Some(done) = pending.replace(Pending { ts, keys, acc: values }) {
                    flush_pending(writer, done, stats)?;
                }
            }
        }
        Ok(())
    })?;
    if let Some(done) = pending {
        flush_pending(writer, done, stats)?;
    }
    writer.flush().map_err(FlowError::Write)
}

#[derive(Clone, Debug)]
pub struct LocalReduceBy {
    reducer_id: String,
    indexes: Vec<usize>,
}

impl LocalReduceBy {
    #[must_use]
    pub fn new(reducer_id: impl Into<String>, indexes: Vec<usize>) -> Self {
        Self {
            reducer_id: reducer_id.into(),
            indexes,
        }
    }

    pub(crate) fn from_descriptor(d: &InstructionDescriptor) -> Result<Box<dyn Instruction>> {
        match &d.params {
            InstructionParams::Reduce { id, indexes } => Ok(Box::new(Self::new(id.clone(), indexes.clone()))),
            _ => Err(d.mismatch()),
        }
    }
}

impl Instruction for LocalReduceBy {
    fn name(&self) -> &'static str {
        "LocalReduceBy"
    }

    fn function(&self) -> InstructionFn {
        let this = self.clone();
        Box::new(
            move |readers: Vec<StreamReader>, writers: Vec<StreamWriter>, stats: &mut InstructionStat| {
                let name = this.name();
                let reducer = functions::reducer(&this.reducer_id)?;
                let reader = single(name, "input", readers)?;
                let mut writer = single(name, "output", writers)?;
                let res = do_local_reduce_by(reader, &mut writer, &this.indexes, &reducer, stats);
                logged(name, stats, res)
            },
        )
    }

    fn serialize_to_command(&self) -> InstructionDescriptor {
        InstructionDescriptor::new(
            self.name(),
            InstructionParams::Reduce {
                id: self.reducer_id.clone(),
                indexes: self.indexes.clone(),
            },
        )
    }
}

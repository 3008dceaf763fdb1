//! LocalHashAndJoinWith: inner hash join of a small left input against a
//! streamed right input.
//!
//! The whole left input is loaded into a map keyed by the encoded key bytes;
//! when several left rows share a key the last one read is kept. Each right row
//! whose key is found produces one output row:
//! `right keys ++ right values ++ left values`, stamped with the right row's
//! timestamp.

use crate::codec::{decode_row_keys_values, encode_keys, process_message, write_row};
use crate::error::{FlowError, Result};
use crate::instruction::{
    Instruction, InstructionDescriptor, InstructionFn, InstructionParams, InstructionStat, StreamReader,
    StreamWriter, logged, pair, single,
};
use crate::value::Value;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use tracing::debug;

/// # Errors
/// Decode errors on either input or write errors.
pub fn do_local_hash_and_join_with<L: Read, R: Read, W: Write>(
    mut left: L,
    mut right: R,
    writer: &mut W,
    indexes: &[usize],
    stats: &mut InstructionStat,
) -> Result<()> {
    let mut table: HashMap<Vec<u8>, Vec<Value>> = HashMap::new();
    process_message(&mut left, |frame| {
        let (_, keys, values) = decode_row_keys_values(&frame, indexes)?;
        stats.input_counter += 1;
        table.insert(encode_keys(&keys)?, values);
        Ok(())
    })?;

    if table.is_empty() {
        let drained = io::copy(&mut right, &mut io::sink())?;
        debug!(bytes = drained, "left side empty, right side drained");
        return writer.flush().map_err(FlowError::Write);
    }

    process_message(&mut right, |frame| {
        let (ts, keys, values) = decode_row_keys_values(&frame, indexes)?;
        stats.input_counter += 1;
        let Some(left_values) = table.get(&encode_keys(&keys)?) else {
            return Ok(());
        };
        let mut fields = keys;
        fields.extend(values);
        fields.extend(left_values.iter().cloned());
        write_row(writer, ts, &fields)?;
        stats.output_counter += 1;
        Ok(())
    })?;
    writer.flush().map_err(FlowError::Write)
}

#[derive(Clone, Debug)]
pub struct LocalHashAndJoinWith {
    indexes: Vec<usize>,
}

impl LocalHashAndJoinWith {
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

impl Instruction for LocalHashAndJoinWith {
    fn name(&self) -> &'static str {
        "LocalHashAndJoinWith"
    }

    fn function(&self) -> InstructionFn {
        let indexes = self.indexes.clone();
        let name = self.name();
        Box::new(
            move |readers: Vec<StreamReader>, writers: Vec<StreamWriter>, stats: &mut InstructionStat| {
                let (left, right) = pair(name, readers)?;
                let mut writer = single(name, "output", writers)?;
                let res = do_local_hash_and_join_with(left, right, &mut writer, &indexes, stats);
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

    fn memory_cost_mb(&self, partition_size_mb: i64) -> i64 {
        partition_size_mb + partition_size_mb / 10
    }
}

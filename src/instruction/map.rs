//! Map and Filter: per-row native functions looked up by id in
//! [`crate::functions`].

use crate::codec::{decode_row, process_message, write_message, write_row};
use crate::error::{FlowError, Result};
use crate::functions::{self, Mapper, Predicate};
use crate::instruction::{
    Instruction, InstructionDescriptor, InstructionFn, InstructionParams, InstructionStat, StreamReader,
    StreamWriter, logged, single,
};
use std::io::{Read, Write};

/// # Errors
/// Decode errors, mapper errors or write errors.
pub fn do_map<R: Read, W: Write>(
    mut reader: R,
    writer: &mut W,
    mapper: &Mapper,
    stats: &mut InstructionStat,
) -> Result<()> {
    process_message(&mut reader, |frame| {
        let row = decode_row(&frame)?;
        stats.input_counter += 1;
        for out in mapper(row)? {
            write_row(writer, out.ts, &out.fields)?;
            stats.output_counter += 1;
        }
        Ok(())
    })?;
    writer.flush().map_err(FlowError::Write)
}

/// Rows the predicate accepts are passed through byte for byte.
///
/// # Errors
/// Decode errors, predicate errors or write errors.
pub fn do_filter<R: Read, W: Write>(
    mut reader: R,
    writer: &mut W,
    predicate: &Predicate,
    stats: &mut InstructionStat,
) -> Result<()> {
    process_message(&mut reader, |frame| {
        let row = decode_row(&frame)?;
        stats.input_counter += 1;
        if predicate(&row)? {
            write_message(writer, &frame)?;
            stats.output_counter += 1;
        }
        Ok(())
    })?;
    writer.flush().map_err(FlowError::Write)
}

#[derive(Clone, Debug)]
pub struct Map {
    mapper_id: String,
}

impl Map {
    /// `mapper_id` as returned by [`functions::register_mapper`].
    #[must_use]
    pub fn new(mapper_id: impl Into<String>) -> Self {
        Self {
            mapper_id: mapper_id.into(),
        }
    }

    pub(crate) fn from_descriptor(d: &InstructionDescriptor) -> Result<Box<dyn Instruction>> {
        match &d.params {
            InstructionParams::Function { id } => Ok(Box::new(Self::new(id.clone()))),
            _ => Err(d.mismatch()),
        }
    }
}

impl Instruction for Map {
    fn name(&self) -> &'static str {
        "Map"
    }

    fn function(&self) -> InstructionFn {
        let id = self.mapper_id.clone();
        let name = self.name();
        Box::new(
            move |readers: Vec<StreamReader>, writers: Vec<StreamWriter>, stats: &mut InstructionStat| {
                let mapper = functions::mapper(&id)?;
                let reader = single(name, "input", readers)?;
                let mut writer = single(name, "output", writers)?;
                let res = do_map(reader, &mut writer, &mapper, stats);
                logged(name, stats, res)
            },
        )
    }

    fn serialize_to_command(&self) -> InstructionDescriptor {
        InstructionDescriptor::new(
            self.name(),
            InstructionParams::Function {
                id: self.mapper_id.clone(),
            },
        )
    }
}

#[derive(Clone, Debug)]
pub struct Filter {
    predicate_id: String,
}

impl Filter {
    /// `predicate_id` as returned by [`functions::register_predicate`].
    #[must_use]
    pub fn new(predicate_id: impl Into<String>) -> Self {
        Self {
            predicate_id: predicate_id.into(),
        }
    }

    pub(crate) fn from_descriptor(d: &InstructionDescriptor) -> Result<Box<dyn Instruction>> {
        match &d.params {
            InstructionParams::Function { id } => Ok(Box::new(Self::new(id.clone()))),
            _ => Err(d.mismatch()),
        }
    }
}

impl Instruction for Filter {
    fn name(&self) -> &'static str {
        "Filter"
    }

    fn function(&self) -> InstructionFn {
        let id = self.predicate_id.clone();
        let name = self.name();
        Box::new(
            move |readers: Vec<StreamReader>, writers: Vec<StreamWriter>, stats: &mut InstructionStat| {
                let predicate = functions::predicate(&id)?;
                let reader = single(name, "input", readers)?;
                let mut writer = single(name, "output", writers)?;
                let res = do_filter(reader, &mut writer, &predicate, stats);
                logged(name, stats, res)
            },
        )
    }

    fn serialize_to_command(&self) -> InstructionDescriptor {
        InstructionDescriptor::new(
            self.name(),
            InstructionParams::Function {
                id: self.predicate_id.clone(),
            },
        )
    }
}

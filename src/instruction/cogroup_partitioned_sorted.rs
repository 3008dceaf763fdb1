//! CoGroupPartitionedSorted: full outer co-group of two inputs that are
//! partitioned and sorted ascending by the same key.
//!
//! Each input is read as a lazy sequence of key groups (consecutive rows with an
//! equal key). The two sequences are walked like a merge join and every key of
//! either side produces one row:
//!
//! ```text
//! [ts, key_1 .. key_k, Seq(left values), Seq(right values)]
//! ```
//!
//! A value entry is the row's single non-key field, or a `Seq` of its non-key
//! fields when there are several. A side without the key contributes an empty
//! `Seq`. The timestamp is the greatest of the grouped rows.

use crate::codec::{decode_row_keys_values, read_message, write_row};
use crate::error::{FlowError, Result};
use crate::instruction::{
    Instruction, InstructionDescriptor, InstructionFn, InstructionParams, InstructionStat, StreamReader,
    StreamWriter, logged, pair, single,
};
use crate::row::TimestampMs;
use crate::value::Value;
use std::cmp::Ordering;
use std::io::{Read, Write};
use std::iter::Peekable;

/// All consecutive rows of one input sharing a key.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyGroup {
    pub ts: TimestampMs,
    pub keys: Vec<Value>,
    pub values: Vec<Value>,
    pub rows: i64,
}

type Decoded = (TimestampMs, Vec<Value>, Vec<Value>);

struct DecodedRows<R> {
    reader: R,
    indexes: Vec<usize>,
}

impl<R: Read> Iterator for DecodedRows<R> {
    type Item = Result<Decoded>;

    fn next(&mut self) -> Option<Self::Item> {
        match read_message(&mut self.reader) {
            Ok(Some(frame)) => Some(decode_row_keys_values(&frame, &self.indexes)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Groups of consecutive equal-key rows of a sorted stream.
pub struct KeyGroups<R: Read> {
    rows: Peekable<DecodedRows<R>>,
}

impl<R: Read> KeyGroups<R> {
    pub fn new(reader: R, indexes: &[usize]) -> Self {
        Self {
            rows: DecodedRows {
                reader,
                indexes: indexes.to_vec(),
            }
            .peekable(),
        }
    }
}

fn group_value(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::Seq(values)
    }
}

impl<R: Read> Iterator for KeyGroups<R> {
    type Item = Result<KeyGroup>;

    fn next(&mut self) -> Option<Self::Item> {
        let (ts, keys, values) = match self.rows.next()? {
            Ok(row) => row,
            Err(e) => return Some(Err(e)),
        };
        let mut group = KeyGroup {
            ts,
            keys,
            values: vec![group_value(values)],
            rows: 1,
        };
        loop {
            match self.rows.peek() {
                Some(Ok((_, keys, _))) if *keys == group.keys => {}
                // a decode error surfaces on the next call
                _ => return Some(Ok(group)),
            }
            if let Some(Ok((ts, _, values))) = self.rows.next() {
                group.ts = group.ts.max(ts);
                group.values.push(group_value(values));
                group.rows += 1;
            }
        }
    }
}

fn emit<W: Write>(
    writer: &mut W,
    ts: TimestampMs,
    keys: Vec<Value>,
    left: Vec<Value>,
    right: Vec<Value>,
) -> Result<()> {
    let mut fields = keys;
    fields.push(Value::Seq(left));
    fields.push(Value::Seq(right));
    write_row(writer, ts, &fields)
}

fn pull<R: Read>(groups: &mut KeyGroups<R>, stats: &mut InstructionStat) -> Result<Option<KeyGroup>> {
    let group = groups.next().transpose()?;
    if let Some(g) = &group {
        stats.input_counter += g.rows;
    }
    Ok(group)
}

/// # Errors
/// Decode errors on either input or write errors.
pub fn do_cogroup_partitioned_sorted<L: Read, R: Read, W: Write>(
    left: L,
    right: R,
    writer: &mut W,
    indexes: &[usize],
    stats: &mut InstructionStat,
) -> Result<()> {
    let mut lefts = KeyGroups::new(left, indexes);
    let mut rights = KeyGroups::new(right, indexes);
    let mut l = pull(&mut lefts, stats)?;
    let mut r = pull(&mut rights, stats)?;

    loop {
        let order = match (&l, &r) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => a.keys.cmp(&b.keys),
        };
        match order {
            Ordering::Less => {
                if let Some(g) = l.take() {
                    emit(writer, g.ts, g.keys, g.values, Vec::new())?;
                }
                l = pull(&mut lefts, stats)?;
            }
            Ordering::Greater => {
                if let Some(g) = r.take() {
                    emit(writer, g.ts, g.keys, Vec::new(), g.values)?;
                }
                r = pull(&mut rights, stats)?;
            }
            Ordering::Equal => {
                if let (Some(a), Some(b)) = (l.take(), r.take()) {
                    emit(writer, a.ts.max(b.ts), a.keys, a.values, b.values)?;
                }
                l = pull(&mut lefts, stats)?;
                r = pull(&mut rights, stats)?;
            }
        }
        stats.output_counter += 1;
    }
    writer.flush().map_err(FlowError::Write)
}

#[derive(Clone, Debug)]
pub struct CoGroupPartitionedSorted {
    indexes: Vec<usize>,
}

impl CoGroupPartitionedSorted {
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

impl Instruction for CoGroupPartitionedSorted {
    fn name(&self) -> &'static str {
        "CoGroupPartitionedSorted"
    }

    fn function(&self) -> InstructionFn {
        let indexes = self.indexes.clone();
        let name = self.name();
        Box::new(
            move |readers: Vec<StreamReader>, writers: Vec<StreamWriter>, stats: &mut InstructionStat| {
                let (left, right) = pair(name, readers)?;
                let mut writer = single(name, "output", writers)?;
                let res = do_cogroup_partitioned_sorted(left, right, &mut writer, &indexes, stats);
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

    fn memory_cost_mb(&self, _partition_size_mb: i64) -> i64 {
        5
    }
}

//! MergeSortedTo: k-way merge of locally sorted inputs into one sorted output.

use crate::codec::{decode_row_keys, read_message, write_message};
use crate::error::{FlowError, Result};
use crate::instruction::order::{OrderBy, compare_keys, indexes_of};
use crate::instruction::{
    Instruction, InstructionDescriptor, InstructionFn, InstructionParams, InstructionStat, StreamReader,
    StreamWriter, logged, single,
};
use crate::value::Value;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io::{Read, Write};

/// A decoded sort key together with the raw frame it came from.
pub(crate) type Keyed = (Vec<Value>, Vec<u8>);

/// Frames of a reader, each paired with its projected key.
pub(crate) struct KeyedFrames<R> {
    reader: R,
    indexes: Vec<usize>,
}

impl<R: Read> KeyedFrames<R> {
    pub(crate) fn new(reader: R, order_bys: &[OrderBy]) -> Self {
        Self {
            reader,
            indexes: indexes_of(order_bys),
        }
    }
}

impl<R: Read> Iterator for KeyedFrames<R> {
    type Item = Result<Keyed>;

    fn next(&mut self) -> Option<Self::Item> {
        match read_message(&mut self.reader) {
            Ok(Some(frame)) => Some(decode_row_keys(&frame, &self.indexes).map(|(_, keys)| (keys, frame))),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

struct Head<'a> {
    keys: Vec<Value>,
    frame: Vec<u8>,
    source: usize,
    order_bys: &'a [OrderBy],
}

impl Ord for Head<'_> {
    // BinaryHeap is a max-heap: the smallest key, then the lowest source, must
    // compare greatest.
    fn cmp(&self, other: &Self) -> Ordering {
        compare_keys(self.order_bys, &other.keys, &self.keys).then(other.source.cmp(&self.source))
    }
}

impl PartialOrd for Head<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Head<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Head<'_> {}

/// Merge sorted keyed sources into `writer`.
///
/// Equal keys come out in source order, so merging runs of a stable sort stays
/// stable. When `count_input` is set, every frame pulled bumps
/// `stats.input_counter`.
pub(crate) fn merge_sorted<I, W>(
    mut sources: Vec<I>,
    order_bys: &[OrderBy],
    writer: &mut W,
    stats: &mut InstructionStat,
    count_input: bool,
) -> Result<()>
where
    I: Iterator<Item = Result<Keyed>>,
    W: Write + ?Sized,
{
    let mut heap = BinaryHeap::with_capacity(sources.len());
    for (source, it) in sources.iter_mut().enumerate() {
        if let Some(next) = it.next() {
            let (keys, frame) = next?;
            if count_input {
                stats.input_counter += 1;
            }
            heap.push(Head {
                keys,
                frame,
                source,
                order_bys,
            });
        }
    }
    while let Some(head) = heap.pop() {
        write_message(writer, &head.frame)?;
        stats.output_counter += 1;
        if let Some(next) = sources[head.source].next() {
            let (keys, frame) = next?;
            if count_input {
                stats.input_counter += 1;
            }
            heap.push(Head {
                keys,
                frame,
                source: head.source,
                order_bys,
            });
        }
    }
    writer.flush().map_err(FlowError::Write)
}

/// Merge readers that are each sorted by `order_bys`.
///
/// # Errors
/// Decode errors on any input, write errors on the output.
pub fn do_merge_sorted_to<R: Read, W: Write>(
    readers: Vec<R>,
    writer: &mut W,
    order_bys: &[OrderBy],
    stats: &mut InstructionStat,
) -> Result<()> {
    let sources = readers
        .into_iter()
        .map(|r| KeyedFrames::new(r, order_bys))
        .collect();
    merge_sorted(sources, order_bys, writer, stats, true)
}

#[derive(Clone, Debug)]
pub struct MergeSortedTo {
    order_bys: Vec<OrderBy>,
}

impl MergeSortedTo {
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

impl Instruction for MergeSortedTo {
    fn name(&self) -> &'static str {
        "MergeSortedTo"
    }

    fn function(&self) -> InstructionFn {
        let order_bys = self.order_bys.clone();
        let name = self.name();
        Box::new(move |readers: Vec<StreamReader>, writers: Vec<StreamWriter>, stats: &mut InstructionStat| {
            let mut writer = single(name, "output", writers)?;
            let res = do_merge_sorted_to(readers, &mut writer, &order_bys, stats);
            logged(name, stats, res)
        })
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

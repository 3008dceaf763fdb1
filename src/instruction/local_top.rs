//! LocalTop: keep the `n` rows of a shard that rank first under an order.
//!
//! "Top" follows the direction of each [`OrderBy`]: a descending key keeps the
//! largest values, an ascending one the smallest. A heap of at most `n` entries
//! holds the best rows seen so far with the worst of them on top; a new row
//! displaces it only if it ranks strictly better, so among equal keys the
//! earlier arrivals are kept. The survivors are emitted best first, so the
//! output is sorted by the requested order.

use crate::codec::{decode_row_keys, process_message, write_message};
use crate::error::{FlowError, Result};
use crate::instruction::order::{OrderBy, compare_keys, indexes_of};
use crate::instruction::{
    Instruction, InstructionDescriptor, InstructionFn, InstructionParams, InstructionStat, StreamReader,
    StreamWriter, logged, single,
};
use crate::value::Value;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::io::{Read, Write};

struct Candidate<'a> {
    keys: Vec<Value>,
    seq: u64,
    frame: Vec<u8>,
    order_bys: &'a [OrderBy],
}

impl Ord for Candidate<'_> {
    // greater means better: earlier under the order, then earlier arrival
    fn cmp(&self, other: &Self) -> Ordering {
        compare_keys(self.order_bys, &other.keys, &self.keys).then(other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Candidate<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate<'_> {}

/// Emit the `n` rows of `reader` that come first under `order_bys`, in that order.
///
/// # Errors
/// Decode errors or write errors.
pub fn do_local_top<R: Read, W: Write>(
    mut reader: R,
    writer: &mut W,
    n: usize,
    order_bys: &[OrderBy],
    stats: &mut InstructionStat,
) -> Result<()> {
    let indexes = indexes_of(order_bys);
    let mut heap: BinaryHeap<Reverse<Candidate<'_>>> = BinaryHeap::with_capacity(n.saturating_add(1).min(1 << 16));
    let mut seq = 0u64;

    process_message(&mut reader, |frame| {
        let (_, keys) = decode_row_keys(&frame, &indexes)?;
        stats.input_counter += 1;
        seq += 1;
        if n == 0 {
            return Ok(());
        }
        let candidate = Candidate {
            keys,
            seq,
            frame,
            order_bys,
        };
        if heap.len() < n {
            heap.push(Reverse(candidate));
        } else if let Some(mut min) = heap.peek_mut()
            && candidate > min.0
        {
            *min = Reverse(candidate);
        }
        Ok(())
    })?;

    // worst pops first, emitted in reverse
    let mut kept = Vec::with_capacity(heap.len());
    while let Some(Reverse(c)) = heap.pop() {
        kept.push(c.frame);
    }
    for frame in kept.iter().rev() {
        write_message(writer, frame)?;
        stats.output_counter += 1;
    }
    writer.flush().map_err(FlowError::Write)
}

#[derive(Clone, Debug)]
pub struct LocalTop {
    n: i32,
    order_bys: Vec<OrderBy>,
}

impl LocalTop {
    #[must_use]
    pub fn new(n: i32, order_bys: Vec<OrderBy>) -> Self {
        Self { n, order_bys }
    }

    pub(crate) fn from_descriptor(d: &InstructionDescriptor) -> Result<Box<dyn Instruction>> {
        match &d.params {
            InstructionParams::LocalTop { n, order_bys } => Ok(Box::new(Self::new(*n, order_bys.clone()))),
            _ => Err(d.mismatch()),
        }
    }
}

impl Instruction for LocalTop {
    fn name(&self) -> &'static str {
        "LocalTop"
    }

    fn function(&self) -> InstructionFn {
        let this = self.clone();
        Box::new(
            move |readers: Vec<StreamReader>, writers: Vec<StreamWriter>, stats: &mut InstructionStat| {
                let name = this.name();
                let n = usize::try_from(this.n)
                    .map_err(|_| FlowError::instruction(name, format!("negative n {}", this.n)))?;
                let reader = single(name, "input", readers)?;
                let mut writer = single(name, "output", writers)?;
                let res = do_local_top(reader, &mut writer, n, &this.order_bys, stats);
                logged(name, stats, res)
            },
        )
    }

    fn serialize_to_command(&self) -> InstructionDescriptor {
        InstructionDescriptor::new(
            self.name(),
            InstructionParams::LocalTop {
                n: self.n,
                order_bys: self.order_bys.clone(),
            },
        )
    }

    fn memory_cost_mb(&self, _partition_size_mb: i64) -> i64 {
        5
    }
}

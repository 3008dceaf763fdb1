//! Stream plumbing between instruction stages and external processes.
//!
//! - [`copy_multiple_readers`]: fan-in of several frame streams into one, one
//!   worker thread per input.
//! - [`copy_and_close`] / [`copy_into`]: raw byte copies with a fixed-size buffer;
//!   the first consumes (and so closes) its destination, the second leaves it open
//!   for other producers.
//! - [`lines_to_frames`] / [`frames_to_lines`] / [`print_delimited`]: conversion
//!   between frames and tab-separated, newline-terminated text for line-oriented
//!   processes. Inside a field, `\`, tab, newline and carriage return are
//!   written as `\\`, `\t`, `\n` and `\r`, and read back the same way, so
//!   a field never splits a line or a row.
//! - [`pipe_through_lines`]: run a line-oriented process given only its stdin and
//!   stdout endpoints.
//!
//! Every named stage reports a failure on its `error_output` as `name>message`.
//! A write that fails because the downstream side already closed (`BrokenPipe`)
//! is logged and ends the stage successfully: the consumer simply needed no more.

use crate::codec::{process_message, read_message, write_message, write_row};
use crate::error::{FlowError, Result};
use crate::instruction::InstructionStat;
use crate::row::now_ms;
use crate::value::Value;
use std::io::{self, BufRead, BufReader, BufWriter, ErrorKind, Read, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::mpsc::sync_channel;
use std::thread;
use tracing::{debug, warn};

/// Buffer size for byte copies and buffered line I/O.
pub const BUFFER_SIZE: usize = 512 * 1024;

/// In-flight frames allowed per reader in [`copy_multiple_readers`].
const FRAMES_PER_READER: usize = 16;

/// Frame counts of a fan-in copy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CopyCounts {
    pub input: i64,
    pub output: i64,
}

/// Merge every frame of every reader into `writer`, in arrival order.
///
/// Each reader is drained by its own worker thread. The first error, from a
/// reader or from the writer, is returned, but the remaining workers keep reading
/// their inputs to the end (discarding frames) so no upstream producer is left
/// blocked on an abandoned pipe. `counts` is updated even when an error is
/// returned.
///
/// # Errors
/// The first read, decode or write error observed.
pub fn copy_multiple_readers<R, W>(readers: Vec<R>, writer: &mut W, counts: &mut CopyCounts) -> Result<()>
where
    R: Read + Send,
    W: Write + ?Sized,
{
    let cancelled = AtomicBool::new(false);
    let first_error: Mutex<Option<FlowError>> = Mutex::new(None);
    let record = |e: FlowError| {
        cancelled.store(true, Ordering::SeqCst);
        if let Ok(mut slot) = first_error.lock()
            && slot.is_none()
        {
            *slot = Some(e);
        }
    };
    let input = AtomicI64::new(0);
    let (tx, rx) = sync_channel::<Vec<u8>>(FRAMES_PER_READER * readers.len().max(1));

    thread::scope(|s| {
        for mut reader in readers {
            let tx = tx.clone();
            let (cancelled, input, record) = (&cancelled, &input, &record);
            s.spawn(move || {
                let res = process_message(&mut reader, |frame| {
                    input.fetch_add(1, Ordering::Relaxed);
                    if !cancelled.load(Ordering::Relaxed) && tx.send(frame).is_err() {
                        cancelled.store(true, Ordering::SeqCst);
                    }
                    Ok(())
                });
                if let Err(e) = res {
                    record(e);
                }
            });
        }
        drop(tx);

        // the merging side runs here; it keeps receiving after a failure so
        // that senders never block
        for frame in rx {
            if cancelled.load(Ordering::Relaxed) {
                continue;
            }
            match write_message(writer, &frame) {
                Ok(()) => counts.output += 1,
                Err(e) => record(e),
            }
        }
    });

    counts.input = input.load(Ordering::SeqCst);
    match first_error.into_inner() {
        Ok(Some(e)) => Err(e),
        Ok(None) => Ok(()),
        Err(_) => Err(FlowError::Io(io::Error::other("fan-in error slot poisoned"))),
    }
}

fn copy_buffer<R: Read, W: Write>(reader: &mut R, writer: &mut W, written: &mut u64) -> Result<()> {
    let mut buf = vec![0u8; BUFFER_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(FlowError::Io(e)),
        };
        writer.write_all(&buf[..n]).map_err(FlowError::Write)?;
        *written += n as u64;
    }
}

fn report(name: &str, what: &str, err: &FlowError, error_output: &mut dyn Write) {
    // the error output itself failing leaves nothing else to report to
    let _ = writeln!(error_output, "{name}>{what}: {err}");
}

fn finish_stage(
    name: &str,
    what: &str,
    res: Result<()>,
    error_output: &mut dyn Write,
) -> Result<()> {
    match res {
        Ok(()) => Ok(()),
        Err(e) if e.is_broken_pipe() => {
            warn!(stage = name, "{what}: downstream closed early");
            Ok(())
        }
        Err(e) => {
            report(name, what, &e, error_output);
            Err(e)
        }
    }
}

/// Copy all bytes from `reader` to `writer`, then drop (close) `writer`.
///
/// Used to feed a process's stdin: closing it is what tells the process its
/// input is complete.
///
/// # Errors
/// Read or write failures other than a closed destination.
pub fn copy_and_close<R: Read, W: Write>(
    name: &str,
    mut reader: R,
    mut writer: W,
    error_output: &mut dyn Write,
) -> Result<u64> {
    let mut written = 0;
    let res = copy_buffer(&mut reader, &mut writer, &mut written)
        .and_then(|()| writer.flush().map_err(FlowError::Write));
    drop(writer);
    finish_stage(name, &format!("moved {written} bytes"), res, error_output)?;
    debug!(stage = name, bytes = written, "copy finished");
    Ok(written)
}

/// Copy all bytes from `reader` into `writer` without closing it, so several
/// producers can share one destination.
///
/// # Errors
/// Read or write failures other than a closed destination.
pub fn copy_into<R: Read, W: Write + ?Sized>(
    name: &str,
    mut reader: R,
    writer: &mut W,
    error_output: &mut dyn Write,
) -> Result<u64> {
    let mut written = 0;
    let res = copy_buffer(&mut reader, &mut &mut *writer, &mut written);
    finish_stage(name, &format!("read {written} bytes into channel"), res, error_output)?;
    Ok(written)
}

fn escape_field(text: &str, line: &mut String) {
    for c in text.chars() {
        match c {
            '\\' => line.push_str("\\\\"),
            '\t' => line.push_str("\\t"),
            '\n' => line.push_str("\\n"),
            '\r' => line.push_str("\\r"),
            c => line.push(c),
        }
    }
}

fn unescape_field(part: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(part.len());
    let mut bytes = part.iter().copied();
    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match bytes.next() {
            Some(b't') => out.push(b'\t'),
            Some(b'n') => out.push(b'\n'),
            Some(b'r') => out.push(b'\r'),
            Some(b'\\') => out.push(b'\\'),
            // not an escape we write; keep it as is
            Some(other) => out.extend([b'\\', other]),
            None => out.push(b'\\'),
        }
    }
    out
}

fn line_field(part: &[u8]) -> Value {
    let raw = unescape_field(part);
    match String::from_utf8(raw) {
        Ok(s) => Value::Str(s),
        Err(e) => Value::Bytes(e.into_bytes()),
    }
}

fn encode_lines<R: Read, W: Write>(reader: R, writer: W, stats: &mut InstructionStat) -> Result<()> {
    let mut r = BufReader::with_capacity(BUFFER_SIZE, reader);
    let mut w = BufWriter::with_capacity(BUFFER_SIZE, writer);
    let mut line = Vec::new();
    loop {
        line.clear();
        if r.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        stats.input_counter += 1;
        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }
        let fields: Vec<Value> = line.split(|b| *b == b'\t').map(line_field).collect();
        write_row(&mut w, now_ms(), &fields)?;
        stats.output_counter += 1;
    }
    w.flush().map_err(FlowError::Write)
}

/// Turn tab-separated lines into frames, one row per line, timestamped with the
/// current wall-clock time. Fields are strings, or bytes when not valid UTF-8.
///
/// # Errors
/// Read or encode failures, or a write failure other than a closed destination.
pub fn lines_to_frames<R: Read, W: Write>(
    name: &str,
    reader: R,
    writer: W,
    stats: &mut InstructionStat,
    error_output: &mut dyn Write,
) -> Result<()> {
    let res = encode_lines(reader, writer, stats);
    finish_stage(name, "failed to encode lines into frames", res, error_output)
}

/// Decode frames and print each row's fields joined by `delimiter`, followed by
/// `line_end`. The timestamp is not printed. Field text is escaped as described
/// in the module docs; the rendering of nested sequences and bytes is lossy.
///
/// # Errors
/// Decode or write failures.
pub fn print_delimited<R: Read, W: Write>(
    stats: &mut InstructionStat,
    mut reader: R,
    writer: &mut W,
    delimiter: &str,
    line_end: &str,
) -> Result<()> {
    while let Some(payload) = read_message(&mut reader)? {
        stats.input_counter += 1;
        let row = crate::codec::decode_row(&payload)?;
        let mut line = String::new();
        for (i, field) in row.fields.iter().enumerate() {
            if i > 0 {
                line.push_str(delimiter);
            }
            escape_field(&field.to_string(), &mut line);
        }
        line.push_str(line_end);
        writer.write_all(line.as_bytes()).map_err(FlowError::Write)?;
        stats.output_counter += 1;
    }
    writer.flush().map_err(FlowError::Write)
}

/// Turn frames into tab-separated, newline-terminated lines and close `writer`.
///
/// # Errors
/// Decode failures, or a write failure other than a closed destination.
pub fn frames_to_lines<R: Read, W: Write>(
    name: &str,
    reader: R,
    writer: W,
    stats: &mut InstructionStat,
    error_output: &mut dyn Write,
) -> Result<()> {
    let mut w = BufWriter::with_capacity(BUFFER_SIZE, writer);
    let res = print_delimited(stats, BufReader::with_capacity(BUFFER_SIZE, reader), &mut w, "\t", "\n");
    drop(w);
    finish_stage(name, "failed to decode frames into lines", res, error_output)
}

/// Pipe rows through a line-oriented process.
///
/// `input` frames are rendered as text into `process_stdin` on a helper thread
/// (which closes it when done); the process's `process_stdout` lines are turned
/// back into frames on `output`. The process itself (spawning, waiting) stays
/// with the caller. `stats.input_counter` counts rows fed in and
/// `stats.output_counter` rows produced.
///
/// # Errors
/// Decode/encode failures on either side. A process that stops reading early is
/// not an error.
pub fn pipe_through_lines<R, W, I, O>(
    name: &str,
    input: R,
    output: W,
    process_stdin: I,
    process_stdout: O,
    stats: &mut InstructionStat,
    error_output: &mut dyn Write,
) -> Result<()>
where
    R: Read + Send,
    W: Write,
    I: Write + Send,
    O: Read,
{
    let (fed, read_back) = thread::scope(|s| {
        let feeder = s.spawn(move || {
            let mut feed_stats = InstructionStat::default();
            let mut sink = Vec::new();
            let res = frames_to_lines(name, input, process_stdin, &mut feed_stats, &mut sink);
            (feed_stats, res, sink)
        });
        let mut out_stats = InstructionStat::default();
        let read_back = lines_to_frames(name, process_stdout, output, &mut out_stats, error_output);
        let fed = feeder
            .join()
            .unwrap_or_else(|_| (InstructionStat::default(), Err(FlowError::Io(io::Error::other("feeder panicked"))), Vec::new()));
        ((fed, out_stats.output_counter), read_back)
    });
    let ((feed_stats, feed_res, feed_report), produced) = fed;
    stats.input_counter += feed_stats.input_counter;
    stats.output_counter += produced;
    if !feed_report.is_empty() {
        let _ = error_output.write_all(&feed_report);
    }
    feed_res.and(read_back)
}

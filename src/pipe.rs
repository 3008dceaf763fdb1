//! Bounded in-memory byte pipes connecting instruction stages.
//!
//! [`pipe`] returns a connected [`PipeWriter`] / [`PipeReader`] pair backed by a
//! bounded channel of byte chunks. A writer blocks once `capacity` chunks are in
//! flight, so a slow consumer throttles its producer instead of letting buffers
//! grow. Dropping the writer is end-of-stream for the reader; dropping the reader
//! turns further writes into [`ErrorKind::BrokenPipe`].
//!
//! [`TeeWriter`] copies every write to several downstream writers and is how a
//! dataset shard read by more than one step is fanned out. Its branches are
//! [`spool`]s: unbounded, so one branch that is not being read yet (the right
//! side of a hash join while the left is loaded) cannot stall its siblings.

use std::io::{self, ErrorKind, Read, Write};
use std::sync::mpsc::{Receiver, Sender, SyncSender, channel, sync_channel};

/// Create a pipe holding at most `capacity` unread chunks (minimum 1).
#[must_use]
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = sync_channel(capacity.max(1));
    (PipeWriter { tx: Chunks::Bounded(tx) }, PipeReader::new(rx))
}

/// Create a pipe whose writer never blocks; unread chunks queue in memory.
#[must_use]
pub fn spool() -> (PipeWriter, PipeReader) {
    let (tx, rx) = channel();
    (PipeWriter { tx: Chunks::Unbounded(tx) }, PipeReader::new(rx))
}

enum Chunks {
    Bounded(SyncSender<Vec<u8>>),
    Unbounded(Sender<Vec<u8>>),
}

pub struct PipeWriter {
    tx: Chunks,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let sent = match &self.tx {
            Chunks::Bounded(tx) => tx.send(buf.to_vec()).is_ok(),
            Chunks::Unbounded(tx) => tx.send(buf.to_vec()).is_ok(),
        };
        if !sent {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "pipe reader closed"));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct PipeReader {
    rx: Receiver<Vec<u8>>,
    chunk: Vec<u8>,
    pos: usize,
}

impl PipeReader {
    fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            chunk: Vec::new(),
            pos: 0,
        }
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.chunk.len() {
            match self.rx.recv() {
                Ok(next) => {
                    self.chunk = next;
                    self.pos = 0;
                }
                // all writers dropped
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.chunk.len() - self.pos);
        buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Duplicates every write to all of its outputs.
pub struct TeeWriter<W> {
    outputs: Vec<W>,
}

impl<W: Write> TeeWriter<W> {
    #[must_use]
    pub fn new(outputs: Vec<W>) -> Self {
        Self { outputs }
    }
}

impl<W: Write> Write for TeeWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for out in &mut self.outputs {
            out.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.outputs.iter_mut().try_for_each(Write::flush)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn reader_sees_eof_after_writer_drops() {
        let (mut w, mut r) = pipe(2);
        let h = thread::spawn(move || {
            w.write_all(b"hello ").unwrap();
            w.write_all(b"world").unwrap();
        });
        let mut out = String::new();
        r.read_to_string(&mut out).unwrap();
        h.join().unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn write_after_reader_drop_is_broken_pipe() {
        let (mut w, r) = pipe(1);
        drop(r);
        let err = w.write_all(b"x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrokenPipe);
    }

    #[test]
    fn spool_never_blocks_the_writer() {
        let (mut w, mut r) = spool();
        for _ in 0..1000 {
            w.write_all(b"abc").unwrap();
        }
        drop(w);
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), 3000);
    }
}

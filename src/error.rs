//! Error taxonomy shared by the wire codec, the instructions, the DAG builder
//! and the local runner.
//!
//! Classification:
//! - [`FlowError::Decode`]: malformed frame length, truncated payload, undecodable
//!   object, or a key index that does not exist in the row. Always fatal to the
//!   instruction invocation.
//! - [`FlowError::Write`]: the destination stream is closed or failed.
//! - [`FlowError::Topology`]: a pipeline-builder programming error caught while
//!   constructing steps (mismatched shard counts, datasets of different flows).
//! - [`FlowError::Task`]: the runner's report for a failed task, carrying the step
//!   name and its counters at the point of failure.

use std::io;
use thiserror::Error;

/// Maximum number of raw bytes rendered into a decode error message.
const RAW_PREVIEW: usize = 64;

#[derive(Debug, Error)]
pub enum FlowError {
    /// A frame or object could not be decoded. `raw` holds the offending bytes.
    #[error("decode error: {reason}: {}", preview(raw))]
    Decode { reason: String, raw: Vec<u8> },

    /// A value could not be encoded into the wire format.
    #[error("encode error: {0}")]
    Encode(String),

    /// Writing to a destination stream failed.
    #[error("write error: {0}")]
    Write(#[source] io::Error),

    /// Inconsistent step wiring or dataset metadata detected while building a flow.
    #[error("topology error: {0}")]
    Topology(String),

    /// Invalid configuration values.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Reading from a source stream failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// An instruction descriptor could not be rehydrated or executed.
    #[error("instruction {name}: {reason}")]
    Instruction { name: String, reason: String },

    /// A task of a step failed while running.
    #[error("step {step} task {task} failed (input={input}, output={output}): {source}")]
    Task {
        step: String,
        task: usize,
        input: i64,
        output: i64,
        #[source]
        source: Box<FlowError>,
    },
}

pub type Result<T> = std::result::Result<T, FlowError>;

impl FlowError {
    pub(crate) fn decode(reason: impl Into<String>, raw: &[u8]) -> Self {
        Self::Decode {
            reason: reason.into(),
            raw: raw.to_vec(),
        }
    }

    pub(crate) fn instruction(name: &str, reason: impl Into<String>) -> Self {
        Self::Instruction {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// True when the error only means the other end of a pipe went away.
    ///
    /// Such errors are the echo of a downstream consumer that finished early
    /// (a limit, a failed sibling) and are not root causes.
    #[must_use]
    pub fn is_broken_pipe(&self) -> bool {
        match self {
            Self::Write(e) | Self::Io(e) => e.kind() == io::ErrorKind::BrokenPipe,
            Self::Task { source, .. } => source.is_broken_pipe(),
            _ => false,
        }
    }
}

fn preview(raw: &[u8]) -> String {
    if raw.len() <= RAW_PREVIEW {
        format!("{raw:?}")
    } else {
        format!("{:?}.. ({} bytes)", &raw[..RAW_PREVIEW], raw.len())
    }
}

//! Wire form of an instruction instance.

use crate::error::{FlowError, Result};
use crate::instruction::order::OrderBy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Bumped whenever a parameter shape changes incompatibly.
pub const DESCRIPTOR_VERSION: u32 = 1;

/// Name plus construction parameters of one instruction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstructionDescriptor {
    pub name: String,
    pub version: u32,
    pub params: InstructionParams,
}

/// Parameters, one shape per family of instructions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionParams {
    /// Instructions configured only by their stream counts.
    Empty,
    Indexes {
        indexes: Vec<usize>,
    },
    OrderBys {
        order_bys: Vec<OrderBy>,
    },
    LocalSort {
        order_bys: Vec<OrderBy>,
        memory_mb: i64,
        spill_dir: Option<PathBuf>,
    },
    LocalTop {
        n: i32,
        order_bys: Vec<OrderBy>,
    },
    LocalLimit {
        n: usize,
        offset: usize,
    },
    Function {
        id: String,
    },
    Reduce {
        id: String,
        indexes: Vec<usize>,
    },
    Frames {
        frames: Vec<Vec<u8>>,
    },
}

impl InstructionDescriptor {
    #[must_use]
    pub fn new(name: &str, params: InstructionParams) -> Self {
        Self {
            name: name.to_string(),
            version: DESCRIPTOR_VERSION,
            params,
        }
    }

    /// # Errors
    /// [`FlowError::Encode`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| FlowError::Encode(e.to_string()))
    }

    /// # Errors
    /// [`FlowError::Decode`] for malformed JSON or an unsupported version.
    pub fn from_json(s: &str) -> Result<Self> {
        let d: Self = serde_json::from_str(s)
            .map_err(|e| FlowError::decode(format!("instruction descriptor: {e}"), s.as_bytes()))?;
        d.check_version(s.as_bytes())
    }

    /// Compact binary form.
    ///
    /// # Errors
    /// [`FlowError::Encode`] if serialization fails.
    #[cfg(feature = "binary-descriptors")]
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        postcard::to_allocvec(self).map_err(|e| FlowError::Encode(e.to_string()))
    }

    /// # Errors
    /// [`FlowError::Decode`] for malformed bytes or an unsupported version.
    #[cfg(feature = "binary-descriptors")]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let d: Self = postcard::from_bytes(bytes)
            .map_err(|e| FlowError::decode(format!("instruction descriptor: {e}"), bytes))?;
        d.check_version(bytes)
    }

    fn check_version(self, raw: &[u8]) -> Result<Self> {
        if self.version == DESCRIPTOR_VERSION {
            Ok(self)
        } else {
            Err(FlowError::decode(
                format!(
                    "descriptor {} has version {}, expected {DESCRIPTOR_VERSION}",
                    self.name, self.version
                ),
                raw,
            ))
        }
    }

    /// Error for a descriptor whose parameters do not fit its name.
    pub(crate) fn mismatch(&self) -> FlowError {
        FlowError::instruction(&self.name, format!("unexpected parameters {:?}", self.params))
    }
}

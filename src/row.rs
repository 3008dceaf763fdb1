//! A single record: a millisecond timestamp plus ordered field values.

use crate::error::{FlowError, Result};
use crate::value::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub type TimestampMs = i64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    pub ts: TimestampMs,
    pub fields: Vec<Value>,
}

impl Row {
    #[must_use]
    pub fn new(ts: TimestampMs, fields: Vec<Value>) -> Self {
        Self { ts, fields }
    }

    /// Project the row onto 1-based `indexes`.
    ///
    /// # Errors
    /// Returns [`FlowError::Decode`] when an index is `0` or past the last field.
    pub fn key(&self, indexes: &[usize]) -> Result<Vec<Value>> {
        indexes
            .iter()
            .map(|&i| {
                i.checked_sub(1)
                    .and_then(|at| self.fields.get(at))
                    .cloned()
                    .ok_or_else(|| {
                        FlowError::decode(
                            format!("key index {i} out of range for {} fields", self.fields.len()),
                            &[],
                        )
                    })
            })
            .collect()
    }
}

/// Current wall-clock time in milliseconds.
#[must_use]
pub fn now_ms() -> TimestampMs {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as TimestampMs)
        .unwrap_or_default()
}

/// Build a [`Row`] from a timestamp and field expressions convertible into [`Value`].
///
/// ```
/// use shardflow::{row, Value};
/// let r = row![7; "a", 1];
/// assert_eq!(r.ts, 7);
/// assert_eq!(r.fields, vec![Value::from("a"), Value::from(1)]);
/// ```
#[macro_export]
macro_rules! row {
    ($ts:expr; $($field:expr),* $(,)?) => {
        $crate::Row::new($ts, vec![$($crate::Value::from($field)),*])
    };
}

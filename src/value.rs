//! Dynamically typed row fields.
//!
//! A [`Value`] is a tagged union over the scalar kinds the wire format can carry
//! (nil, booleans, integers, floats, strings, raw bytes) plus nested sequences for
//! grouped and co-grouped results.
//!
//! # Ordering
//! `Value` has a **total** order so it can drive sorting, merging, top-k and
//! grouping across mixed types:
//! - two numbers compare numerically (integers exactly, floats via `total_cmp`);
//! - two strings/byte strings compare bytewise;
//! - sequences compare lexicographically;
//! - when the above finds the values equal, or the kinds are unrelated, the type
//!   tag decides (`Nil < Bool < Integer < Float < Str < Bytes < Seq`).
//!
//! Signed and unsigned integers share one tag: `Int(5) == UInt(5)`, matching the
//! fact that both encode to the same bytes on the wire.

use crate::error::{FlowError, Result};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter, Result as FormatResult};

#[derive(Clone, Debug)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    /// Only produced for values above `i64::MAX`; smaller unsigned values decode as `Int`.
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Seq(Vec<Value>),
}

impl Value {
    fn tag(&self) -> u8 {
        match self {
            Self::Nil => 0,
            Self::Bool(_) => 1,
            Self::Int(_) | Self::UInt(_) => 2,
            Self::Float(_) => 3,
            Self::Str(_) => 4,
            Self::Bytes(_) => 5,
            Self::Seq(_) => 6,
        }
    }

    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::UInt(u) => Some(*u as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// String view of `Str`, or of `Bytes` holding valid UTF-8.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Str(s) => Some(s.as_bytes()),
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Self::Seq(v) => Some(v),
            _ => None,
        }
    }

    /// Append the msgpack encoding of this value to `buf`.
    ///
    /// # Errors
    /// Fails only for sequences longer than `u32::MAX` elements.
    pub fn write_msgpack(&self, buf: &mut Vec<u8>) -> Result<()> {
        fn enc<E: Display>(e: E) -> FlowError {
            FlowError::Encode(e.to_string())
        }
        match self {
            Self::Nil => rmp::encode::write_nil(buf).map_err(enc)?,
            Self::Bool(b) => rmp::encode::write_bool(buf, *b).map_err(enc)?,
            Self::Int(i) => {
                rmp::encode::write_sint(buf, *i).map_err(enc)?;
            }
            Self::UInt(u) => {
                rmp::encode::write_uint(buf, *u).map_err(enc)?;
            }
            Self::Float(f) => rmp::encode::write_f64(buf, *f).map_err(enc)?,
            Self::Str(s) => rmp::encode::write_str(buf, s).map_err(enc)?,
            Self::Bytes(b) => rmp::encode::write_bin(buf, b).map_err(enc)?,
            Self::Seq(items) => {
                let len = u32::try_from(items.len())
                    .map_err(|_| FlowError::Encode(format!("sequence too long: {}", items.len())))?;
                rmp::encode::write_array_len(buf, len).map_err(enc)?;
                for item in items {
                    item.write_msgpack(buf)?;
                }
            }
        }
        Ok(())
    }

    /// Decode one msgpack object from the front of `rd`, advancing it.
    ///
    /// # Errors
    /// Returns [`FlowError::Decode`] for truncated input or ext types.
    pub fn read_msgpack(rd: &mut &[u8]) -> Result<Value> {
        let start = *rd;
        let raw = rmpv::decode::read_value(rd)
            .map_err(|e| FlowError::decode(format!("invalid msgpack object: {e}"), start))?;
        Self::from_msgpack(raw).map_err(|reason| FlowError::decode(reason, start))
    }

    fn from_msgpack(raw: rmpv::Value) -> std::result::Result<Value, String> {
        Ok(match raw {
            rmpv::Value::Nil => Self::Nil,
            rmpv::Value::Boolean(b) => Self::Bool(b),
            rmpv::Value::Integer(i) => match (i.as_i64(), i.as_u64()) {
                (Some(v), _) => Self::Int(v),
                (None, Some(v)) => Self::UInt(v),
                (None, None) => return Err(format!("integer out of range: {i}")),
            },
            rmpv::Value::F32(f) => Self::Float(f64::from(f)),
            rmpv::Value::F64(f) => Self::Float(f),
            rmpv::Value::String(s) => {
                if s.is_str() {
                    Self::Str(s.into_str().unwrap_or_default())
                } else {
                    Self::Bytes(s.into_bytes())
                }
            }
            rmpv::Value::Binary(b) => Self::Bytes(b),
            rmpv::Value::Array(items) => Self::Seq(
                items
                    .into_iter()
                    .map(Self::from_msgpack)
                    .collect::<std::result::Result<_, _>>()?,
            ),
            // maps become a sequence of [key, value] pairs
            rmpv::Value::Map(pairs) => Self::Seq(
                pairs
                    .into_iter()
                    .map(|(k, v)| Ok(Self::Seq(vec![Self::from_msgpack(k)?, Self::from_msgpack(v)?])))
                    .collect::<std::result::Result<_, String>>()?,
            ),
            rmpv::Value::Ext(kind, _) => return Err(format!("unsupported msgpack ext type {kind}")),
        })
    }
}

fn cmp_numbers(a: &Value, b: &Value) -> Ordering {
    use Value::{Float, Int, UInt};
    match (a, b) {
        (Int(x), Int(y)) => x.cmp(y),
        (UInt(x), UInt(y)) => x.cmp(y),
        (Int(x), UInt(y)) => i128::from(*x).cmp(&i128::from(*y)),
        (UInt(x), Int(y)) => i128::from(*x).cmp(&i128::from(*y)),
        (Float(x), Float(y)) => x.total_cmp(y),
        _ => {
            let (x, y) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            x.total_cmp(&y)
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        let (ta, tb) = (self.tag(), other.tag());
        let primary = match (self, other) {
            (Self::Bool(x), Self::Bool(y)) => x.cmp(y),
            (Self::Seq(x), Self::Seq(y)) => x.cmp(y),
            _ if (2..=3).contains(&ta) && (2..=3).contains(&tb) => cmp_numbers(self, other),
            _ if (4..=5).contains(&ta) && (4..=5).contains(&tb) => {
                self.as_bytes().cmp(&other.as_bytes())
            }
            _ => Ordering::Equal,
        };
        primary.then(ta.cmp(&tb))
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

/// Text form used when rows are handed to line-oriented processes.
///
/// Nil renders empty, bytes render as lossy UTF-8 and sequences as `[a,b,c]`.
impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        match self {
            Self::Nil => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::UInt(u) => write!(f, "{u}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
            Self::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            Self::Seq(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or(Self::UInt(v), Self::Int)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Self::from(v as u64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::Seq(v)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Self::Nil
    }
}

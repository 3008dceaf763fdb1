//! Row wire protocol.
//!
//! On a byte stream every row travels as one **frame**:
//!
//! ```text
//! frame   := length (4 bytes, big-endian, unsigned) || payload (length bytes)
//! payload := msgpack(timestamp) msgpack(field_1) ... msgpack(field_k)
//! ```
//!
//! The payload is not a msgpack array: it is a run of consecutive objects, each
//! self-describing, decoded one at a time until the payload is exhausted. This is
//! what lets scripting bindings and external collaborators read and write rows
//! without knowing the field count up front.
//!
//! Key projection helpers ([`decode_row_keys`], [`decode_row_keys_values`]) stop
//! materializing objects once they have what the caller asked for, and
//! [`encode_keys`] gives the byte-string form of a key: two keys are equal for
//! hashing purposes iff their encodings are equal.

use crate::error::{FlowError, Result};
use crate::row::{Row, TimestampMs};
use crate::value::Value;
use std::io::{ErrorKind, Read, Write};

/// Frames larger than this are treated as a corrupt length prefix.
pub const MAX_FRAME_LEN: u32 = 1 << 30;

/// Write one raw frame payload with its length prefix.
///
/// # Errors
/// [`FlowError::Write`] if the destination fails or is closed.
pub fn write_message<W: Write + ?Sized>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|l| *l <= MAX_FRAME_LEN)
        .ok_or_else(|| FlowError::Encode(format!("frame too large: {} bytes", payload.len())))?;
    writer.write_all(&len.to_be_bytes()).map_err(FlowError::Write)?;
    writer.write_all(payload).map_err(FlowError::Write)
}

/// Read one raw frame payload.
///
/// Returns `Ok(None)` at a clean end of stream (no bytes of a new frame read).
///
/// # Errors
/// [`FlowError::Decode`] for a partial length prefix, an oversized length, or a
/// payload cut short by end of stream; [`FlowError::Io`] for other read failures.
pub fn read_message<R: Read + ?Sized>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut prefix = [0u8; 4];
    let mut got = 0;
    while got < prefix.len() {
        match reader.read(&mut prefix[got..]) {
            Ok(0) if got == 0 => return Ok(None),
            Ok(0) => return Err(FlowError::decode("truncated length prefix", &prefix[..got])),
            Ok(n) => got += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(FlowError::Io(e)),
        }
    }
    let len = u32::from_be_bytes(prefix);
    if len > MAX_FRAME_LEN {
        return Err(FlowError::decode(format!("malformed frame length {len}"), &prefix));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            FlowError::decode(format!("truncated frame, expected {len} bytes"), &prefix)
        } else {
            FlowError::Io(e)
        }
    })?;
    Ok(Some(payload))
}

/// Feed every frame payload of `reader` to `f` until end of stream.
///
/// Stops at the first error from either the stream or the callback.
///
/// # Errors
/// Propagates read/decode errors and whatever `f` returns.
pub fn process_message<R, F>(reader: &mut R, mut f: F) -> Result<()>
where
    R: Read + ?Sized,
    F: FnMut(Vec<u8>) -> Result<()>,
{
    while let Some(payload) = read_message(reader)? {
        f(payload)?;
    }
    Ok(())
}

/// Encode a timestamp and fields into a frame payload (without the length prefix).
///
/// # Errors
/// [`FlowError::Encode`] if a value cannot be represented.
pub fn encode_row(ts: TimestampMs, fields: &[Value]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(16 + fields.len() * 8);
    Value::Int(ts).write_msgpack(&mut buf)?;
    for field in fields {
        field.write_msgpack(&mut buf)?;
    }
    Ok(buf)
}

/// Encode and write one row as a frame.
///
/// # Errors
/// Encoding or write failures.
pub fn write_row<W: Write + ?Sized>(writer: &mut W, ts: TimestampMs, fields: &[Value]) -> Result<()> {
    let payload = encode_row(ts, fields)?;
    write_message(writer, &payload)
}

fn read_timestamp(rd: &mut &[u8], payload: &[u8]) -> Result<TimestampMs> {
    if rd.is_empty() {
        return Err(FlowError::decode("missing timestamp", payload));
    }
    Value::read_msgpack(rd)?
        .as_i64()
        .ok_or_else(|| FlowError::decode("timestamp is not an int64", payload))
}

/// Decode a full frame payload.
///
/// # Errors
/// [`FlowError::Decode`] when the payload is not a timestamp followed by valid objects.
pub fn decode_row(payload: &[u8]) -> Result<Row> {
    let mut rd = payload;
    let ts = read_timestamp(&mut rd, payload)?;
    let mut fields = Vec::new();
    while !rd.is_empty() {
        fields.push(Value::read_msgpack(&mut rd)?);
    }
    Ok(Row::new(ts, fields))
}

/// Read and decode the next row; `Ok(None)` at end of stream.
///
/// # Errors
/// Frame or payload decode errors.
pub fn read_row<R: Read + ?Sized>(reader: &mut R) -> Result<Option<Row>> {
    read_message(reader)?.map(|p| decode_row(&p)).transpose()
}

fn check_indexes(indexes: &[usize], payload: &[u8]) -> Result<()> {
    if indexes.contains(&0) {
        return Err(FlowError::decode("key indexes are 1-based, got 0", payload));
    }
    Ok(())
}

fn project(fields: &[Value], indexes: &[usize], payload: &[u8]) -> Result<Vec<Value>> {
    indexes
        .iter()
        .map(|&i| {
            fields.get(i - 1).cloned().ok_or_else(|| {
                FlowError::decode(
                    format!("key index {i} out of range for {} fields", fields.len()),
                    payload,
                )
            })
        })
        .collect()
}

/// Decode only the timestamp and the key fields named by 1-based `indexes`.
///
/// Objects after the highest requested index are never decoded.
///
/// # Errors
/// [`FlowError::Decode`] for malformed payloads or out-of-range indexes.
pub fn decode_row_keys(payload: &[u8], indexes: &[usize]) -> Result<(TimestampMs, Vec<Value>)> {
    check_indexes(indexes, payload)?;
    let mut rd = payload;
    let ts = read_timestamp(&mut rd, payload)?;
    let last = indexes.iter().copied().max().unwrap_or(0);
    let mut fields = Vec::with_capacity(last);
    while fields.len() < last && !rd.is_empty() {
        fields.push(Value::read_msgpack(&mut rd)?);
    }
    Ok((ts, project(&fields, indexes, payload)?))
}

/// Decode the timestamp, the key fields, and the remaining (non-key) fields in
/// their original order.
///
/// # Errors
/// [`FlowError::Decode`] for malformed payloads or out-of-range indexes.
pub fn decode_row_keys_values(
    payload: &[u8],
    indexes: &[usize],
) -> Result<(TimestampMs, Vec<Value>, Vec<Value>)> {
    check_indexes(indexes, payload)?;
    let row = decode_row(payload)?;
    let keys = project(&row.fields, indexes, payload)?;
    let values = row
        .fields
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !indexes.contains(&(i + 1)))
        .map(|(_, v)| v)
        .collect();
    Ok((row.ts, keys, values))
}

/// Byte-string form of a key, usable as a hash-map key.
///
/// # Errors
/// [`FlowError::Encode`] if a value cannot be represented.
pub fn encode_keys(keys: &[Value]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(keys.len() * 8);
    for key in keys {
        key.write_msgpack(&mut buf)?;
    }
    Ok(buf)
}

/// Deterministic 32-bit hash of a key (CRC-32 of its encoding), stable across
/// processes and platforms.
///
/// # Errors
/// [`FlowError::Encode`] if a value cannot be represented.
pub fn hash_keys(keys: &[Value]) -> Result<u32> {
    Ok(crc32fast::hash(&encode_keys(keys)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_a_run_of_objects_not_an_array() {
        let payload = encode_row(1, &[Value::from("a"), Value::from(2)]).unwrap();
        // positive fixint 1, fixstr "a", positive fixint 2
        assert_eq!(payload, vec![0x01, 0xa1, b'a', 0x02]);
    }

    #[test]
    fn key_decoding_stops_at_highest_index() {
        let mut payload = encode_row(5, &[Value::from(9)]).unwrap();
        // a truncated fixstr after the key field is never looked at
        payload.push(0xa5);
        let (ts, keys) = decode_row_keys(&payload, &[1]).unwrap();
        assert_eq!(ts, 5);
        assert_eq!(keys, vec![Value::from(9)]);
        assert!(decode_row(&payload).is_err());
    }

    #[test]
    fn zero_index_is_rejected() {
        let payload = encode_row(0, &[Value::from(1)]).unwrap();
        assert!(matches!(
            decode_row_keys(&payload, &[0]),
            Err(FlowError::Decode { .. })
        ));
    }
}

//! Compact tagged binary encoding of [`Value`].
//!
//! ```text
//! [u8 tag][payload]
//!   0 null    (no payload)
//!   1 bool    u8
//!   2 int     i64 LE
//!   3 float   f64 LE
//!   4 string  UTF-8 bytes (rest of the blob)
//!   5 bytes   raw bytes (rest of the blob)
//!   6 list    u32 LE count, then per element: u32 LE length + element blob
//! ```
//!
//! Lists nest at most 128 levels deep in either direction.

use super::{Value, ValueCodec};
use crate::error::{IntercomError, Result};

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_STR: u8 = 4;
const TAG_BYTES: u8 = 5;
const TAG_LIST: u8 = 6;

/// Deepest list nesting accepted, matching serde_json's recursion limit.
const MAX_DEPTH: usize = 128;

/// Default value codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

fn codec_error(message: impl Into<String>) -> IntercomError {
    IntercomError::Codec {
        message: message.into(),
    }
}

fn fixed<const N: usize>(payload: &[u8], what: &str) -> Result<[u8; N]> {
    payload.try_into().map_err(|_| {
        codec_error(format!(
            "{} payload must be {} bytes, got {}",
            what,
            N,
            payload.len()
        ))
    })
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> Result<usize> {
    let end = *pos + 4;
    let raw = bytes
        .get(*pos..end)
        .ok_or_else(|| codec_error("truncated list length"))?;
    *pos = end;
    Ok(u32::from_le_bytes(fixed::<4>(raw, "length")?) as usize)
}

impl BinaryCodec {
    fn encode_into(&self, value: &Value, out: &mut Vec<u8>, depth: usize) -> Result<()> {
        match value {
            Value::Null => out.push(TAG_NULL),
            Value::Bool(b) => {
                out.push(TAG_BOOL);
                out.push(u8::from(*b));
            }
            Value::Int(i) => {
                out.push(TAG_INT);
                out.extend_from_slice(&i.to_le_bytes());
            }
            Value::Float(f) => {
                out.push(TAG_FLOAT);
                out.extend_from_slice(&f.to_le_bytes());
            }
            Value::Str(s) => {
                out.push(TAG_STR);
                out.extend_from_slice(s.as_bytes());
            }
            Value::Bytes(b) => {
                out.push(TAG_BYTES);
                out.extend_from_slice(b);
            }
            Value::List(items) => {
                if depth >= MAX_DEPTH {
                    return Err(codec_error(format!("list nests deeper than {}", MAX_DEPTH)));
                }
                let count = u32::try_from(items.len())
                    .map_err(|_| codec_error("list has too many elements"))?;
                out.push(TAG_LIST);
                out.extend_from_slice(&count.to_le_bytes());
                for item in items {
                    let mut element = Vec::new();
                    self.encode_into(item, &mut element, depth + 1)?;
                    let len = u32::try_from(element.len())
                        .map_err(|_| codec_error("list element is too large"))?;
                    out.extend_from_slice(&len.to_le_bytes());
                    out.extend_from_slice(&element);
                }
            }
        }
        Ok(())
    }

    fn decode_at(&self, bytes: &[u8], depth: usize) -> Result<Value> {
        let (&tag, payload) = bytes
            .split_first()
            .ok_or_else(|| codec_error("empty value blob"))?;

        match tag {
            TAG_NULL if payload.is_empty() => Ok(Value::Null),
            TAG_NULL => Err(codec_error("null carries no payload")),
            TAG_BOOL => match fixed::<1>(payload, "bool")? {
                [0] => Ok(Value::Bool(false)),
                [1] => Ok(Value::Bool(true)),
                [other] => Err(codec_error(format!("invalid bool byte {}", other))),
            },
            TAG_INT => Ok(Value::Int(i64::from_le_bytes(fixed(payload, "int")?))),
            TAG_FLOAT => Ok(Value::Float(f64::from_le_bytes(fixed(payload, "float")?))),
            TAG_STR => String::from_utf8(payload.to_vec())
                .map(Value::Str)
                .map_err(|e| codec_error(format!("string is not UTF-8: {}", e))),
            TAG_BYTES => Ok(Value::Bytes(payload.to_vec())),
            TAG_LIST => {
                if depth >= MAX_DEPTH {
                    return Err(codec_error(format!("list nests deeper than {}", MAX_DEPTH)));
                }
                let mut pos = 0;
                let count = read_u32(payload, &mut pos)?;
                let mut items = Vec::with_capacity(count.min(payload.len()));
                for _ in 0..count {
                    let len = read_u32(payload, &mut pos)?;
                    let end = pos
                        .checked_add(len)
                        .filter(|end| *end <= payload.len())
                        .ok_or_else(|| codec_error("truncated list element"))?;
                    items.push(self.decode_at(&payload[pos..end], depth + 1)?);
                    pos = end;
                }
                if pos != payload.len() {
                    return Err(codec_error("trailing bytes after list"));
                }
                Ok(Value::List(items))
            }
            other => Err(codec_error(format!("unknown type tag {}", other))),
        }
    }
}

impl ValueCodec for BinaryCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_into(value, &mut out, 0)?;
        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        self.decode_at(bytes, 0)
    }
}

//! One remote call: a method name plus its ordered arguments.
//!
//! ```text
//! [u8: name_len][UTF-8 name (name_len bytes, 0 = no name)]
//! [u8: arg_count]
//! arg_count x [i32 LE: arg_len][arg_len bytes from the value codec]
//! ```

use crate::codec::{Value, ValueCodec};
use crate::config::ChannelConfig;
use crate::error::{IntercomError, Result};

/// A decoded or pending remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    method: String,
    args: Vec<Value>,
}

impl Invocation {
    /// Create an invocation, enforcing the limits of the u8 length prefixes.
    pub fn new(method: impl Into<String>, args: Vec<Value>) -> Result<Self> {
        let method = method.into();
        if method.len() > ChannelConfig::MAX_METHOD_NAME_LEN {
            return Err(IntercomError::InvalidInvocation {
                message: format!(
                    "method name is {} bytes, limit is {}",
                    method.len(),
                    ChannelConfig::MAX_METHOD_NAME_LEN
                ),
            });
        }
        if args.len() > ChannelConfig::MAX_ARGUMENTS {
            return Err(IntercomError::InvalidInvocation {
                message: format!(
                    "{} takes {} arguments, limit is {}",
                    method,
                    args.len(),
                    ChannelConfig::MAX_ARGUMENTS
                ),
            });
        }
        Ok(Self { method, args })
    }

    /// Method name. Empty when the sender supplied no name.
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.method, self.args)
    }

    /// Serialize to the invocation wire layout.
    pub fn encode(&self, codec: &dyn ValueCodec) -> Result<Vec<u8>> {
        let name = self.method.as_bytes();
        let mut out = Vec::with_capacity(2 + name.len());

        // Lengths were checked in `new`
        out.push(name.len() as u8);
        out.extend_from_slice(name);
        out.push(self.args.len() as u8);

        for arg in &self.args {
            let blob = codec.encode(arg)?;
            let len = i32::try_from(blob.len()).map_err(|_| IntercomError::InvalidInvocation {
                message: format!("argument of {} is {} bytes", self.method, blob.len()),
            })?;
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(&blob);
        }

        Ok(out)
    }

    /// Parse the invocation wire layout.
    ///
    /// Truncation, negative lengths, trailing bytes and non-UTF-8 names are
    /// framing errors. A blob the codec rejects is a codec error.
    pub fn decode(bytes: &[u8], codec: &dyn ValueCodec) -> Result<Self> {
        let mut reader = SliceReader { bytes, pos: 0 };

        let name_len = reader.u8("method name length")? as usize;
        let name = reader.take(name_len, "method name")?;
        let method = std::str::from_utf8(name)
            .map_err(|e| IntercomError::framing(format!("method name is not UTF-8: {}", e)))?
            .to_string();

        let arg_count = reader.u8("argument count")? as usize;
        let mut args = Vec::with_capacity(arg_count);
        for index in 0..arg_count {
            let len = reader.i32("argument length")?;
            let len = usize::try_from(len).map_err(|_| {
                IntercomError::framing(format!("argument {} has negative length {}", index, len))
            })?;
            let blob = reader.take(len, "argument bytes")?;
            args.push(codec.decode(blob)?);
        }

        if reader.pos != bytes.len() {
            return Err(IntercomError::framing(format!(
                "{} trailing bytes after invocation {}",
                bytes.len() - reader.pos,
                method
            )));
        }

        Ok(Self { method, args })
    }
}

struct SliceReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                IntercomError::framing(format!(
                    "{} needs {} bytes at offset {}, invocation is {} bytes",
                    what,
                    len,
                    self.pos,
                    self.bytes.len()
                ))
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn i32(&mut self, what: &str) -> Result<i32> {
        let raw = self.take(4, what)?;
        Ok(i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }
}

//! Batch framing for an outbox region.
//!
//! A batch is everything one side flushed on a single poll, tagged with a
//! random correlation id so the reader can tell it apart from the batch it
//! consumed last.
//!
//! ```text
//! [i64 LE: correlation id]
//! [i32 LE: invocation count]
//! count x [i32 LE: invocation length][invocation bytes]
//! ```
//!
//! The writer publishes the body (count and invocations) before the id, so a
//! reader that observes a new id also observes the complete body.

use crate::config::ChannelConfig;
use crate::error::{IntercomError, Result};
use crate::region::Region;

/// Random-access byte storage a batch can be decoded from.
pub trait ByteSource {
    fn byte_len(&self) -> usize;
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<()>;
}

impl ByteSource for Region {
    fn byte_len(&self) -> usize {
        self.capacity()
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.read_bytes(offset, buf)
    }
}

impl ByteSource for [u8] {
    fn byte_len(&self) -> usize {
        self.len()
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        let src = offset
            .checked_add(buf.len())
            .and_then(|end| self.get(offset..end))
            .ok_or_else(|| IntercomError::OutOfBounds {
                region: "buffer".to_string(),
                offset,
                len: buf.len(),
                capacity: self.len(),
            })?;
        buf.copy_from_slice(src);
        Ok(())
    }
}

/// Id and invocation count at the start of an outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchHeader {
    pub id: i64,
    pub count: i32,
}

/// A framed batch whose invocations have not been decoded yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBatch {
    pub id: i64,
    pub invocations: Vec<Vec<u8>>,
}

fn read_i32<S: ByteSource + ?Sized>(source: &S, offset: usize, what: &str) -> Result<i32> {
    let mut buf = [0u8; 4];
    source.read_at(offset, &mut buf).map_err(|_| {
        IntercomError::framing(format!(
            "{} at offset {} runs past the end ({} bytes)",
            what,
            offset,
            source.byte_len()
        ))
    })?;
    Ok(i32::from_le_bytes(buf))
}

/// Read the correlation id and invocation count.
pub fn read_header<S: ByteSource + ?Sized>(source: &S) -> Result<BatchHeader> {
    let mut id = [0u8; 8];
    source
        .read_at(0, &mut id)
        .map_err(|_| IntercomError::framing("source is too small for a batch header"))?;
    let count = read_i32(source, 8, "invocation count")?;
    Ok(BatchHeader {
        id: i64::from_le_bytes(id),
        count,
    })
}

/// Split a batch into its framed invocations, validating every length field
/// against the bounds of the source.
pub fn decode_batch<S: ByteSource + ?Sized>(source: &S) -> Result<RawBatch> {
    let header = read_header(source)?;
    let count = usize::try_from(header.count).map_err(|_| {
        IntercomError::framing(format!("negative invocation count {}", header.count))
    })?;

    let limit = source.byte_len();
    let mut pos = ChannelConfig::BATCH_HEADER_LEN;
    // Each invocation needs at least its 4-byte length prefix
    let mut invocations = Vec::with_capacity(count.min(limit / 4));

    for index in 0..count {
        let len = read_i32(source, pos, "invocation length")?;
        let len = usize::try_from(len).map_err(|_| {
            IntercomError::framing(format!("invocation {} has negative length {}", index, len))
        })?;
        pos += 4;

        let end = pos
            .checked_add(len)
            .filter(|end| *end <= limit)
            .ok_or_else(|| {
                IntercomError::framing(format!(
                    "invocation {} of {} bytes at offset {} runs past the end ({} bytes)",
                    index, len, pos, limit
                ))
            })?;

        let mut bytes = vec![0u8; len];
        source.read_at(pos, &mut bytes)?;
        invocations.push(bytes);
        pos = end;
    }

    Ok(RawBatch {
        id: header.id,
        invocations,
    })
}

/// Build the full wire image of a batch.
///
/// Fails with `Overflow` instead of producing an image larger than
/// `capacity`; nothing is ever partially framed.
pub fn encode_batch<B>(id: i64, invocations: &[B], capacity: usize) -> Result<Vec<u8>>
where
    B: AsRef<[u8]>,
{
    let size = invocations.iter().fold(ChannelConfig::BATCH_HEADER_LEN, |acc, inv| {
        acc + 4 + inv.as_ref().len()
    });
    if size > capacity {
        return Err(IntercomError::Overflow { size, capacity });
    }

    let count = i32::try_from(invocations.len())
        .map_err(|_| IntercomError::Overflow { size, capacity })?;

    let mut image = Vec::with_capacity(size);
    image.extend_from_slice(&id.to_le_bytes());
    image.extend_from_slice(&count.to_le_bytes());
    for inv in invocations {
        let inv = inv.as_ref();
        let len =
            i32::try_from(inv.len()).map_err(|_| IntercomError::Overflow { size, capacity })?;
        image.extend_from_slice(&len.to_le_bytes());
        image.extend_from_slice(inv);
    }

    Ok(image)
}

/// Write an encoded batch into an outbox, publishing the id last.
pub fn write_batch(region: &Region, image: &[u8]) -> Result<()> {
    if image.len() < ChannelConfig::BATCH_HEADER_LEN {
        return Err(IntercomError::framing("batch image is shorter than its header"));
    }
    if image.len() > region.capacity() {
        return Err(IntercomError::Overflow {
            size: image.len(),
            capacity: region.capacity(),
        });
    }

    region.write_bytes(8, &image[8..])?;
    region.write_bytes(0, &image[..8])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let image = encode_batch(-5, &[vec![1, 2], vec![]], 64).unwrap();

        assert_eq!(&image[0..8], &(-5i64).to_le_bytes());
        assert_eq!(&image[8..12], &2i32.to_le_bytes());
        assert_eq!(&image[12..16], &2i32.to_le_bytes());
        assert_eq!(&image[16..18], &[1, 2]);
        assert_eq!(&image[18..22], &0i32.to_le_bytes());
        assert_eq!(image.len(), 22);
    }

    #[test]
    fn test_decode_splits_invocations() {
        let image = encode_batch(77, &[vec![9], vec![8, 7, 6]], 64).unwrap();
        let batch = decode_batch(image.as_slice()).unwrap();
        assert_eq!(batch.id, 77);
        assert_eq!(batch.invocations, vec![vec![9], vec![8, 7, 6]]);
    }

    #[test]
    fn test_empty_batch_is_valid() {
        let image = encode_batch::<Vec<u8>>(1, &[], 64).unwrap();
        assert_eq!(image.len(), ChannelConfig::BATCH_HEADER_LEN);
        let batch = decode_batch(image.as_slice()).unwrap();
        assert!(batch.invocations.is_empty());
    }

    #[test]
    fn test_zeroed_outbox_decodes_as_empty_batch() {
        let zeroed = vec![0u8; 128];
        let batch = decode_batch(zeroed.as_slice()).unwrap();
        assert_eq!(batch.id, 0);
        assert!(batch.invocations.is_empty());
    }

    #[test]
    fn test_overflow_is_detected_before_framing() {
        let err = encode_batch(1, &[vec![0u8; 20]], 32).unwrap_err();
        match err {
            IntercomError::Overflow { size, capacity } => {
                assert_eq!(size, 36);
                assert_eq!(capacity, 32);
            }
            other => panic!("Expected Overflow, got: {:?}", other),
        }
        // exactly full is fine
        assert!(encode_batch(1, &[vec![0u8; 16]], 32).is_ok());
    }

    #[test]
    fn test_length_past_capacity_is_framing_error() {
        let mut image = encode_batch(3, &[vec![1, 2, 3]], 64).unwrap();
        image[12..16].copy_from_slice(&1000i32.to_le_bytes());
        let err = decode_batch(image.as_slice()).unwrap_err();
        assert!(matches!(err, IntercomError::Framing { .. }));
    }

    #[test]
    fn test_negative_count_is_framing_error() {
        let mut image = encode_batch::<Vec<u8>>(3, &[], 64).unwrap();
        image[8..12].copy_from_slice(&(-1i32).to_le_bytes());
        assert!(matches!(
            decode_batch(image.as_slice()),
            Err(IntercomError::Framing { .. })
        ));
    }

    #[test]
    fn test_count_larger_than_body_is_framing_error() {
        let mut image = encode_batch(3, &[vec![1]], 64).unwrap();
        image[8..12].copy_from_slice(&5i32.to_le_bytes());
        assert!(matches!(
            decode_batch(image.as_slice()),
            Err(IntercomError::Framing { .. })
        ));
    }

    #[test]
    fn test_header_of_tiny_source_is_framing_error() {
        let tiny = [0u8; 4];
        assert!(matches!(
            read_header(&tiny[..]),
            Err(IntercomError::Framing { .. })
        ));
    }
}

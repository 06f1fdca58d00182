//! Region manager: named shared memory with typed, offset-based access.
//!
//! All reads and writes are raw and unsynchronized between processes.
//! Values are little-endian and tightly packed; no alignment is assumed.
//! Callers are responsible for the flow control that keeps the peer from
//! reading half-written data.

use crate::error::{IntercomError, Result};
use crate::platform::shm::{self, OpenMode, SharedMapping};
use tracing::debug;

/// A mapped, named shared memory region.
#[derive(Debug)]
pub struct Region {
    name: String,
    mapping: SharedMapping,
}

impl Region {
    /// Map the named region, creating it zero-filled if it does not exist.
    ///
    /// Idempotent: whichever process gets here first creates the segment.
    pub fn open_or_create(name: &str, size: usize) -> Result<Self> {
        Self::open(name, size, OpenMode::CreateOrOpen)
    }

    /// Map the named region only if another process already created it.
    pub fn open_existing(name: &str, size: usize) -> Result<Self> {
        Self::open(name, size, OpenMode::OpenExisting)
    }

    fn open(name: &str, size: usize, mode: OpenMode) -> Result<Self> {
        let mapping =
            SharedMapping::open(name, size, mode).map_err(|e| IntercomError::region(e, name))?;
        debug!("Opened region {} ({:?})", name, mode);
        Ok(Self {
            name: name.to_string(),
            mapping,
        })
    }

    /// Remove the named region from the system namespace.
    pub fn remove(name: &str) -> Result<()> {
        shm::remove(name).map_err(|e| IntercomError::region(e, name))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capacity of the region in bytes.
    pub fn capacity(&self) -> usize {
        self.mapping.size()
    }

    fn out_of_bounds(&self, offset: usize, len: usize) -> IntercomError {
        IntercomError::OutOfBounds {
            region: self.name.clone(),
            offset,
            len,
            capacity: self.capacity(),
        }
    }

    pub fn read_bytes(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        if self.mapping.read_at(offset, buf) {
            Ok(())
        } else {
            Err(self.out_of_bounds(offset, buf.len()))
        }
    }

    pub fn write_bytes(&self, offset: usize, data: &[u8]) -> Result<()> {
        if self.mapping.write_at(offset, data) {
            Ok(())
        } else {
            Err(self.out_of_bounds(offset, data.len()))
        }
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_bytes(offset, &mut buf)?;
        Ok(buf[0])
    }

    pub fn write_u8(&self, offset: usize, value: u8) -> Result<()> {
        self.write_bytes(offset, &[value])
    }

    pub fn read_i32(&self, offset: usize) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.read_bytes(offset, &mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    pub fn write_i32(&self, offset: usize, value: i32) -> Result<()> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    pub fn read_i64(&self, offset: usize) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.read_bytes(offset, &mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    pub fn write_i64(&self, offset: usize, value: i64) -> Result<()> {
        self.write_bytes(offset, &value.to_le_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TempRegion(String);

    impl TempRegion {
        fn new(tag: &str) -> Self {
            Self(format!("intercom-region-{}-{}", tag, std::process::id()))
        }
    }

    impl Drop for TempRegion {
        fn drop(&mut self) {
            let _ = Region::remove(&self.0);
        }
    }

    #[test]
    fn test_typed_access_is_little_endian_and_unaligned() {
        let temp = TempRegion::new("typed");
        let region = Region::open_or_create(&temp.0, 32).unwrap();

        region.write_u8(0, 7).unwrap();
        region.write_i32(1, -2).unwrap();
        region.write_i64(5, 0x0102_0304_0506_0708).unwrap();

        assert_eq!(region.read_u8(0).unwrap(), 7);
        assert_eq!(region.read_i32(1).unwrap(), -2);
        assert_eq!(region.read_i64(5).unwrap(), 0x0102_0304_0506_0708);

        let mut raw = [0u8; 8];
        region.read_bytes(5, &mut raw).unwrap();
        assert_eq!(raw, [8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_open_or_create_is_idempotent() {
        let temp = TempRegion::new("idem");
        let first = Region::open_or_create(&temp.0, 16).unwrap();
        first.write_i32(0, 99).unwrap();

        let second = Region::open_or_create(&temp.0, 16).unwrap();
        assert_eq!(second.read_i32(0).unwrap(), 99);
        assert_eq!(second.name(), temp.0);
        assert_eq!(second.capacity(), 16);
    }

    #[test]
    fn test_out_of_bounds_access() {
        let temp = TempRegion::new("bounds");
        let region = Region::open_or_create(&temp.0, 10).unwrap();

        match region.read_i64(4) {
            Err(IntercomError::OutOfBounds {
                offset, len, capacity, ..
            }) => {
                assert_eq!(offset, 4);
                assert_eq!(len, 8);
                assert_eq!(capacity, 10);
            }
            other => panic!("Expected OutOfBounds, got: {:?}", other),
        }
        assert!(region.write_i32(8, 1).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_open_existing_reports_unavailable() {
        let temp = TempRegion::new("missing");
        let result = Region::open_existing(&temp.0, 16);
        match result {
            Err(IntercomError::RegionUnavailable { name, .. }) => assert_eq!(name, temp.0),
            other => panic!("Expected RegionUnavailable, got: {:?}", other),
        }
    }
}

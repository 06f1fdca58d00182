//! The control block shared by both sides.
//!
//! ```text
//! byte 0     Foo reading state
//! byte 1     Bar reading state
//! bytes 2-5  Foo frame counter (i32 LE)
//! bytes 6-9  Bar frame counter (i32 LE)
//! ```
//!
//! Each side writes only its own fields, with one exception: right before a
//! side writes a new batch it flips the peer's reading state back to
//! `Reading`.

use crate::config::{control_name, ChannelConfig, Side};
use crate::error::Result;
use crate::region::Region;

/// Stop-and-wait flag: has this side finished consuming its inbox?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadingState {
    Reading = 0,
    Finished = 1,
}

impl ReadingState {
    /// Anything but `1` reads as `Reading`, including a fresh zeroed block.
    pub fn from_byte(byte: u8) -> Self {
        if byte == ReadingState::Finished as u8 {
            ReadingState::Finished
        } else {
            ReadingState::Reading
        }
    }
}

/// Typed view over the `{identifier}.Shared` region.
#[derive(Debug)]
pub struct ControlBlock {
    region: Region,
}

impl ControlBlock {
    pub fn open_or_create(identifier: &str) -> Result<Self> {
        let region = Region::open_or_create(
            &control_name(identifier),
            ChannelConfig::CONTROL_BLOCK_SIZE,
        )?;
        Ok(Self { region })
    }

    pub fn reading_state(&self, side: Side) -> Result<ReadingState> {
        Ok(ReadingState::from_byte(
            self.region.read_u8(side.state_offset())?,
        ))
    }

    pub fn set_reading_state(&self, side: Side, state: ReadingState) -> Result<()> {
        self.region.write_u8(side.state_offset(), state as u8)
    }

    pub fn frame(&self, side: Side) -> Result<i32> {
        self.region.read_i32(side.frame_offset())
    }

    /// Bump the side's frame counter, wrapping on overflow.
    pub fn advance_frame(&self, side: Side) -> Result<i32> {
        let next = self.frame(side)?.wrapping_add(1);
        self.region.write_i32(side.frame_offset(), next)?;
        Ok(next)
    }
}

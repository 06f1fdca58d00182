//! Centralized configuration for the intercom channel.
//!
//! This module provides the wire constants shared by both processes and the
//! `Side` role each process plays. Both sides must agree on every value here.

use std::time::Duration;

/// Channel-level configuration.
pub struct ChannelConfig;

impl ChannelConfig {
    pub const OUTBOX_CAPACITY: usize = 8 * 1024 * 1024; // 8MB
    pub const CONTROL_BLOCK_SIZE: usize = 10;

    // Batch header: i64 correlation id + i32 invocation count
    pub const BATCH_HEADER_LEN: usize = 12;

    // Invocation limits imposed by the u8 length prefixes
    pub const MAX_METHOD_NAME_LEN: usize = 255;
    pub const MAX_ARGUMENTS: usize = 255;

    pub const DELIVERY_POLL_INTERVAL: Duration = Duration::from_millis(1);

    /// Consecutive polls a malformed batch is retried before it is discarded.
    pub const MAX_FRAMING_RETRIES: u32 = 8;
}

/// Byte offsets inside the shared control block.
pub struct ControlLayout;

impl ControlLayout {
    pub const FOO_STATE: usize = 0;
    pub const BAR_STATE: usize = 1;
    pub const FOO_FRAME: usize = 2;
    pub const BAR_FRAME: usize = 6;
}

/// One of the two fixed roles of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Foo,
    Bar,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Foo => "Foo",
            Side::Bar => "Bar",
        }
    }

    /// The side on the other end of the channel.
    pub fn opposite(&self) -> Side {
        match self {
            Side::Foo => Side::Bar,
            Side::Bar => Side::Foo,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "foo" => Some(Side::Foo),
            "bar" => Some(Side::Bar),
            _ => None,
        }
    }

    /// Name of the region this side writes (`{identifier}.Foo` / `{identifier}.Bar`).
    pub fn outbox_name(&self, identifier: &str) -> String {
        format!("{}.{}", identifier, self.as_str())
    }

    pub(crate) fn state_offset(&self) -> usize {
        match self {
            Side::Foo => ControlLayout::FOO_STATE,
            Side::Bar => ControlLayout::BAR_STATE,
        }
    }

    pub(crate) fn frame_offset(&self) -> usize {
        match self {
            Side::Foo => ControlLayout::FOO_FRAME,
            Side::Bar => ControlLayout::BAR_FRAME,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Name of the control block region shared by both sides.
pub fn control_name(identifier: &str) -> String {
    format!("{}.Shared", identifier)
}

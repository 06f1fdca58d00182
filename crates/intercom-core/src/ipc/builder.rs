//! Builder for configuring a [`Channel`].

use super::channel::Channel;
use crate::codec::{BinaryCodec, ValueCodec};
use crate::config::{ChannelConfig, Side};
use crate::dispatch::Dispatch;
use crate::error::{IntercomError, Result};
use std::sync::Arc;
use std::time::Duration;

/// Builder for configuring a [`Channel`].
///
/// # Example
///
/// ```
/// use intercom::{Channel, JsonCodec, Side};
///
/// let channel = Channel::builder(Side::Bar, "my-app")
///     .codec(JsonCodec)
///     .capacity(1024 * 1024)
///     .wait_for_peer(true)
///     .build()?;
/// assert_eq!(channel.capacity(), 1024 * 1024);
/// # Ok::<(), intercom::IntercomError>(())
/// ```
pub struct ChannelBuilder {
    pub(crate) side: Side,
    pub(crate) identifier: String,
    pub(crate) codec: Arc<dyn ValueCodec>,
    pub(crate) dispatcher: Option<Arc<dyn Dispatch>>,
    pub(crate) capacity: usize,
    pub(crate) wait_for_peer: bool,
    pub(crate) delivery_poll_interval: Duration,
}

impl ChannelBuilder {
    /// Create a new builder for one side of the channel named `identifier`.
    pub fn new(side: Side, identifier: impl Into<String>) -> Self {
        Self {
            side,
            identifier: identifier.into(),
            codec: Arc::new(BinaryCodec),
            dispatcher: None,
            capacity: ChannelConfig::OUTBOX_CAPACITY,
            wait_for_peer: false,
            delivery_poll_interval: ChannelConfig::DELIVERY_POLL_INTERVAL,
        }
    }

    /// Value codec for arguments. Both sides must use the same one.
    ///
    /// Default: [`BinaryCodec`]
    pub fn codec(mut self, codec: impl ValueCodec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Dispatcher consulted for every received invocation.
    pub fn dispatcher(mut self, dispatcher: impl Dispatch + 'static) -> Self {
        self.dispatcher = Some(Arc::new(dispatcher));
        self
    }

    /// Size of each outbox in bytes. Both sides must agree.
    ///
    /// Default: [`ChannelConfig::OUTBOX_CAPACITY`]
    pub fn capacity(mut self, bytes: usize) -> Self {
        self.capacity = bytes;
        self
    }

    /// Only open the peer's outbox once the peer has created it.
    ///
    /// When enabled, polls are no-ops until the peer process is up.
    ///
    /// Default: `false` (the inbox is created on first poll)
    pub fn wait_for_peer(mut self, enable: bool) -> Self {
        self.wait_for_peer = enable;
        self
    }

    /// How often `invoke_and_await` checks the peer's frame counter.
    ///
    /// Default: [`ChannelConfig::DELIVERY_POLL_INTERVAL`]
    pub fn delivery_poll_interval(mut self, interval: Duration) -> Self {
        self.delivery_poll_interval = interval;
        self
    }

    /// Build the channel. No region is mapped until the first poll.
    pub fn build(self) -> Result<Channel> {
        if self.identifier.is_empty() {
            return Err(IntercomError::Config {
                message: "Channel identifier must not be empty".to_string(),
            });
        }
        if self.capacity < ChannelConfig::BATCH_HEADER_LEN {
            return Err(IntercomError::Config {
                message: format!(
                    "Outbox capacity {} is smaller than the {}-byte batch header",
                    self.capacity,
                    ChannelConfig::BATCH_HEADER_LEN
                ),
            });
        }
        if self.delivery_poll_interval.is_zero() {
            return Err(IntercomError::Config {
                message: "Delivery poll interval must be non-zero".to_string(),
            });
        }

        Ok(Channel::from_builder(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let channel = ChannelBuilder::new(Side::Foo, "defaults").build().unwrap();
        assert_eq!(channel.capacity(), ChannelConfig::OUTBOX_CAPACITY);
        assert_eq!(channel.side(), Side::Foo);
        assert_eq!(channel.identifier(), "defaults");
    }

    #[test]
    fn test_rejects_tiny_capacity() {
        let err = ChannelBuilder::new(Side::Foo, "tiny")
            .capacity(8)
            .build()
            .unwrap_err();
        assert!(matches!(err, IntercomError::Config { .. }));
    }

    #[test]
    fn test_rejects_empty_identifier() {
        assert!(ChannelBuilder::new(Side::Bar, "").build().is_err());
    }

    #[test]
    fn test_rejects_zero_interval() {
        let result = ChannelBuilder::new(Side::Bar, "interval")
            .delivery_poll_interval(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }
}

//! Delivery waiter: queue from anywhere, optionally wait for the peer to poll.

use super::channel::ChannelShared;
use crate::codec::Value;
use crate::config::Side;
use crate::error::Result;
use std::sync::Arc;

/// Cloneable handle that queues invocations on a [`Channel`](super::Channel).
///
/// Handles share the channel's outgoing queue, so they can be moved into
/// handlers or other tasks while the owning channel keeps polling.
#[derive(Clone)]
pub struct Invoker {
    shared: Arc<ChannelShared>,
}

impl Invoker {
    pub(crate) fn new(shared: Arc<ChannelShared>) -> Self {
        Self { shared }
    }

    pub fn side(&self) -> Side {
        self.shared.side
    }

    /// Queue an invocation for the peer. See [`Channel::invoke`](super::Channel::invoke).
    pub fn invoke(&self, method: impl Into<String>, args: Vec<Value>) -> Result<()> {
        self.shared.enqueue(method.into(), args)
    }

    /// Queue an invocation and wait until the peer's frame counter moves.
    ///
    /// Returns once the peer has completed at least one poll after the
    /// enqueue. That proves the peer had a chance to see the call, not that
    /// it was dispatched. Dropping the future abandons the wait; the
    /// invocation stays queued.
    pub async fn invoke_and_await(&self, method: impl Into<String>, args: Vec<Value>) -> Result<()> {
        self.shared.enqueue(method.into(), args)?;
        let baseline = self.peer_frame();
        await_peer_frame(&self.shared, baseline).await;
        Ok(())
    }

    pub fn pending(&self) -> Result<usize> {
        self.shared.pending()
    }

    fn peer_frame(&self) -> Option<i32> {
        self.shared
            .control()
            .and_then(|control| control.frame(self.shared.side.opposite()).ok())
    }
}

impl std::fmt::Debug for Invoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoker")
            .field("side", &self.shared.side)
            .field("identifier", &self.shared.identifier)
            .finish()
    }
}

/// Sleep until the peer's frame counter differs from `baseline`.
///
/// Without a baseline (control block not mapped yet) the first value read
/// becomes the baseline. Counters wrap, so only inequality is meaningful.
pub(crate) async fn await_peer_frame(shared: &ChannelShared, mut baseline: Option<i32>) {
    let peer = shared.side.opposite();
    loop {
        if let Some(frame) = shared.control().and_then(|c| c.frame(peer).ok()) {
            match baseline {
                Some(seen) if seen != frame => return,
                Some(_) => {}
                None => baseline = Some(frame),
            }
        }
        tokio::time::sleep(shared.delivery_poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::codec::{BinaryCodec, Value, ValueCodec};
    use crate::ipc::channel::Channel;
    use crate::ipc::control::ControlBlock;
    use std::time::Duration;

    struct Cleanup(String);

    impl Drop for Cleanup {
        fn drop(&mut self) {
            let _ = Channel::remove_regions(&self.0);
        }
    }

    fn identifier(tag: &str) -> (String, Cleanup) {
        let id = format!("intercom-waiter-{}-{}", tag, std::process::id());
        (id.clone(), Cleanup(id))
    }

    #[tokio::test]
    async fn test_waits_until_peer_frame_moves() {
        let (id, _cleanup) = identifier("moves");
        let channel = Channel::new(Side::Foo, &id).unwrap();
        let invoker = channel.invoker();

        let waiting = tokio::spawn(async move { invoker.invoke_and_await("Ping", args![]).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());
        assert_eq!(channel.pending().unwrap(), 1);

        let control = ControlBlock::open_or_create(&id).unwrap();
        control.advance_frame(Side::Bar).unwrap();

        tokio::time::timeout(Duration::from_secs(5), waiting)
            .await
            .expect("waiter did not observe the frame")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_own_frame_does_not_count() {
        let (id, _cleanup) = identifier("own");
        let channel = Channel::new(Side::Bar, &id).unwrap();
        let invoker = channel.invoker();

        let control = ControlBlock::open_or_create(&id).unwrap();
        let waiting = tokio::spawn(async move { invoker.invoke_and_await("Log", args!["x"]).await });

        for _ in 0..5 {
            control.advance_frame(Side::Bar).unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!waiting.is_finished());
        waiting.abort();
    }

    #[tokio::test]
    async fn test_abandoned_wait_keeps_invocation_queued() {
        let (id, _cleanup) = identifier("abandon");
        let channel = Channel::new(Side::Foo, &id).unwrap();
        let invoker = channel.invoker();

        let result = tokio::time::timeout(
            Duration::from_millis(20),
            invoker.invoke_and_await("Ping", args![]),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(invoker.pending().unwrap(), 1);
    }

    /// Binary codec that bumps Bar's frame counter while encoding, the way a
    /// peer poll can land between queuing and reading the baseline.
    struct PeerPollsDuringEncode(String);

    impl ValueCodec for PeerPollsDuringEncode {
        fn encode(&self, value: &Value) -> Result<Vec<u8>> {
            ControlBlock::open_or_create(&self.0)?.advance_frame(Side::Bar)?;
            BinaryCodec.encode(value)
        }

        fn decode(&self, bytes: &[u8]) -> Result<Value> {
            BinaryCodec.decode(bytes)
        }
    }

    #[tokio::test]
    async fn test_poll_before_enqueue_completes_does_not_count() {
        let (id, _cleanup) = identifier("racing");
        let channel = Channel::builder(Side::Foo, &id)
            .codec(PeerPollsDuringEncode(id.clone()))
            .build()
            .unwrap();
        let invoker = channel.invoker();

        let result = tokio::time::timeout(
            Duration::from_millis(50),
            invoker.invoke_and_await("Log", args!["queued"]),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(invoker.pending().unwrap(), 1);

        let result = tokio::time::timeout(
            Duration::from_millis(50),
            channel.invoke_and_await("Log", args!["again"]),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(channel.pending().unwrap(), 2);
    }
}

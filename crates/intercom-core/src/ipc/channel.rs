//! The flow-control state machine that drives one side of a channel.
//!
//! Each side writes only its own outbox and reads the peer's. A one-bit
//! reading state per side in the control block implements stop-and-wait: a
//! side flushes its queue only after the peer has marked itself `Finished`
//! with the previous batch, so at most one batch is in flight per direction.
//!
//! The machine is re-evaluated from the shared bytes on every [`Channel::poll`];
//! the only local state is the outgoing queue and the id of the last batch
//! accepted from the peer.
//!
//! # Thread Safety
//!
//! `poll` takes `&mut self`, so one side is always driven by a single caller.
//! Queuing goes through [`Invoker`] handles, which may live on any thread.

use super::batch::{decode_batch, encode_batch, read_header, write_batch};
use super::builder::ChannelBuilder;
use super::control::{ControlBlock, ReadingState};
use super::invocation::Invocation;
use super::waiter::{await_peer_frame, Invoker};
use crate::codec::{Value, ValueCodec};
use crate::config::{control_name, ChannelConfig, Side};
use crate::dispatch::Dispatch;
use crate::error::{IntercomError, Result};
use crate::region::Region;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// An invocation encoded at enqueue time, waiting for the next flush.
#[derive(Debug)]
pub(crate) struct QueuedInvocation {
    method: String,
    bytes: Vec<u8>,
}

impl AsRef<[u8]> for QueuedInvocation {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// State shared between a [`Channel`] and its [`Invoker`] handles.
pub(crate) struct ChannelShared {
    pub(crate) side: Side,
    pub(crate) identifier: String,
    pub(crate) codec: Arc<dyn ValueCodec>,
    pub(crate) delivery_poll_interval: Duration,
    queue: Mutex<Vec<QueuedInvocation>>,
    control: Mutex<Option<Arc<ControlBlock>>>,
}

impl ChannelShared {
    pub(crate) fn new(
        side: Side,
        identifier: String,
        codec: Arc<dyn ValueCodec>,
        delivery_poll_interval: Duration,
    ) -> Self {
        Self {
            side,
            identifier,
            codec,
            delivery_poll_interval,
            queue: Mutex::new(Vec::new()),
            control: Mutex::new(None),
        }
    }

    fn lock_queue(&self) -> Result<MutexGuard<'_, Vec<QueuedInvocation>>> {
        self.queue
            .lock()
            .map_err(|_| IntercomError::Other("Outgoing queue lock poisoned".to_string()))
    }

    /// Validate, encode and append one invocation.
    pub(crate) fn enqueue(&self, method: String, args: Vec<Value>) -> Result<()> {
        let invocation = Invocation::new(method, args)?;
        let bytes = invocation.encode(self.codec.as_ref())?;
        let (method, _) = invocation.into_parts();

        let mut queue = self.lock_queue()?;
        queue.push(QueuedInvocation { method, bytes });
        debug!("{} queued invocation ({} pending)", self.side, queue.len());
        Ok(())
    }

    pub(crate) fn pending(&self) -> Result<usize> {
        Ok(self.lock_queue()?.len())
    }

    fn take_queue(&self) -> Result<Vec<QueuedInvocation>> {
        Ok(std::mem::take(&mut *self.lock_queue()?))
    }

    /// Put a batch that could not be sent back in front of anything queued since.
    fn restore_queue(&self, mut batch: Vec<QueuedInvocation>) -> Result<()> {
        let mut queue = self.lock_queue()?;
        batch.append(&mut queue);
        *queue = batch;
        Ok(())
    }

    /// Run `publish` for a taken batch, putting the batch back if it fails.
    fn publish_or_restore<F>(
        &self,
        batch: Vec<QueuedInvocation>,
        publish: F,
    ) -> Result<Vec<QueuedInvocation>>
    where
        F: FnOnce() -> Result<()>,
    {
        match publish() {
            Ok(()) => Ok(batch),
            Err(e) => {
                self.restore_queue(batch)?;
                Err(e)
            }
        }
    }

    /// The control block, opened on first use.
    ///
    /// Returns `None` while the region cannot be mapped; the next call tries again.
    pub(crate) fn control(&self) -> Option<Arc<ControlBlock>> {
        let mut slot = self.control.lock().ok()?;
        if slot.is_none() {
            match ControlBlock::open_or_create(&self.identifier) {
                Ok(block) => *slot = Some(Arc::new(block)),
                Err(e) => {
                    debug!("Control block for {} unavailable: {}", self.identifier, e);
                    return None;
                }
            }
        }
        slot.clone()
    }
}

/// Summary of one batch that crossed the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    /// Correlation id of the batch.
    pub id: i64,
    /// Number of invocations it carried.
    pub invocations: usize,
}

/// What a single [`Channel::poll`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    /// All regions were mapped and the state machine ran.
    pub ready: bool,
    /// Batch written to our outbox on this poll.
    pub sent: Option<BatchSummary>,
    /// New batch consumed from the peer on this poll.
    pub received: Option<BatchSummary>,
    /// Received invocations the dispatcher accepted.
    pub handled: usize,
}

/// One side of a two-process invocation channel.
///
/// # Example
///
/// ```no_run
/// use intercom::{args, Channel, Side};
///
/// # fn main() -> intercom::Result<()> {
/// let mut channel = Channel::new(Side::Foo, "demo")?;
/// channel.invoke("Add", args![2, 3])?;
///
/// loop {
///     channel.poll_with(|inv| println!("unhandled call {}", inv.method()))?;
///     std::thread::sleep(std::time::Duration::from_millis(10));
/// }
/// # }
/// ```
pub struct Channel {
    shared: Arc<ChannelShared>,
    capacity: usize,
    wait_for_peer: bool,
    outbox: Option<Region>,
    inbox: Option<Region>,
    dispatcher: Option<Arc<dyn Dispatch>>,
    rng: StdRng,
    last_accepted: Option<i64>,
    framing_failures: Option<(i64, u32)>,
}

impl Channel {
    /// Create a channel with default options.
    ///
    /// No region is touched until the first poll. Fails on an empty
    /// identifier, like [`ChannelBuilder::build`].
    pub fn new(side: Side, identifier: impl Into<String>) -> Result<Self> {
        ChannelBuilder::new(side, identifier).build()
    }

    pub fn builder(side: Side, identifier: impl Into<String>) -> ChannelBuilder {
        ChannelBuilder::new(side, identifier)
    }

    pub(crate) fn from_builder(builder: ChannelBuilder) -> Self {
        let shared = ChannelShared::new(
            builder.side,
            builder.identifier,
            builder.codec,
            builder.delivery_poll_interval,
        );
        Self {
            shared: Arc::new(shared),
            capacity: builder.capacity,
            wait_for_peer: builder.wait_for_peer,
            outbox: None,
            inbox: None,
            dispatcher: builder.dispatcher,
            rng: StdRng::from_os_rng(),
            last_accepted: None,
            framing_failures: None,
        }
    }

    pub fn side(&self) -> Side {
        self.shared.side
    }

    pub fn identifier(&self) -> &str {
        &self.shared.identifier
    }

    /// Outbox capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of invocations waiting for the next flush.
    pub fn pending(&self) -> Result<usize> {
        self.shared.pending()
    }

    /// Queue an invocation for the peer.
    ///
    /// Returns immediately. Fails only when the invocation exceeds the wire
    /// limits or an argument cannot be encoded; the queue itself is unbounded.
    pub fn invoke(&self, method: impl Into<String>, args: Vec<Value>) -> Result<()> {
        self.shared.enqueue(method.into(), args)
    }

    /// Queue an invocation, then wait until the peer has polled at least once.
    ///
    /// This is a liveness signal, not an acknowledgment. Polling must happen
    /// elsewhere while this waits, so drive the channel from another task and
    /// call this through an [`Invoker`].
    pub async fn invoke_and_await(&self, method: impl Into<String>, args: Vec<Value>) -> Result<()> {
        self.shared.enqueue(method.into(), args)?;
        let baseline = self.peer_frame();
        await_peer_frame(&self.shared, baseline).await;
        Ok(())
    }

    /// A cloneable handle for queuing from other tasks or threads.
    pub fn invoker(&self) -> Invoker {
        Invoker::new(self.shared.clone())
    }

    /// Replace the dispatcher consulted for received invocations.
    pub fn set_dispatcher(&mut self, dispatcher: impl Dispatch + 'static) {
        self.dispatcher = Some(Arc::new(dispatcher));
    }

    pub fn clear_dispatcher(&mut self) {
        self.dispatcher = None;
    }

    /// Id of the last batch consumed from the peer.
    pub fn last_accepted_id(&self) -> Option<i64> {
        self.last_accepted
    }

    /// Remove all three named regions of a channel.
    ///
    /// Mappings that are still open stay valid until dropped.
    pub fn remove_regions(identifier: &str) -> Result<()> {
        Region::remove(&Side::Foo.outbox_name(identifier))?;
        Region::remove(&Side::Bar.outbox_name(identifier))?;
        Region::remove(&control_name(identifier))
    }

    fn peer_frame(&self) -> Option<i32> {
        self.shared
            .control()
            .and_then(|control| control.frame(self.shared.side.opposite()).ok())
    }

    /// Run one tick of the state machine, dispatching to the dispatcher only.
    pub fn poll(&mut self) -> Result<PollReport> {
        self.poll_with(|_| {})
    }

    /// Run one tick of the state machine.
    ///
    /// `on_invoked` sees every received invocation the dispatcher did not
    /// handle, or all of them when no dispatcher is attached. The only error
    /// is an outbox overflow; the queue is kept intact in that case.
    pub fn poll_with<F>(&mut self, mut on_invoked: F) -> Result<PollReport>
    where
        F: FnMut(&Invocation),
    {
        let mut report = PollReport::default();
        let side = self.shared.side;

        let Some(control) = self.shared.control() else {
            return Ok(report);
        };
        control.advance_frame(side)?;

        if !self.open_regions() {
            return Ok(report);
        }
        report.ready = true;

        if control.reading_state(side.opposite())? == ReadingState::Finished {
            report.sent = self.flush(&control)?;
        }

        self.receive(&control, &mut on_invoked, &mut report)?;
        Ok(report)
    }

    /// Map both outboxes, returning `false` while either is unavailable.
    fn open_regions(&mut self) -> bool {
        let side = self.shared.side;
        let identifier = &self.shared.identifier;

        if self.outbox.is_none() {
            let name = side.outbox_name(identifier);
            match Region::open_or_create(&name, self.capacity) {
                Ok(region) => self.outbox = Some(region),
                Err(e) => {
                    debug!("{} outbox unavailable: {}", side, e);
                    return false;
                }
            }
        }

        if self.inbox.is_none() {
            let name = side.opposite().outbox_name(identifier);
            let opened = if self.wait_for_peer {
                Region::open_existing(&name, self.capacity)
            } else {
                Region::open_or_create(&name, self.capacity)
            };
            match opened {
                Ok(region) => {
                    info!("{} connected to inbox {}", side, name);
                    self.inbox = Some(region);
                }
                Err(e) => {
                    debug!("{} inbox unavailable: {}", side, e);
                    return false;
                }
            }
        }

        true
    }

    /// Step 3: the peer finished with our last batch, so the outbox is ours.
    fn flush(&mut self, control: &ControlBlock) -> Result<Option<BatchSummary>> {
        let side = self.shared.side;
        let Some(outbox) = self.outbox.as_ref() else {
            return Ok(None);
        };

        let queued = self.shared.take_queue()?;
        if queued.is_empty() {
            control.set_reading_state(side.opposite(), ReadingState::Reading)?;
            return Ok(None);
        }

        // A fresh id only has to differ from the one the peer may still hold
        let current = outbox.read_i64(0)?;
        let id = loop {
            let candidate: i64 = self.rng.random();
            if candidate != current {
                break candidate;
            }
        };

        let image = match encode_batch(id, &queued, self.capacity) {
            Ok(image) => image,
            Err(e) => {
                error!(
                    "{} cannot flush {} queued invocations: {}",
                    side,
                    queued.len(),
                    e
                );
                self.shared.restore_queue(queued)?;
                return Err(e);
            }
        };

        let queued = self.shared.publish_or_restore(queued, || {
            control.set_reading_state(side.opposite(), ReadingState::Reading)?;
            write_batch(outbox, &image)
        })?;

        debug!(
            "{} sent batch {} with {} invocations ({} bytes): {}",
            side,
            id,
            queued.len(),
            image.len(),
            queued
                .iter()
                .map(|q| q.method.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(Some(BatchSummary {
            id,
            invocations: queued.len(),
        }))
    }

    /// Steps 4 to 7: consume the peer's batch unless it was seen already.
    fn receive<F>(
        &mut self,
        control: &ControlBlock,
        on_invoked: &mut F,
        report: &mut PollReport,
    ) -> Result<()>
    where
        F: FnMut(&Invocation),
    {
        let side = self.shared.side;
        let Some(inbox) = self.inbox.as_ref() else {
            return Ok(());
        };

        let header = match read_header(inbox) {
            Ok(header) => header,
            Err(e) => {
                warn!("{} cannot read inbox header: {}", side, e);
                return Ok(());
            }
        };

        if self.last_accepted == Some(header.id) {
            control.set_reading_state(side, ReadingState::Finished)?;
            return Ok(());
        }

        let decoded = decode_invocations(inbox, self.shared.codec.as_ref());
        let invocations = match decoded {
            Ok(invocations) => invocations,
            Err(e) => return self.framing_failure(control, header.id, e),
        };
        self.framing_failures = None;

        debug!(
            "{} received batch {} with {} invocations",
            side,
            header.id,
            invocations.len()
        );

        for invocation in &invocations {
            let handled = self
                .dispatcher
                .as_ref()
                .is_some_and(|d| d.try_dispatch(invocation.method(), invocation.args()));
            if handled {
                report.handled += 1;
                continue;
            }

            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| on_invoked(invocation)));
            if outcome.is_err() {
                error!(
                    "{} invocation callback panicked on {}",
                    side,
                    invocation.method()
                );
            }
        }

        self.last_accepted = Some(header.id);
        control.set_reading_state(side, ReadingState::Finished)?;
        report.received = Some(BatchSummary {
            id: header.id,
            invocations: invocations.len(),
        });
        Ok(())
    }

    /// A malformed batch is retried on later polls, then dropped.
    fn framing_failure(
        &mut self,
        control: &ControlBlock,
        id: i64,
        err: IntercomError,
    ) -> Result<()> {
        let side = self.shared.side;
        let attempts = match self.framing_failures {
            Some((failed_id, count)) if failed_id == id => count + 1,
            _ => 1,
        };

        if attempts < ChannelConfig::MAX_FRAMING_RETRIES {
            self.framing_failures = Some((id, attempts));
            warn!(
                "{} skipped batch {} this tick (attempt {}): {}",
                side, id, attempts, err
            );
            return Ok(());
        }

        error!(
            "{} discarding batch {} after {} failed attempts: {}",
            side, id, attempts, err
        );
        self.framing_failures = None;
        self.last_accepted = Some(id);
        control.set_reading_state(side, ReadingState::Finished)
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("side", &self.shared.side)
            .field("identifier", &self.shared.identifier)
            .field("capacity", &self.capacity)
            .field("pending", &self.pending().ok())
            .field("last_accepted", &self.last_accepted)
            .finish()
    }
}

/// Decode every invocation of the batch in `inbox`.
///
/// Zero-length entries are skipped. An argument the codec rejects costs only
/// that invocation; a framing error rejects the whole batch.
fn decode_invocations(inbox: &Region, codec: &dyn ValueCodec) -> Result<Vec<Invocation>> {
    let batch = decode_batch(inbox)?;
    let mut invocations = Vec::with_capacity(batch.invocations.len());

    for (index, bytes) in batch.invocations.iter().enumerate() {
        if bytes.is_empty() {
            debug!("Skipping empty invocation {} of batch {}", index, batch.id);
            continue;
        }
        match Invocation::decode(bytes, codec) {
            Ok(invocation) => invocations.push(invocation),
            Err(e @ IntercomError::Codec { .. }) => {
                warn!("Skipping invocation {} of batch {}: {}", index, batch.id, e);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(invocations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::codec::BinaryCodec;

    struct Cleanup(String);

    impl Drop for Cleanup {
        fn drop(&mut self) {
            let _ = Channel::remove_regions(&self.0);
        }
    }

    fn identifier(tag: &str) -> (String, Cleanup) {
        let id = format!("intercom-channel-{}-{}", tag, std::process::id());
        (id.clone(), Cleanup(id))
    }

    fn small(side: Side, id: &str) -> Channel {
        Channel::builder(side, id).capacity(4096).build().unwrap()
    }

    #[test]
    fn test_invoke_queues_without_touching_regions() {
        let (id, _cleanup) = identifier("queue");
        let channel = small(Side::Foo, &id);
        channel.invoke("Ping", args![]).unwrap();
        channel.invoke("Add", args![2, 3]).unwrap();
        assert_eq!(channel.pending().unwrap(), 2);
        assert!(channel.outbox.is_none());
    }

    #[test]
    fn test_invoke_rejects_oversized_name() {
        let (id, _cleanup) = identifier("name");
        let channel = small(Side::Foo, &id);
        let err = channel.invoke("x".repeat(300), args![]).unwrap_err();
        assert!(matches!(err, IntercomError::InvalidInvocation { .. }));
        assert_eq!(channel.pending().unwrap(), 0);
    }

    #[test]
    fn test_first_poll_acks_zeroed_inbox() {
        let (id, _cleanup) = identifier("bootstrap");
        let mut foo = small(Side::Foo, &id);

        let report = foo.poll().unwrap();
        assert!(report.ready);
        assert_eq!(report.sent, None);
        assert_eq!(
            report.received,
            Some(BatchSummary {
                id: 0,
                invocations: 0
            })
        );
        assert_eq!(foo.last_accepted_id(), Some(0));

        let control = foo.shared.control().unwrap();
        assert_eq!(
            control.reading_state(Side::Foo).unwrap(),
            ReadingState::Finished
        );
        assert_eq!(control.frame(Side::Foo).unwrap(), 1);
    }

    #[test]
    fn test_flush_waits_for_peer_finished() {
        let (id, _cleanup) = identifier("stopwait");
        let mut foo = small(Side::Foo, &id);
        foo.invoke("Ping", args![]).unwrap();

        // Bar has not acknowledged anything yet
        let report = foo.poll().unwrap();
        assert_eq!(report.sent, None);
        assert_eq!(foo.pending().unwrap(), 1);

        let control = foo.shared.control().unwrap();
        control
            .set_reading_state(Side::Bar, ReadingState::Finished)
            .unwrap();

        let report = foo.poll().unwrap();
        let sent = report.sent.unwrap();
        assert_eq!(sent.invocations, 1);
        assert_ne!(sent.id, 0);
        assert_eq!(foo.pending().unwrap(), 0);
        assert_eq!(
            control.reading_state(Side::Bar).unwrap(),
            ReadingState::Reading
        );

        let outbox = foo.outbox.as_ref().unwrap();
        assert_eq!(outbox.read_i64(0).unwrap(), sent.id);
        assert_eq!(outbox.read_i32(8).unwrap(), 1);
    }

    #[test]
    fn test_empty_queue_flips_without_writing() {
        let (id, _cleanup) = identifier("empty");
        let mut foo = small(Side::Foo, &id);
        foo.poll().unwrap();

        let control = foo.shared.control().unwrap();
        control
            .set_reading_state(Side::Bar, ReadingState::Finished)
            .unwrap();

        let report = foo.poll().unwrap();
        assert_eq!(report.sent, None);
        assert_eq!(
            control.reading_state(Side::Bar).unwrap(),
            ReadingState::Reading
        );
        assert_eq!(foo.outbox.as_ref().unwrap().read_i64(0).unwrap(), 0);
    }

    #[test]
    fn test_overflow_keeps_queue_and_peer_state() {
        let (id, _cleanup) = identifier("overflow");
        let mut foo = Channel::builder(Side::Foo, &id)
            .capacity(64)
            .build()
            .unwrap();
        foo.invoke("Big", args![Value::bytes(vec![7u8; 100])]).unwrap();
        foo.poll().unwrap();

        let control = foo.shared.control().unwrap();
        control
            .set_reading_state(Side::Bar, ReadingState::Finished)
            .unwrap();

        let err = foo.poll().unwrap_err();
        assert!(matches!(err, IntercomError::Overflow { .. }));
        assert_eq!(foo.pending().unwrap(), 1);
        assert_eq!(
            control.reading_state(Side::Bar).unwrap(),
            ReadingState::Finished
        );
        // Nothing was partially written
        assert_eq!(foo.outbox.as_ref().unwrap().read_i64(0).unwrap(), 0);

        // The condition recurs on the next tick
        assert!(foo.poll().is_err());
    }

    #[test]
    fn test_restore_queue_keeps_order() {
        let shared = ChannelShared::new(
            Side::Foo,
            "unused".to_string(),
            Arc::new(BinaryCodec),
            ChannelConfig::DELIVERY_POLL_INTERVAL,
        );
        shared.enqueue("First".into(), args![]).unwrap();
        let taken = shared.take_queue().unwrap();
        shared.enqueue("Second".into(), args![]).unwrap();
        shared.restore_queue(taken).unwrap();

        let queue = shared.lock_queue().unwrap();
        let names: Vec<&str> = queue.iter().map(|q| q.method.as_str()).collect();
        assert_eq!(names, vec!["First", "Second"]);
    }

    #[test]
    fn test_malformed_batch_is_retried_then_discarded() {
        let (id, _cleanup) = identifier("framing");
        let mut bar = small(Side::Bar, &id);
        bar.poll().unwrap();

        // Count claims more invocations than the region can hold
        let foo_outbox = Region::open_or_create(&Side::Foo.outbox_name(&id), 4096).unwrap();
        foo_outbox.write_i32(8, 1_000_000).unwrap();
        foo_outbox.write_i64(0, 99).unwrap();

        for _ in 1..ChannelConfig::MAX_FRAMING_RETRIES {
            let report = bar.poll().unwrap();
            assert!(report.received.is_none());
            assert_eq!(bar.last_accepted_id(), Some(0));
        }

        bar.poll().unwrap();
        assert_eq!(bar.last_accepted_id(), Some(99));
        let control = bar.shared.control().unwrap();
        assert_eq!(
            control.reading_state(Side::Bar).unwrap(),
            ReadingState::Finished
        );
    }

    #[test]
    fn test_new_rejects_empty_identifier() {
        let err = Channel::new(Side::Foo, "").unwrap_err();
        assert!(matches!(err, IntercomError::Config { .. }));
    }

    #[test]
    fn test_failed_publish_restores_batch() {
        let shared = ChannelShared::new(
            Side::Foo,
            "unused".to_string(),
            Arc::new(BinaryCodec),
            ChannelConfig::DELIVERY_POLL_INTERVAL,
        );
        shared.enqueue("First".into(), args![]).unwrap();
        shared.enqueue("Second".into(), args![]).unwrap();
        let taken = shared.take_queue().unwrap();
        shared.enqueue("Third".into(), args![]).unwrap();

        let err = shared
            .publish_or_restore(taken, || Err(IntercomError::Other("flip failed".into())))
            .unwrap_err();
        assert!(matches!(err, IntercomError::Other(_)));

        let queue = shared.lock_queue().unwrap();
        let names: Vec<&str> = queue.iter().map(|q| q.method.as_str()).collect();
        assert_eq!(names, vec!["First", "Second", "Third"]);
    }

    #[test]
    fn test_successful_publish_hands_batch_back() {
        let shared = ChannelShared::new(
            Side::Bar,
            "unused".to_string(),
            Arc::new(BinaryCodec),
            ChannelConfig::DELIVERY_POLL_INTERVAL,
        );
        shared.enqueue("Ping".into(), args![]).unwrap();
        let taken = shared.take_queue().unwrap();

        let sent = shared.publish_or_restore(taken, || Ok(())).unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(shared.pending().unwrap(), 0);
    }

    #[test]
    fn test_poisoned_queue_is_reported() {
        let shared = Arc::new(ChannelShared::new(
            Side::Foo,
            "unused".to_string(),
            Arc::new(BinaryCodec),
            ChannelConfig::DELIVERY_POLL_INTERVAL,
        ));
        let holder = shared.clone();
        let joined = std::thread::spawn(move || {
            let _queue = holder.lock_queue().unwrap();
            panic!("queue holder died");
        })
        .join();
        assert!(joined.is_err());

        assert!(shared.pending().is_err());
        assert!(shared.enqueue("Ping".into(), args![]).is_err());
    }

    #[test]
    fn test_empty_entries_are_skipped() {
        let (id, _cleanup) = identifier("emptyentry");
        let region = Region::open_or_create(&Side::Foo.outbox_name(&id), 4096).unwrap();
        let ping = Invocation::new("Ping", args![1]).unwrap().encode(&BinaryCodec).unwrap();
        let image = encode_batch(5, &[Vec::new(), ping, Vec::new()], 4096).unwrap();
        write_batch(&region, &image).unwrap();

        let invocations = decode_invocations(&region, &BinaryCodec).unwrap();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].method(), "Ping");
        assert_eq!(invocations[0].args(), &args![1][..]);
    }
}

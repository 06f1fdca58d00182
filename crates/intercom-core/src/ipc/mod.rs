//! Two-process invocation channel over named shared memory.
//!
//! Each side owns one outbox region (`{identifier}.Foo` / `{identifier}.Bar`)
//! and reads the other's. A small control block (`{identifier}.Shared`) holds
//! a reading state and a frame counter per side.
//!
//! # Architecture
//!
//! - **Invocation**: wire layout of one remote call
//! - **Batch**: framing of everything flushed on one poll
//! - **Control**: typed view over the control block
//! - **Channel**: the poll-driven flow-control state machine
//! - **Waiter**: cloneable queuing handle and the delivery waiter
//! - **Builder**: channel options

pub mod batch;
pub mod builder;
pub mod channel;
pub mod control;
pub mod invocation;
pub mod waiter;

pub use batch::{BatchHeader, RawBatch};
pub use builder::ChannelBuilder;
pub use channel::{BatchSummary, Channel, PollReport};
pub use control::{ControlBlock, ReadingState};
pub use invocation::Invocation;
pub use waiter::Invoker;

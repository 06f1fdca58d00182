//! Intercom - remote invocation between two processes over shared memory.
//!
//! Two cooperating processes, one playing [`Side::Foo`] and one playing
//! [`Side::Bar`], exchange batches of method calls through three named shared
//! memory regions. There are no sockets, locks or background threads: each
//! process calls [`Channel::poll`] from its own loop and the channel moves
//! queued invocations across whenever the peer has finished with the last
//! batch.
//!
//! # Example
//!
//! ```no_run
//! use intercom::{args, Channel, HandlerRegistry, Side};
//!
//! fn main() -> intercom::Result<()> {
//!     let mut registry = HandlerRegistry::new();
//!     registry.register("Add", |(a, b): (i64, i64)| {
//!         println!("{} + {} = {}", a, b, a + b);
//!         Ok(())
//!     });
//!
//!     let mut channel = Channel::builder(Side::Bar, "my-app")
//!         .dispatcher(registry)
//!         .build()?;
//!     channel.invoke("Ping", args![])?;
//!
//!     loop {
//!         channel.poll()?;
//!         std::thread::sleep(std::time::Duration::from_millis(16));
//!     }
//! }
//! ```

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod ipc;
pub mod platform;
pub mod region;

// Re-export commonly used types
pub use codec::{BinaryCodec, JsonCodec, Value, ValueCodec};
pub use config::{ChannelConfig, Side};
pub use dispatch::{Dispatch, FromArgs, FromValue, HandlerRegistry};
pub use error::{IntercomError, Result};
pub use ipc::{BatchSummary, Channel, ChannelBuilder, Invocation, Invoker, PollReport};
pub use region::Region;

//! Mapping incoming method names to local handlers.
//!
//! The channel hands every decoded invocation to a [`Dispatch`]
//! implementation and moves on. [`HandlerRegistry`] is the standard one: an
//! explicit table the host fills in at startup.
//!
//! # Failure isolation
//!
//! A handler that returns an error or panics is logged and forgotten. The
//! remaining invocations of the batch are still dispatched and the channel's
//! bookkeeping is unaffected.

mod args;

pub use args::{FromArgs, FromValue};

use crate::codec::Value;
use crate::error::{IntercomError, Result};
use futures::future::{BoxFuture, FutureExt};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, warn};

/// Trait for dispatching decoded invocations to local code.
pub trait Dispatch: Send + Sync {
    /// Run the handler for `method`, returning `false` if none is known.
    ///
    /// Must not block on long-running work and must not panic.
    fn try_dispatch(&self, method: &str, args: &[Value]) -> bool;
}

impl<F> Dispatch for F
where
    F: Fn(&str, &[Value]) -> bool + Send + Sync,
{
    fn try_dispatch(&self, method: &str, args: &[Value]) -> bool {
        self(method, args)
    }
}

type SyncHandler = Box<dyn Fn(&[Value]) -> Result<()> + Send + Sync>;
type AsyncHandler = Box<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

enum Handler {
    Sync(SyncHandler),
    Async(AsyncHandler),
}

fn argument_mismatch(method: &str, message: String) -> IntercomError {
    IntercomError::ArgumentMismatch {
        method: method.to_string(),
        message,
    }
}

/// Turn a caught panic payload into a handler error.
fn handler_panicked(method: &str, payload: &(dyn Any + Send)) -> IntercomError {
    let reason = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown payload".to_string());
    IntercomError::Handler {
        method: method.to_string(),
        message: format!("panicked: {}", reason),
    }
}

/// Name-to-handler table built by the host application.
///
/// # Example
///
/// ```
/// use intercom::dispatch::{Dispatch, HandlerRegistry};
///
/// let mut registry = HandlerRegistry::new();
/// registry.register("Add", |(a, b): (i64, i64)| {
///     println!("{}", a + b);
///     Ok(())
/// });
///
/// assert!(registry.try_dispatch("Add", &intercom::args![2, 3]));
/// assert!(!registry.try_dispatch("Missing", &[]));
/// ```
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler whose arguments are converted with [`FromArgs`].
    ///
    /// Registering the same name twice replaces the earlier handler.
    pub fn register<A, F>(&mut self, method: impl Into<String>, handler: F) -> &mut Self
    where
        A: FromArgs,
        F: Fn(A) -> Result<()> + Send + Sync + 'static,
    {
        let method = method.into();
        let name = method.clone();
        let wrapped = move |args: &[Value]| {
            let parsed = A::from_args(args).map_err(|m| argument_mismatch(&name, m))?;
            handler(parsed)
        };
        self.insert(method, Handler::Sync(Box::new(wrapped)))
    }

    /// Register a handler that receives the raw argument slice.
    pub fn register_raw<F>(&mut self, method: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<()> + Send + Sync + 'static,
    {
        self.insert(method.into(), Handler::Sync(Box::new(handler)))
    }

    /// Register an asynchronous handler.
    ///
    /// The returned future is spawned on the tokio runtime current at
    /// dispatch time; dispatch does not wait for it.
    pub fn register_async<A, F, Fut>(&mut self, method: impl Into<String>, handler: F) -> &mut Self
    where
        A: FromArgs + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let method = method.into();
        let name = method.clone();
        let wrapped = move |args: Vec<Value>| -> BoxFuture<'static, Result<()>> {
            match A::from_args(&args) {
                Ok(parsed) => handler(parsed).boxed(),
                Err(m) => futures::future::ready(Err(argument_mismatch(&name, m))).boxed(),
            }
        };
        self.insert(method, Handler::Async(Box::new(wrapped)))
    }

    fn insert(&mut self, method: String, handler: Handler) -> &mut Self {
        if self.handlers.insert(method.clone(), handler).is_some() {
            warn!("Replaced existing handler for {}", method);
        }
        self
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Dispatch for HandlerRegistry {
    fn try_dispatch(&self, method: &str, args: &[Value]) -> bool {
        let Some(handler) = self.handlers.get(method) else {
            return false;
        };

        match handler {
            Handler::Sync(f) => match std::panic::catch_unwind(AssertUnwindSafe(|| f(args))) {
                Ok(Ok(())) => debug!("Dispatched {}", method),
                Ok(Err(e)) => warn!("Handler for {} failed: {}", method, e),
                Err(payload) => error!("{}", handler_panicked(method, payload.as_ref())),
            },
            Handler::Async(f) => match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let future = f(args.to_vec());
                    let name = method.to_string();
                    runtime.spawn(async move {
                        match AssertUnwindSafe(future).catch_unwind().await {
                            Ok(Ok(())) => debug!("Async handler for {} completed", name),
                            Ok(Err(e)) => warn!("Async handler for {} failed: {}", name, e),
                            Err(payload) => error!("{}", handler_panicked(&name, payload.as_ref())),
                        }
                    });
                }
                Err(_) => {
                    error!(
                        "Async handler for {} needs a tokio runtime; invocation dropped",
                        method
                    );
                }
            },
        }

        true
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("methods", &self.methods())
            .finish()
    }
}

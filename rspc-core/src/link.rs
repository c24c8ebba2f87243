// Link chain
// A chain is an ordered list of links folded from the last to the first, so
// the first link sees the operation first and the result last. Exactly one
// link is expected to terminate the chain by talking to a transport.

use crate::error::LinkError;
use crate::operation::Operation;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

type DataFn = Arc<dyn Fn(Value) + Send + Sync>;
type ErrorFn = Arc<dyn Fn(LinkError) + Send + Sync>;

/// Completion callbacks handed to [`LinkResult::exec`].
///
/// `event` may fire any number of times for subscriptions; `resolve` and
/// `reject` are terminal and fire at most once per operation.
#[derive(Clone)]
pub struct Completion {
    on_event: DataFn,
    on_response: DataFn,
    on_error: ErrorFn,
}

impl Completion {
    /// Single-shot completion: streamed events are treated like the response.
    pub fn new<R, E>(resolve: R, reject: E) -> Self
    where
        R: Fn(Value) + Send + Sync + 'static,
        E: Fn(LinkError) + Send + Sync + 'static,
    {
        let resolve: DataFn = Arc::new(resolve);
        Completion {
            on_event: resolve.clone(),
            on_response: resolve,
            on_error: Arc::new(reject),
        }
    }

    pub fn streaming<V, R, E>(on_event: V, on_response: R, on_error: E) -> Self
    where
        V: Fn(Value) + Send + Sync + 'static,
        R: Fn(Value) + Send + Sync + 'static,
        E: Fn(LinkError) + Send + Sync + 'static,
    {
        Completion {
            on_event: Arc::new(on_event),
            on_response: Arc::new(on_response),
            on_error: Arc::new(on_error),
        }
    }

    pub fn event(&self, data: Value) {
        (self.on_event)(data)
    }

    pub fn resolve(&self, data: Value) {
        (self.on_response)(data)
    }

    pub fn reject(&self, err: LinkError) {
        (self.on_error)(err)
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}

/// Per-operation handle returned by a link.
pub trait LinkResult: Send + Sync {
    /// Begin execution. Failures detected before anything is queued or sent are
    /// returned directly; everything later arrives through `completion`.
    fn exec(&self, completion: Completion) -> Result<(), LinkError>;

    /// Request cancellation. Idempotent, and a no-op once the operation finished.
    fn abort(&self);
}

/// The rest of the chain, as seen by one link.
pub struct Next(Box<dyn LinkResult>);

impl Next {
    /// Hand over the result produced by the links after this one.
    pub fn run(self) -> Box<dyn LinkResult> {
        self.0
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Next")
    }
}

/// A composable unit of middleware or transport logic.
pub trait Link: Send + Sync {
    fn call(&self, op: Arc<Operation>, next: Next) -> Box<dyn LinkResult>;
}

impl<F> Link for F
where
    F: Fn(Arc<Operation>, Next) -> Box<dyn LinkResult> + Send + Sync,
{
    fn call(&self, op: Arc<Operation>, next: Next) -> Box<dyn LinkResult> {
        self(op, next)
    }
}

/// What the end of a chain yields when no link terminated it.
struct Unterminated;

impl LinkResult for Unterminated {
    fn exec(&self, completion: Completion) -> Result<(), LinkError> {
        completion.reject(LinkError::NoTerminatingLink);
        Ok(())
    }

    fn abort(&self) {}
}

/// Compose `links` around `op` and return the outermost handle.
pub fn execute(op: Operation, links: &[Arc<dyn Link>]) -> Box<dyn LinkResult> {
    let op = Arc::new(op);
    let mut prev: Box<dyn LinkResult> = Box::new(Unterminated);

    for link in links.iter().rev() {
        prev = link.call(op.clone(), Next(prev));
    }

    prev
}

use crate::error::ClientError;
use futures::Stream;
use rspc_core::{LinkResult, OperationContext, RspcError};
use serde_json::Value;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

type DataFn = Arc<dyn Fn(Value) + Send + Sync>;
type RpcErrorFn = Arc<dyn Fn(RspcError) + Send + Sync>;
type CompleteFn = Arc<dyn Fn() + Send + Sync>;

/// Callbacks for [`Client::add_subscription`](crate::Client::add_subscription).
#[derive(Clone)]
pub struct SubscriptionOptions {
    pub(crate) on_data: DataFn,
    pub(crate) on_error: Option<RpcErrorFn>,
    pub(crate) on_complete: Option<CompleteFn>,
    pub(crate) context: OperationContext,
}

impl SubscriptionOptions {
    pub fn new<F>(on_data: F) -> Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        Self {
            on_data: Arc::new(on_data),
            on_error: None,
            on_complete: None,
            context: OperationContext::default(),
        }
    }

    /// Called with server-reported failures. Other failures are only logged.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(RspcError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Called once when the server ends the subscription.
    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(f));
        self
    }

    pub fn context(mut self, context: OperationContext) -> Self {
        self.context = context;
        self
    }
}

impl fmt::Debug for SubscriptionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionOptions")
            .field("on_error", &self.on_error.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// Stops a subscription started with `add_subscription`.
///
/// Dropping it leaves the subscription running.
#[derive(Clone)]
pub struct Unsubscribe {
    handle: Option<Arc<dyn LinkResult>>,
}

impl Unsubscribe {
    pub(crate) fn new(handle: Arc<dyn LinkResult>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    pub(crate) fn noop() -> Self {
        Self { handle: None }
    }

    /// True when the subscription never started, so there is nothing to stop.
    pub fn is_noop(&self) -> bool {
        self.handle.is_none()
    }

    pub fn unsubscribe(&self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("noop", &self.handle.is_none())
            .finish()
    }
}

/// Stream of subscription events. Ends when the server completes the
/// subscription or after the first error; dropping it unsubscribes.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<Result<Value, ClientError>>,
    handle: Arc<dyn LinkResult>,
}

impl Subscription {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<Result<Value, ClientError>>,
        handle: Arc<dyn LinkResult>,
    ) -> Self {
        Self { events, handle }
    }

    /// Stop the subscription without waiting for the drop.
    pub fn unsubscribe(&self) {
        self.handle.abort();
    }
}

impl Stream for Subscription {
    type Item = Result<Value, ClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

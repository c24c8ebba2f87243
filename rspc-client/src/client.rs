// rspc client facade
// Builds operations with fresh ids, runs them through the link chain and
// turns the chain's completions into awaited results or event streams.

use crate::error::ClientError;
use crate::subscription::{Subscription, SubscriptionOptions, Unsubscribe};
use futures::future::BoxFuture;
use rspc_core::{
    execute, Completion, Link, LinkError, LinkResult, Operation, OperationContext, OperationId,
    OperationKind, RspcError,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

type ErrorHook = Arc<dyn Fn(RspcError) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type KeyMapper = Arc<dyn Fn(String, Option<Value>) -> (String, Option<Value>) + Send + Sync>;

/// Per-call options for queries and mutations.
#[derive(Debug, Clone, Default)]
pub struct OperationOptions {
    /// Cancelling this token aborts the operation.
    pub signal: Option<CancellationToken>,
    pub context: OperationContext,
}

impl OperationOptions {
    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn with_context(mut self, context: OperationContext) -> Self {
        self.context = context;
        self
    }

    /// Ask batching links to send this operation on its own.
    pub fn skip_batch(mut self) -> Self {
        self.context = self
            .context
            .with(OperationContext::SKIP_BATCH, Value::Bool(true));
        self
    }
}

/// Builder for [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    links: Vec<Arc<dyn Link>>,
    on_error: Option<ErrorHook>,
}

impl ClientBuilder {
    pub fn link<L: Link + 'static>(mut self, link: L) -> Self {
        self.links.push(Arc::new(link));
        self
    }

    pub fn links(mut self, links: impl IntoIterator<Item = Arc<dyn Link>>) -> Self {
        self.links.extend(links);
        self
    }

    /// Global hook seeing every server-reported failure before the caller does.
    pub fn on_error<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(RspcError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_error = Some(Arc::new(move |err| Box::pin(hook(err))));
        self
    }

    pub fn build(self) -> Result<Client, ClientError> {
        if self.links.is_empty() {
            return Err(ClientError::NoLinks);
        }
        Ok(Client {
            links: self.links.into(),
            on_error: self.on_error,
            key_mapper: None,
        })
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("links", &self.links.len())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Entry point for calling procedures through a link chain.
#[derive(Clone)]
pub struct Client {
    links: Arc<[Arc<dyn Link>]>,
    on_error: Option<ErrorHook>,
    key_mapper: Option<KeyMapper>,
}

impl Client {
    pub fn new(links: Vec<Arc<dyn Link>>) -> Result<Self, ClientError> {
        Self::builder().links(links).build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Remap the `(path, input)` pair of every call before its operation is
    /// built.
    pub fn with_key_mapper<F>(mut self, mapper: F) -> Self
    where
        F: Fn(String, Option<Value>) -> (String, Option<Value>) + Send + Sync + 'static,
    {
        self.key_mapper = Some(Arc::new(mapper));
        self
    }

    pub fn map_key(&self, path: String, input: Option<Value>) -> (String, Option<Value>) {
        match &self.key_mapper {
            Some(mapper) => mapper(path, input),
            None => (path, input),
        }
    }

    pub async fn query<T: DeserializeOwned>(
        &self,
        path: &str,
        input: Option<Value>,
        opts: OperationOptions,
    ) -> Result<T, ClientError> {
        let data = self.call(OperationKind::Query, path, input, opts).await?;
        Ok(serde_json::from_value(data)?)
    }

    pub async fn mutation<T: DeserializeOwned>(
        &self,
        path: &str,
        input: Option<Value>,
        opts: OperationOptions,
    ) -> Result<T, ClientError> {
        let data = self.call(OperationKind::Mutation, path, input, opts).await?;
        Ok(serde_json::from_value(data)?)
    }

    /// Start a subscription delivering each event to `opts.on_data`.
    ///
    /// A server-reported failure raised while starting is passed to the
    /// global hook and yields a no-op [`Unsubscribe`].
    pub fn add_subscription(
        &self,
        path: &str,
        input: Option<Value>,
        opts: SubscriptionOptions,
    ) -> Result<Unsubscribe, ClientError> {
        let on_data = opts.on_data.clone();
        let on_complete = opts.on_complete.clone();
        let on_error = opts.on_error.clone();
        let label = path.to_string();

        let completion = Completion::streaming(
            move |data| on_data(data),
            move |_| {
                if let Some(on_complete) = &on_complete {
                    on_complete();
                }
            },
            move |err| {
                if let (Some(on_error), LinkError::Rpc(rpc)) = (&on_error, &err) {
                    on_error(rpc.clone());
                }
                error!("rspc: subscription '{}' failed: {}", label, err);
            },
        );

        match self.start(OperationKind::Subscription, path, input, opts.context, completion) {
            Ok(handle) => Ok(Unsubscribe::new(handle)),
            Err(LinkError::Rpc(err)) => {
                if let Some(hook) = self.on_error.clone() {
                    tokio::spawn(async move {
                        if let Err(e) = hook(err).await {
                            error!("rspc: failure during onError handler for addSubscription: {:#}", e);
                        }
                    });
                }
                Ok(Unsubscribe::noop())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Start a subscription as a stream of events.
    pub fn subscribe(
        &self,
        path: &str,
        input: Option<Value>,
        context: OperationContext,
    ) -> Result<Subscription, ClientError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let events = tx.clone();
        let done = Arc::new(Mutex::new(Some(tx)));
        let failed = done.clone();

        let completion = Completion::streaming(
            move |data| {
                let _ = events.send(Ok(data));
            },
            move |_| {
                done.lock().unwrap_or_else(PoisonError::into_inner).take();
            },
            move |err| {
                let sender = failed.lock().unwrap_or_else(PoisonError::into_inner).take();
                if let Some(sender) = sender {
                    let _ = sender.send(Err(ClientError::Link(err)));
                }
            },
        );

        let handle = self.start(OperationKind::Subscription, path, input, context, completion)?;
        Ok(Subscription::new(rx, handle))
    }

    fn start(
        &self,
        kind: OperationKind,
        path: &str,
        input: Option<Value>,
        context: OperationContext,
        completion: Completion,
    ) -> Result<Arc<dyn LinkResult>, LinkError> {
        let (path, input) = self.map_key(path.to_string(), input);
        let op = Operation::new(OperationId::random(), kind, path, input).with_context(context);
        debug!("rspc: starting {} '{}' ({})", op.kind, op.path, op.id);

        let handle: Arc<dyn LinkResult> = Arc::from(execute(op, &self.links));
        handle.exec(completion)?;
        Ok(handle)
    }

    async fn call(
        &self,
        kind: OperationKind,
        path: &str,
        input: Option<Value>,
        opts: OperationOptions,
    ) -> Result<Value, ClientError> {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Some(tx)));
        let rejected = slot.clone();
        let completion = Completion::new(
            move |data| settle(&slot, Ok(data)),
            move |err| settle(&rejected, Err(err)),
        );

        let outcome = match self.start(kind, path, input, opts.context, completion) {
            Ok(handle) => {
                let signal = opts.signal.unwrap_or_default();
                tokio::select! {
                    _ = signal.cancelled() => {
                        handle.abort();
                        return Err(ClientError::Cancelled);
                    }
                    outcome = rx => outcome.unwrap_or(Err(LinkError::Dropped)),
                }
            }
            Err(err) => Err(err),
        };

        if let Err(LinkError::Rpc(err)) = &outcome {
            self.report(err.clone()).await;
        }
        outcome.map_err(ClientError::from)
    }

    async fn report(&self, err: RspcError) {
        if let Some(hook) = &self.on_error {
            if let Err(e) = hook(err).await {
                error!("rspc: failure during onError handler: {:#}", e);
            }
        }
    }
}

/// Deliver the first terminal outcome; later ones are ignored.
fn settle(
    slot: &Mutex<Option<oneshot::Sender<Result<Value, LinkError>>>>,
    outcome: Result<Value, LinkError>,
) {
    let sender = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    if let Some(sender) = sender {
        let _ = sender.send(outcome);
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("links", &self.links.len())
            .field("on_error", &self.on_error.is_some())
            .field("key_mapper", &self.key_mapper.is_some())
            .finish()
    }
}

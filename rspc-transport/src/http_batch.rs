use crate::headers::HeaderSource;
use crate::http::{HttpLink, HttpLinkConfig, HttpShared};
use crate::transport::ConfigError;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use rspc_core::{
    decode_batch, encode_batch, BatchQueue, Completion, Link, LinkError, LinkResult, Next,
    Operation, Request, Response, ResponseResult,
};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

/// Sub-route receiving batched requests.
pub const BATCH_ROUTE: &str = "_batch";

/// HTTP batch link configuration
#[derive(Debug, Clone)]
pub struct HttpBatchLinkConfig {
    /// Base URL; batches are posted to `{url}/_batch`
    pub url: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Maximum number of operations in a single request
    pub max_batch_size: usize,
    /// Headers added to every request
    pub headers: HeaderSource,
}

impl Default for HttpBatchLinkConfig {
    fn default() -> Self {
        let single = HttpLinkConfig::default();
        Self {
            url: single.url,
            timeout_ms: single.timeout_ms,
            max_batch_size: 100,
            headers: HeaderSource::None,
        }
    }
}

impl HttpBatchLinkConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// One enqueued operation awaiting its slot in a batch response.
struct BatchItem {
    op: Arc<Operation>,
    completion: Completion,
    cancel: CancellationToken,
}

impl BatchItem {
    fn deliver(self, value: Value) {
        match serde_json::from_value::<Response>(value) {
            Ok(Response {
                result: ResponseResult::Response(data),
                ..
            }) => self.completion.resolve(data),
            Ok(Response {
                result: ResponseResult::Error(err),
                ..
            }) => self.completion.reject(LinkError::Rpc(err)),
            Ok(_) => {
                error!("rspc: batch response type mismatch!");
                self.completion.reject(LinkError::Protocol(
                    "batch response type mismatch".to_string(),
                ));
            }
            Err(err) => {
                error!("rspc: malformed batch response item: {}", err);
                self.completion.reject(LinkError::Protocol(err.to_string()));
            }
        }
    }
}

struct BatchSender {
    http: Arc<HttpShared>,
    max_batch_size: usize,
}

impl BatchSender {
    async fn flush(&self, mut items: Vec<BatchItem>) {
        let mut chunks = Vec::new();
        while items.len() > self.max_batch_size {
            let rest = items.split_off(self.max_batch_size);
            chunks.push(std::mem::replace(&mut items, rest));
        }
        chunks.push(items);

        futures::future::join_all(chunks.into_iter().map(|chunk| self.send_chunk(chunk))).await;
    }

    async fn send_chunk(&self, batch: Vec<BatchItem>) {
        let outcome = self.post(&batch).await;

        let results = match outcome {
            Ok(results) if results.len() == batch.len() => results,
            Ok(results) => {
                error!(
                    "rspc: batch response length mismatch! expected {} got {}",
                    batch.len(),
                    results.len()
                );
                reject_all(batch, LinkError::Protocol("batch response length mismatch".into()));
                return;
            }
            Err(err) => {
                error!("rspc: batch request failed: {}", err);
                reject_all(batch, err);
                return;
            }
        };

        for (item, value) in batch.into_iter().zip(results) {
            if item.cancel.is_cancelled() {
                continue;
            }
            item.deliver(value);
        }
    }

    async fn post(&self, batch: &[BatchItem]) -> Result<Vec<Value>, LinkError> {
        let requests: Vec<Request> = batch
            .iter()
            .map(|item| Request::from_operation(&item.op))
            .collect();
        let body = encode_batch(&requests)?;

        let mut headers = self
            .http
            .headers
            .resolve(batch.iter().map(|item| item.op.clone()).collect())
            .await;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        debug!("rspc: sending batch of {} operations", batch.len());
        trace!("rspc: batch body: {}", body);

        let response = self
            .http
            .client
            .post(format!("{}/{}", self.http.url, BATCH_ROUTE))
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| LinkError::Transport(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| LinkError::Transport(e.to_string()))?;

        decode_batch(&bytes)
    }
}

fn reject_all(batch: Vec<BatchItem>, err: LinkError) {
    for item in batch {
        if !item.cancel.is_cancelled() {
            item.completion.reject(err.clone());
        }
    }
}

/// Terminating link coalescing the operations of one scheduling tick into a
/// single `POST {url}/_batch`.
///
/// Operations whose context sets `skipBatch` are sent on their own.
#[derive(Clone)]
pub struct HttpBatchLink {
    queue: BatchQueue<BatchItem>,
    single: HttpLink,
    url: String,
}

impl HttpBatchLink {
    pub fn new(config: HttpBatchLinkConfig) -> Result<Self, ConfigError> {
        if config.max_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }

        let single_config = HttpLinkConfig {
            url: config.url,
            timeout_ms: config.timeout_ms,
            headers: config.headers,
        };
        let http = Arc::new(HttpShared {
            client: single_config.build_client()?,
            url: single_config.base_url(),
            headers: single_config.headers,
        });

        let sender = Arc::new(BatchSender {
            http: http.clone(),
            max_batch_size: config.max_batch_size,
        });
        let queue = BatchQueue::new(move |items: Vec<BatchItem>| {
            let sender = sender.clone();
            async move { sender.flush(items).await }
        });

        Ok(Self {
            queue,
            url: http.url.clone(),
            single: HttpLink::from_shared(http),
        })
    }

    /// Number of operations waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl std::fmt::Debug for HttpBatchLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBatchLink")
            .field("url", &self.url)
            .field("pending", &self.queue.len())
            .finish()
    }
}

impl Link for HttpBatchLink {
    fn call(&self, op: Arc<Operation>, next: Next) -> Box<dyn LinkResult> {
        if op.context.skip_batch() {
            return self.single.call(op, next);
        }

        Box::new(BatchedHttpOperation {
            op,
            queue: self.queue.clone(),
            cancel: CancellationToken::new(),
        })
    }
}

struct BatchedHttpOperation {
    op: Arc<Operation>,
    queue: BatchQueue<BatchItem>,
    cancel: CancellationToken,
}

impl LinkResult for BatchedHttpOperation {
    fn exec(&self, completion: Completion) -> Result<(), LinkError> {
        if self.op.kind.is_streaming() {
            completion.reject(LinkError::Unsupported {
                path: self.op.path.clone(),
            });
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        self.queue.push(BatchItem {
            op: self.op.clone(),
            completion,
            cancel: self.cancel.clone(),
        });
        Ok(())
    }

    // The item keeps its slot in the pending batch; its result is discarded.
    fn abort(&self) {
        self.cancel.cancel();
    }
}

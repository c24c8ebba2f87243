// Single-shot HTTP link
// Queries become `GET {url}/{path}?input=<json>`, mutations
// `POST {url}/{path}` with a JSON body. Each call is one request, and
// aborting an operation drops its in-flight request.

use crate::headers::HeaderSource;
use crate::transport::ConfigError;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use rspc_core::{
    decode_response, Completion, Link, LinkError, LinkResult, Next, Operation, OperationKind,
    ResponseResult,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Settings shared by both HTTP links.
#[derive(Debug, Clone)]
pub struct HttpLinkConfig {
    /// Base URL procedures are appended to
    pub url: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Headers added to every request
    pub headers: HeaderSource,
}

impl Default for HttpLinkConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:4000/rspc".to_string(),
            timeout_ms: 30000,
            headers: HeaderSource::None,
        }
    }
}

impl HttpLinkConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub(crate) fn build_client(&self) -> Result<reqwest::Client, ConfigError> {
        reqwest::Client::builder()
            .timeout(Duration::from_millis(self.timeout_ms))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))
    }

    pub(crate) fn base_url(&self) -> String {
        self.url.trim_end_matches('/').to_string()
    }
}

pub(crate) struct HttpShared {
    pub(crate) client: reqwest::Client,
    pub(crate) url: String,
    pub(crate) headers: HeaderSource,
}

impl HttpShared {
    async fn send(&self, op: Arc<Operation>) -> Result<Value, LinkError> {
        let url = format!("{}/{}", self.url, op.path);
        let mut headers = self.headers.resolve(vec![op.clone()]).await;

        let request = match op.kind {
            OperationKind::Query => {
                let request = self.client.get(&url);
                match &op.input {
                    Some(input) => request.query(&[("input", serde_json::to_string(input)?)]),
                    None => request,
                }
            }
            OperationKind::Mutation => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                let body = match &op.input {
                    Some(input) => serde_json::to_string(input)?,
                    None => "{}".to_string(),
                };
                self.client.post(&url).body(body)
            }
            OperationKind::Subscription | OperationKind::SubscriptionStop => {
                return Err(LinkError::Unsupported {
                    path: op.path.clone(),
                })
            }
        };

        debug!("rspc: {} '{}' over HTTP", op.kind, op.path);

        let response = request
            .headers(headers)
            .send()
            .await
            .map_err(|e| LinkError::Transport(e.to_string()))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| LinkError::Transport(e.to_string()))?;

        trace!("rspc: response body: {}", String::from_utf8_lossy(&body));

        let envelope = decode_response(&body)
            .map_err(|e| LinkError::Transport(format!("malformed response: {}", e)))?;
        match envelope.result {
            ResponseResult::Response(data) => Ok(data),
            ResponseResult::Error(err) => Err(LinkError::Rpc(err)),
            ResponseResult::Event(_) => Err(LinkError::Transport(
                "unexpected 'event' result for a single-shot request".to_string(),
            )),
            ResponseResult::Unknown(kind) => Err(LinkError::Transport(format!(
                "unexpected result type '{}'",
                kind
            ))),
        }
    }
}

/// Terminating link issuing one HTTP request per operation.
#[derive(Clone)]
pub struct HttpLink {
    shared: Arc<HttpShared>,
}

impl HttpLink {
    pub fn new(config: HttpLinkConfig) -> Result<Self, ConfigError> {
        Ok(Self::from_shared(Arc::new(HttpShared {
            client: config.build_client()?,
            url: config.base_url(),
            headers: config.headers,
        })))
    }

    pub(crate) fn from_shared(shared: Arc<HttpShared>) -> Self {
        Self { shared }
    }
}

impl std::fmt::Debug for HttpLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLink")
            .field("url", &self.shared.url)
            .finish()
    }
}

impl Link for HttpLink {
    fn call(&self, op: Arc<Operation>, _next: Next) -> Box<dyn LinkResult> {
        Box::new(HttpOperation {
            op,
            shared: self.shared.clone(),
            cancel: CancellationToken::new(),
        })
    }
}

struct HttpOperation {
    op: Arc<Operation>,
    shared: Arc<HttpShared>,
    cancel: CancellationToken,
}

impl LinkResult for HttpOperation {
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

        let op = self.op.clone();
        let shared = self.shared.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return,
                outcome = shared.send(op) => outcome,
            };
            if cancel.is_cancelled() {
                return;
            }
            match outcome {
                Ok(data) => completion.resolve(data),
                Err(err) => completion.reject(err),
            }
        });
        Ok(())
    }

    fn abort(&self) {
        self.cancel.cancel();
    }
}

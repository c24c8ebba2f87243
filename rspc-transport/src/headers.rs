use futures::future::BoxFuture;
use reqwest::header::HeaderMap;
use rspc_core::Operation;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

type HeaderFn = Arc<dyn Fn(Vec<Arc<Operation>>) -> BoxFuture<'static, HeaderMap> + Send + Sync>;

/// Headers attached to outgoing HTTP requests.
///
/// Dynamic sources receive every operation carried by the request: one for
/// single-shot requests, the whole batch for batched ones. Repeated names in
/// the returned map are sent as repeated headers.
#[derive(Clone, Default)]
pub enum HeaderSource {
    #[default]
    None,
    Static(HeaderMap),
    Dynamic(HeaderFn),
}

impl HeaderSource {
    pub fn dynamic<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<Arc<Operation>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HeaderMap> + Send + 'static,
    {
        HeaderSource::Dynamic(Arc::new(move |ops| Box::pin(f(ops))))
    }

    pub async fn resolve(&self, ops: Vec<Arc<Operation>>) -> HeaderMap {
        match self {
            HeaderSource::None => HeaderMap::new(),
            HeaderSource::Static(headers) => headers.clone(),
            HeaderSource::Dynamic(f) => f(ops).await,
        }
    }
}

impl fmt::Debug for HeaderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderSource::None => f.write_str("None"),
            HeaderSource::Static(headers) => f.debug_tuple("Static").field(headers).finish(),
            HeaderSource::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

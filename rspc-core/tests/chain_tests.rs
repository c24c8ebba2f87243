// Link chain integration tests
// A loopback transport built from the core pieces (batch queue, codec and
// correlation registry) driven through middleware links.

use rspc_core::{
    decode_frame, encode_batch, execute, BatchQueue, Completion, Link, LinkError, LinkResult,
    Next, Operation, PendingRegistry, Request, RequestParams,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Answers every batched request with two events and a response, all in one
/// frame, echoing the request path.
struct Loopback {
    registry: Arc<PendingRegistry>,
    queue: BatchQueue<Request>,
    flushes: Arc<AtomicUsize>,
}

impl Loopback {
    fn new() -> Arc<Self> {
        let registry = Arc::new(PendingRegistry::new());
        let flushes = Arc::new(AtomicUsize::new(0));

        let inbound = registry.clone();
        let counter = flushes.clone();
        let queue = BatchQueue::new(move |batch: Vec<Request>| {
            counter.fetch_add(1, Ordering::SeqCst);
            let frame = encode_batch(&batch).unwrap();
            let requests: Vec<Request> = serde_json::from_str(&frame).unwrap();

            let mut replies = Vec::new();
            for req in requests {
                let RequestParams::Procedure { path, .. } = req.params else {
                    continue;
                };
                replies.push(json!({"id": req.id, "result": {"type": "event", "data": format!("{}:1", path)}}));
                replies.push(json!({"id": req.id, "result": {"type": "event", "data": format!("{}:2", path)}}));
                replies.push(json!({"id": req.id, "result": {"type": "response", "data": path}}));
            }
            for response in decode_frame(&Value::Array(replies).to_string()).unwrap() {
                inbound.dispatch(response);
            }
            futures::future::ready(())
        });

        Arc::new(Self {
            registry,
            queue,
            flushes,
        })
    }
}

struct LoopbackOperation {
    op: Arc<Operation>,
    transport: Arc<Loopback>,
}

impl LinkResult for LoopbackOperation {
    fn exec(&self, completion: Completion) -> Result<(), LinkError> {
        self.transport.registry.insert(self.op.id.clone(), completion);
        self.transport.queue.push(Request::from_operation(&self.op));
        Ok(())
    }

    fn abort(&self) {
        self.transport
            .queue
            .remove_where(|req| req.id == self.op.id);
        self.transport.registry.remove(&self.op.id);
    }
}

fn loopback_link(transport: Arc<Loopback>) -> Arc<dyn Link> {
    Arc::new(move |op: Arc<Operation>, _next: Next| -> Box<dyn LinkResult> {
        Box::new(LoopbackOperation {
            op,
            transport: transport.clone(),
        })
    })
}

/// Middleware counting aborts that reach it before forwarding them.
struct CountAborts {
    inner: Box<dyn LinkResult>,
    aborts: Arc<AtomicUsize>,
}

impl LinkResult for CountAborts {
    fn exec(&self, completion: Completion) -> Result<(), LinkError> {
        self.inner.exec(completion)
    }

    fn abort(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        self.inner.abort();
    }
}

#[derive(Debug, PartialEq)]
enum Seen {
    Event(Value),
    Response(Value),
    Error(LinkError),
}

fn streaming() -> (Completion, mpsc::UnboundedReceiver<Seen>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (events, responses) = (tx.clone(), tx.clone());
    let completion = Completion::streaming(
        move |v| {
            let _ = events.send(Seen::Event(v));
        },
        move |v| {
            let _ = responses.send(Seen::Response(v));
        },
        move |e| {
            let _ = tx.send(Seen::Error(e));
        },
    );
    (completion, rx)
}

// ============================================================================
// BATCHED LOOPBACK
// ============================================================================

#[tokio::test]
async fn test_same_tick_operations_share_one_flush() {
    let transport = Loopback::new();
    let links = [loopback_link(transport.clone())];

    let mut receivers = Vec::new();
    let mut handles = Vec::new();
    for (id, path) in [("1", "a"), ("2", "b"), ("3", "c")] {
        let handle = execute(Operation::subscription(id, path, None), &links);
        let (completion, rx) = streaming();
        handle.exec(completion).unwrap();
        handles.push(handle);
        receivers.push(rx);
    }

    for (path, rx) in ["a", "b", "c"].iter().zip(receivers.iter_mut()) {
        assert_eq!(rx.recv().await, Some(Seen::Event(json!(format!("{}:1", path)))));
        assert_eq!(rx.recv().await, Some(Seen::Event(json!(format!("{}:2", path)))));
        assert_eq!(rx.recv().await, Some(Seen::Response(json!(path))));
    }
    assert_eq!(transport.flushes.load(Ordering::SeqCst), 1);
    assert!(transport.registry.is_empty());
}

#[tokio::test]
async fn test_abort_before_flush_is_silent_and_idempotent() {
    let transport = Loopback::new();
    let aborts = Arc::new(AtomicUsize::new(0));
    let counter = aborts.clone();
    let middleware: Arc<dyn Link> =
        Arc::new(move |_op: Arc<Operation>, next: Next| -> Box<dyn LinkResult> {
            Box::new(CountAborts {
                inner: next.run(),
                aborts: counter.clone(),
            })
        });
    let links = [middleware, loopback_link(transport.clone())];

    let aborted = execute(Operation::query("1", "gone", None), &links);
    let (completion, mut aborted_rx) = streaming();
    aborted.exec(completion).unwrap();
    aborted.abort();
    aborted.abort();

    let kept = execute(Operation::query("2", "kept", None), &links);
    let (completion, mut kept_rx) = streaming();
    kept.exec(completion).unwrap();

    assert_eq!(kept_rx.recv().await, Some(Seen::Event(json!("kept:1"))));
    assert_eq!(aborts.load(Ordering::SeqCst), 2);
    assert!(aborted_rx.try_recv().is_err());
}

// ============================================================================
// CHAIN COMPOSITION
// ============================================================================

#[tokio::test]
async fn test_middleware_can_rewrite_results() {
    let transport = Loopback::new();
    let upper: Arc<dyn Link> = Arc::new(|_op: Arc<Operation>, next: Next| -> Box<dyn LinkResult> {
        struct Upper(Box<dyn LinkResult>);

        impl LinkResult for Upper {
            fn exec(&self, completion: Completion) -> Result<(), LinkError> {
                let on_event = completion.clone();
                let on_response = completion.clone();
                self.0.exec(Completion::streaming(
                    move |v| on_event.event(json!(v.as_str().map(str::to_uppercase))),
                    move |v| on_response.resolve(json!(v.as_str().map(str::to_uppercase))),
                    move |e| completion.reject(e),
                ))
            }

            fn abort(&self) {
                self.0.abort()
            }
        }

        Box::new(Upper(next.run()))
    });
    let links = [upper, loopback_link(transport)];

    let handle = execute(Operation::subscription("1", "feed", None), &links);
    let (completion, mut rx) = streaming();
    handle.exec(completion).unwrap();

    assert_eq!(rx.recv().await, Some(Seen::Event(json!("FEED:1"))));
    assert_eq!(rx.recv().await, Some(Seen::Event(json!("FEED:2"))));
    assert_eq!(rx.recv().await, Some(Seen::Response(json!("FEED"))));
}

#[test]
fn test_chain_without_terminator_rejects() {
    let passthrough: Arc<dyn Link> = Arc::new(|_op: Arc<Operation>, next: Next| next.run());
    let handle = execute(Operation::query("1", "x", None), &[passthrough.clone(), passthrough]);

    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    handle
        .exec(Completion::new(|_| {}, move |e| *sink.lock().unwrap() = Some(e)))
        .unwrap();
    handle.abort();

    assert_eq!(*seen.lock().unwrap(), Some(LinkError::NoTerminatingLink));
}

// Operation handle shared by the persistent links (WebSocket and host bridge).
// Completions live in a correlation registry; requests go out either right
// away or through the link's batch queue.

use rspc_core::{
    BatchQueue, Completion, LinkError, LinkResult, Operation, OperationId, OperationKind,
    PendingRegistry, Request,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type SendFn = Arc<dyn Fn(Request) + Send + Sync>;

#[derive(Clone)]
pub(crate) enum Outbound {
    /// One frame per request.
    Direct(SendFn),
    /// Coalesced with the other requests of the current tick.
    Batched(BatchQueue<Request>),
}

impl Outbound {
    fn push(&self, req: Request) {
        match self {
            Outbound::Direct(send) => send(req),
            Outbound::Batched(batch) => batch.push(req),
        }
    }

    /// Pull a not-yet-flushed request back out. False once it hit the wire.
    fn withdraw(&self, id: &OperationId) -> bool {
        match self {
            Outbound::Direct(_) => false,
            Outbound::Batched(batch) => batch.remove_where(|req| &req.id == id).is_some(),
        }
    }
}

pub(crate) struct StreamOperation {
    op: Arc<Operation>,
    registry: Arc<PendingRegistry>,
    outbound: Outbound,
    finished: AtomicBool,
}

impl StreamOperation {
    pub(crate) fn new(op: Arc<Operation>, registry: Arc<PendingRegistry>, outbound: Outbound) -> Self {
        Self {
            op,
            registry,
            outbound,
            finished: AtomicBool::new(false),
        }
    }
}

impl LinkResult for StreamOperation {
    fn exec(&self, completion: Completion) -> Result<(), LinkError> {
        if self.finished.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.op.kind == OperationKind::SubscriptionStop {
            validate_stop_input(self.op.input.as_ref())?;
        }

        self.registry.insert(self.op.id.clone(), completion);
        self.outbound.push(Request::from_operation(&self.op));
        Ok(())
    }

    fn abort(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }

        let withdrawn = self.outbound.withdraw(&self.op.id);
        let pending = self.registry.remove(&self.op.id).is_some();

        if !withdrawn && pending && self.op.kind == OperationKind::Subscription {
            self.outbound.push(Request::stop(self.op.id.clone()));
        }
    }
}

/// Subscription stops only carry a scalar key.
pub(crate) fn validate_stop_input(input: Option<&Value>) -> Result<(), LinkError> {
    let kind = match input {
        None | Some(Value::Null) | Some(Value::String(_)) | Some(Value::Number(_)) => {
            return Ok(())
        }
        Some(Value::Bool(_)) => "boolean",
        Some(Value::Array(_)) => "array",
        Some(Value::Object(_)) => "object",
    };
    Err(LinkError::InvalidSubscriptionStop(kind.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rspc_core::{Response, ResponseResult};
    use serde_json::json;
    use std::sync::Mutex;

    fn direct() -> (Outbound, Arc<Mutex<Vec<Request>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = sent.clone();
        let outbound = Outbound::Direct(Arc::new(move |req| sink.lock().unwrap().push(req)));
        (outbound, sent)
    }

    fn noop() -> Completion {
        Completion::new(|_| {}, |_| {})
    }

    #[test]
    fn test_stop_input_validation() {
        assert!(validate_stop_input(None).is_ok());
        assert!(validate_stop_input(Some(&json!("sub-1"))).is_ok());
        assert!(validate_stop_input(Some(&json!(3))).is_ok());
        assert_eq!(
            validate_stop_input(Some(&json!({"id": 1}))),
            Err(LinkError::InvalidSubscriptionStop("object".to_string()))
        );
    }

    #[test]
    fn test_invalid_stop_never_registers_or_sends() {
        let registry = Arc::new(PendingRegistry::new());
        let (outbound, sent) = direct();
        let op = Operation::new("stop-1", OperationKind::SubscriptionStop, "", Some(json!([1])));
        let handle = StreamOperation::new(Arc::new(op), registry.clone(), outbound);

        assert!(handle.exec(noop()).is_err());
        assert!(registry.is_empty());
        assert!(sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_abort_sends_stop_once_for_live_subscription() {
        let registry = Arc::new(PendingRegistry::new());
        let (outbound, sent) = direct();
        let op = Operation::subscription("sub-1", "chat.messages", None);
        let handle = StreamOperation::new(Arc::new(op), registry.clone(), outbound);

        handle.exec(noop()).unwrap();
        handle.abort();
        handle.abort();

        assert!(registry.is_empty());
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1], Request::stop(OperationId::new("sub-1")));
    }

    #[test]
    fn test_abort_after_completion_is_silent() {
        let registry = Arc::new(PendingRegistry::new());
        let (outbound, sent) = direct();
        let op = Operation::subscription("sub-2", "ticker", None);
        let handle = StreamOperation::new(Arc::new(op), registry.clone(), outbound);

        handle.exec(noop()).unwrap();
        registry.dispatch(Response::new("sub-2", ResponseResult::Response(json!(null))));
        handle.abort();

        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_abort_before_exec_has_no_effect_on_the_wire() {
        let registry = Arc::new(PendingRegistry::new());
        let (outbound, sent) = direct();
        let op = Operation::query("q-1", "version", None);
        let handle = StreamOperation::new(Arc::new(op), registry.clone(), outbound);

        handle.abort();
        handle.exec(noop()).unwrap();

        assert!(registry.is_empty());
        assert!(sent.lock().unwrap().is_empty());
    }
}

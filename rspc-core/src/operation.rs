use crate::ids::OperationId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The four kinds of call a link can carry. Serialized as the request `method`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
    SubscriptionStop,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
            OperationKind::SubscriptionStop => "subscriptionStop",
        }
    }

    /// Whether the operation needs a transport that can push unsolicited data.
    pub fn is_streaming(&self) -> bool {
        matches!(
            self,
            OperationKind::Subscription | OperationKind::SubscriptionStop
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call key/value bag read by links. Never transmitted on its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationContext(Map<String, Value>);

impl OperationContext {
    /// Context key asking batching links to send the operation on its own.
    pub const SKIP_BATCH: &'static str = "skipBatch";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn skip_batch(&self) -> bool {
        matches!(self.0.get(Self::SKIP_BATCH), Some(Value::Bool(true)))
    }
}

/// One logical RPC call. Built by the client and shared read-only with links.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub path: String,
    pub input: Option<Value>,
    pub context: OperationContext,
}

impl Operation {
    pub fn new(
        id: impl Into<OperationId>,
        kind: OperationKind,
        path: impl Into<String>,
        input: Option<Value>,
    ) -> Self {
        Operation {
            id: id.into(),
            kind,
            path: path.into(),
            input,
            context: OperationContext::default(),
        }
    }

    pub fn query(id: impl Into<OperationId>, path: impl Into<String>, input: Option<Value>) -> Self {
        Self::new(id, OperationKind::Query, path, input)
    }

    pub fn mutation(
        id: impl Into<OperationId>,
        path: impl Into<String>,
        input: Option<Value>,
    ) -> Self {
        Self::new(id, OperationKind::Mutation, path, input)
    }

    pub fn subscription(
        id: impl Into<OperationId>,
        path: impl Into<String>,
        input: Option<Value>,
    ) -> Self {
        Self::new(id, OperationKind::Subscription, path, input)
    }

    pub fn with_context(mut self, context: OperationContext) -> Self {
        self.context = context;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(
            serde_json::to_value(OperationKind::SubscriptionStop).unwrap(),
            json!("subscriptionStop")
        );
        assert_eq!(OperationKind::Query.to_string(), "query");
        assert!(OperationKind::Subscription.is_streaming());
        assert!(!OperationKind::Mutation.is_streaming());
    }

    #[test]
    fn test_skip_batch_requires_literal_true() {
        let ctx = OperationContext::new().with(OperationContext::SKIP_BATCH, json!(true));
        assert!(ctx.skip_batch());

        let ctx = OperationContext::new().with(OperationContext::SKIP_BATCH, json!("yes"));
        assert!(!ctx.skip_batch());
        assert!(!OperationContext::new().skip_batch());
    }
}

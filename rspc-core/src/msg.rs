use crate::error::RspcError;
use crate::ids::OperationId;
use crate::operation::{Operation, OperationKind};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Outbound request: `{id, method, params}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: OperationId,
    pub method: OperationKind,
    pub params: RequestParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestParams {
    Procedure {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
    },
    /// Stops carry only the scalar subscription key, serialized as `null` when absent.
    Stop { input: Option<Value> },
}

impl Request {
    pub fn from_operation(op: &Operation) -> Self {
        let params = match op.kind {
            OperationKind::SubscriptionStop => RequestParams::Stop {
                input: op.input.clone(),
            },
            _ => RequestParams::Procedure {
                path: op.path.clone(),
                input: op.input.clone(),
            },
        };

        Request {
            id: op.id.clone(),
            method: op.kind,
            params,
        }
    }

    /// Stop message releasing the server-side subscription started under `id`.
    pub fn stop(id: OperationId) -> Self {
        Request {
            id,
            method: OperationKind::SubscriptionStop,
            params: RequestParams::Stop { input: None },
        }
    }
}

/// Inbound envelope. `id` is absent on single-shot HTTP responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<OperationId>,
    pub result: ResponseResult,
}

impl Response {
    pub fn new(id: impl Into<OperationId>, result: ResponseResult) -> Self {
        Response {
            id: Some(id.into()),
            result,
        }
    }
}

/// The tagged `result` object of an envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ResponseResult {
    /// Non-terminal streamed value.
    Event(Value),
    /// Terminal success.
    Response(Value),
    /// Terminal failure.
    Error(RspcError),
    /// A tag this client does not understand. Kept so routing can log and move on.
    #[serde(skip_serializing)]
    Unknown(String),
}

impl<'de> Deserialize<'de> for ResponseResult {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawResult {
            #[serde(rename = "type")]
            kind: String,
            #[serde(default)]
            data: Value,
        }

        let raw = RawResult::deserialize(deserializer)?;
        Ok(match raw.kind.as_str() {
            "event" => ResponseResult::Event(raw.data),
            "response" => ResponseResult::Response(raw.data),
            "error" => ResponseResult::Error(
                serde_json::from_value(raw.data).map_err(D::Error::custom)?,
            ),
            other => ResponseResult::Unknown(other.to_string()),
        })
    }
}

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Identifier correlating an outbound request with the envelopes answering it.
///
/// Ids are strings on the wire. Host bridges may answer with a numeric id, so
/// deserialization accepts both and normalizes numbers to their decimal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    pub fn new(value: impl Into<String>) -> Self {
        OperationId(value.into())
    }

    /// Generate a fresh random id.
    pub fn random() -> Self {
        OperationId(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(value: &str) -> Self {
        OperationId::new(value)
    }
}

impl From<String> for OperationId {
    fn from(value: String) -> Self {
        OperationId(value)
    }
}

impl<'de> Deserialize<'de> for OperationId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => OperationId(text),
            RawId::Number(number) => OperationId(number.to_string()),
        })
    }
}

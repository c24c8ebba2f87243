use crate::error::LinkError;
use crate::msg::{Request, Response};
use serde_json::Value;

pub fn encode_request(req: &Request) -> Result<String, LinkError> {
    Ok(serde_json::to_string(req)?)
}

pub fn encode_batch(reqs: &[Request]) -> Result<String, LinkError> {
    Ok(serde_json::to_string(reqs)?)
}

/// Decode the body of a single-shot HTTP response.
pub fn decode_response(data: &[u8]) -> Result<Response, LinkError> {
    Ok(serde_json::from_slice(data)?)
}

/// Decode one frame from a persistent connection. Servers may answer with a
/// single envelope or an array of them.
pub fn decode_frame(text: &str) -> Result<Vec<Response>, LinkError> {
    let value: Value = serde_json::from_str(text)?;
    decode_envelopes(value)
}

pub fn decode_envelopes(value: Value) -> Result<Vec<Response>, LinkError> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(LinkError::from))
            .collect(),
        other => Ok(vec![serde_json::from_value(other)?]),
    }
}

/// Decode a batched HTTP body into its raw items, leaving per-item decoding to
/// the caller so one bad item does not hide the others.
pub fn decode_batch(data: &[u8]) -> Result<Vec<Value>, LinkError> {
    match serde_json::from_slice::<Value>(data)? {
        Value::Array(items) => Ok(items),
        _ => Err(LinkError::Protocol("batch response not an array".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::ResponseResult;
    use crate::operation::Operation;
    use serde_json::json;

    #[test]
    fn test_encode_batch_preserves_order() {
        let reqs = vec![
            Request::from_operation(&Operation::mutation("1", "a", Some(json!(1)))),
            Request::from_operation(&Operation::mutation("2", "b", Some(json!(2)))),
        ];
        let encoded = encode_batch(&reqs).unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value[0]["id"], "1");
        assert_eq!(value[1]["params"]["path"], "b");
    }

    #[test]
    fn test_decode_frame_accepts_object_and_array() {
        let single = decode_frame(r#"{"id":"a","result":{"type":"event","data":1}}"#).unwrap();
        assert_eq!(single.len(), 1);

        let many = decode_frame(
            r#"[{"id":"a","result":{"type":"event","data":1}},{"id":"b","result":{"type":"response","data":2}}]"#,
        )
        .unwrap();
        assert_eq!(many.len(), 2);
        assert_eq!(many[1].result, ResponseResult::Response(json!(2)));
    }

    #[test]
    fn test_decode_batch_rejects_non_array() {
        let err = decode_batch(br#"{"result":{"type":"response","data":1}}"#).unwrap_err();
        assert!(matches!(err, LinkError::Protocol(_)));

        let err = decode_batch(b"not json").unwrap_err();
        assert!(matches!(err, LinkError::Codec(_)));
    }

    #[test]
    fn test_decode_response_without_id() {
        let resp = decode_response(br#"{"result":{"type":"response","data":"hello world"}}"#)
            .unwrap();
        assert_eq!(resp.result, ResponseResult::Response(json!("hello world")));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_frame_keeps_envelope_order(ids in proptest::collection::vec("[a-z0-9]{1,12}", 1..20)) {
                let frame: Vec<Value> = ids
                    .iter()
                    .map(|id| json!({"id": id, "result": {"type": "event", "data": id}}))
                    .collect();
                let decoded = decode_frame(&Value::Array(frame).to_string()).unwrap();

                prop_assert_eq!(decoded.len(), ids.len());
                for (response, id) in decoded.iter().zip(&ids) {
                    prop_assert_eq!(response.id.as_ref().map(|i| i.as_str()), Some(id.as_str()));
                    prop_assert_eq!(&response.result, &ResponseResult::Event(json!(id)));
                }
            }

            #[test]
            fn prop_numeric_ids_decode_as_strings(id in any::<u32>()) {
                let text = json!({"id": id, "result": {"type": "response", "data": null}}).to_string();
                let decoded = decode_frame(&text).unwrap();
                prop_assert_eq!(decoded[0].id.as_ref().map(|i| i.to_string()), Some(id.to_string()));
            }
        }
    }
}

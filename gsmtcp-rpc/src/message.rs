//! JSON-RPC 2.0 messages

use crate::error::{RpcError, RpcResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const JSONRPC_VERSION: &str = "2.0";

/// Request with a single positional parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRequest<P> {
    pub jsonrpc: String,
    pub method: String,
    pub params: [P; 1],
    pub id: String,
}

impl<P> ClientRequest<P> {
    /// Build a request with a fresh id
    pub fn new(method: impl Into<String>, param: P) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params: [param],
            id: generate_id(),
        }
    }
}

/// Unique request id that sorts by creation time
pub fn generate_id() -> String {
    Uuid::now_v7().to_string()
}

/// Response as received; `result` and `error` are kept as raw JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientResponse {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
}

impl ClientResponse {
    /// Decode the result into `R`
    ///
    /// # Errors
    /// - `RpcError::Remote` if the server returned an error
    /// - `RpcError::NullResult` if there is neither an error nor a result
    pub fn into_result<R: DeserializeOwned>(self) -> RpcResult<R> {
        if let Some(error) = self.error {
            return Err(RpcError::Remote(error));
        }
        let result = self.result.ok_or(RpcError::NullResult)?;
        Ok(serde_json::from_value(result)?)
    }
}

/// Serialize a request for `method` with one parameter
pub fn encode_request<P: Serialize>(method: &str, param: P) -> RpcResult<Vec<u8>> {
    Ok(serde_json::to_vec(&ClientRequest::new(method, param))?)
}

/// Decode a response body and extract its result
pub fn decode_response<R: DeserializeOwned>(body: &[u8]) -> RpcResult<R> {
    serde_json::from_slice::<ClientResponse>(body)?.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_round_trip() {
        let first = encode_request("ping", json!({"x": 1})).unwrap();
        let second = encode_request("ping", json!({"x": 1})).unwrap();

        let decoded: ClientRequest<Value> = serde_json::from_slice(&first).unwrap();
        assert_eq!(decoded.jsonrpc, "2.0");
        assert_eq!(decoded.method, "ping");
        assert_eq!(decoded.params, [json!({"x": 1})]);
        assert!(!decoded.id.is_empty());

        let other: ClientRequest<Value> = serde_json::from_slice(&second).unwrap();
        assert_ne!(decoded.id, other.id);
    }

    #[test]
    fn test_params_is_a_one_element_array() {
        let encoded = encode_request("add", 5).unwrap();
        let value: Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(value["params"], json!([5]));
    }

    #[test]
    fn test_ids_are_uuids() {
        let id = generate_id();
        let parsed = Uuid::parse_str(&id).unwrap();
        assert_eq!(parsed.get_version_num(), 7);
    }

    #[test]
    fn test_decode_result() {
        let body = br#"{"jsonrpc":"2.0","result":{"height":42},"error":null,"id":"1"}"#;
        let result: Value = decode_response(body).unwrap();
        assert_eq!(result["height"], 42);
    }

    #[test]
    fn test_decode_remote_error() {
        let body = br#"{"jsonrpc":"2.0","result":null,"error":{"code":-32601,"message":"not found"},"id":"1"}"#;
        match decode_response::<Value>(body) {
            Err(RpcError::Remote(error)) => assert_eq!(error["code"], -32601),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_decode_null_result() {
        let body = br#"{"jsonrpc":"2.0","result":null,"error":null,"id":"1"}"#;
        assert!(matches!(
            decode_response::<Value>(body),
            Err(RpcError::NullResult)
        ));
    }
}

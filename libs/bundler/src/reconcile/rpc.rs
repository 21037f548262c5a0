use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
  #[error("{method} request failed: {message}")]
  Transport { method: String, message: String },
  #[error("{method} rejected: {message}")]
  Rejected { method: String, message: String },
  #[error("{method} malformed response: {detail}")]
  Malformed { method: String, detail: String },
}

/// The three node calls the reconciler needs. Responses are opaque beyond `result`.
#[allow(async_fn_in_trait)]
pub trait ChainRpc {
  async fn accounts(&self) -> Result<Vec<String>, RpcError>;

  /// Submit a contract-creation transaction and return its hash.
  async fn send_transaction(&self, from: &str, data: &str) -> Result<String, RpcError>;

  /// The node's trace for `tx_hash`, as returned.
  async fn trace_transaction(&self, tx_hash: &str) -> Result<Value, RpcError>;
}

/// JSON-RPC 2.0 over HTTP.
#[derive(Debug)]
pub struct JsonRpcClient {
  url: String,
  client: reqwest::Client,
  next_id: AtomicU64,
}

impl JsonRpcClient {
  pub fn new(url: impl Into<String>) -> Self {
    Self {
      url: url.into(),
      client: reqwest::Client::new(),
      next_id: AtomicU64::new(1),
    }
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
    let payload = json!({
      "jsonrpc": "2.0",
      "id": self.next_id.fetch_add(1, Ordering::Relaxed),
      "method": method,
      "params": params,
    });
    let transport = |err: reqwest::Error| RpcError::Transport {
      method: method.to_string(),
      message: err.to_string(),
    };
    let body = self
      .client
      .post(&self.url)
      .json(&payload)
      .send()
      .await
      .map_err(transport)?
      .json::<Value>()
      .await
      .map_err(transport)?;
    parse_response(method, body)
  }
}

/// Pull `result` out of a JSON-RPC response body, turning `error` objects into [`RpcError`].
pub fn parse_response(method: &str, mut body: Value) -> Result<Value, RpcError> {
  if let Some(err_obj) = body.get("error").filter(|err| !err.is_null()) {
    let message = err_obj
      .get("message")
      .and_then(Value::as_str)
      .map(str::to_string)
      .unwrap_or_else(|| err_obj.to_string());
    return Err(RpcError::Rejected {
      method: method.to_string(),
      message,
    });
  }
  match body.get_mut("result") {
    Some(result) => Ok(result.take()),
    None => Err(RpcError::Malformed {
      method: method.to_string(),
      detail: "missing `result`".to_string(),
    }),
  }
}

impl ChainRpc for JsonRpcClient {
  async fn accounts(&self) -> Result<Vec<String>, RpcError> {
    let result = self.call("eth_accounts", json!([])).await?;
    serde_json::from_value(result).map_err(|err| RpcError::Malformed {
      method: "eth_accounts".to_string(),
      detail: err.to_string(),
    })
  }

  async fn send_transaction(&self, from: &str, data: &str) -> Result<String, RpcError> {
    let result = self
      .call("eth_sendTransaction", json!([{ "from": from, "data": data }]))
      .await?;
    result
      .as_str()
      .map(str::to_string)
      .ok_or_else(|| RpcError::Malformed {
        method: "eth_sendTransaction".to_string(),
        detail: format!("expected a transaction hash, got {result}"),
      })
  }

  async fn trace_transaction(&self, tx_hash: &str) -> Result<Value, RpcError> {
    self.call("trace_transaction", json!([tx_hash])).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn result_is_extracted() {
    let body = json!({ "jsonrpc": "2.0", "id": 1, "result": ["0xabc"] });
    assert_eq!(parse_response("eth_accounts", body).expect("result"), json!(["0xabc"]));
  }

  #[test]
  fn error_object_is_rejected_with_message() {
    let body = json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32000, "message": "out of gas" } });
    let err = parse_response("eth_sendTransaction", body).unwrap_err();
    assert_eq!(err.to_string(), "eth_sendTransaction rejected: out of gas");
  }

  #[test]
  fn missing_result_is_malformed() {
    let err = parse_response("trace_transaction", json!({ "id": 1 })).unwrap_err();
    assert!(matches!(err, RpcError::Malformed { .. }));
  }

  #[tokio::test]
  async fn unreachable_node_is_a_transport_error() {
    // bind then release an ephemeral port so nothing is listening on it
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);

    let client = JsonRpcClient::new(format!("http://127.0.0.1:{port}"));
    let err = client.accounts().await.unwrap_err();
    assert!(matches!(err, RpcError::Transport { .. }));
  }
}

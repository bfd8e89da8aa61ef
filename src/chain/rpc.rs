//! JSON-RPC chain client over HTTP

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::decode::decode_transaction;
use super::{to_hex, ChainClient};
use crate::config::RpcConfig;
use crate::errors::ChainError;
use crate::logger::{self, LogTag};

pub struct JsonRpcClient {
    url: String,
    timeout_secs: u64,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(config: &RpcConfig) -> Result<Self, ChainError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChainError::Transport(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            url: config.url.clone(),
            timeout_secs: config.timeout_secs,
            http,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        logger::debug(LogTag::Chain, &format!("→ {} id={} url={}", method, id, self.url));

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChainError::Transport(format!(
                "HTTP {} from {}",
                status.as_u16(),
                self.url
            )));
        }

        let payload: Value = response.json().await.map_err(|e| self.map_transport(e))?;
        interpret_response(payload)
    }

    fn map_transport(&self, e: reqwest::Error) -> ChainError {
        if e.is_timeout() {
            ChainError::Timeout(self.timeout_secs)
        } else {
            ChainError::Transport(e.to_string())
        }
    }
}

/// Split a JSON-RPC envelope into its result or error
fn interpret_response(payload: Value) -> Result<Value, ChainError> {
    if let Some(error) = payload.get("error") {
        return Err(ChainError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }

    payload
        .get("result")
        .cloned()
        .ok_or_else(|| ChainError::MalformedResponse(format!("no result in {}", payload)))
}

fn parse_quantity(value: &Value) -> Result<u64, ChainError> {
    let s = value
        .as_str()
        .ok_or_else(|| ChainError::MalformedResponse(format!("expected hex quantity, got {}", value)))?;
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16)
        .map_err(|e| ChainError::MalformedResponse(format!("invalid quantity '{}': {}", s, e)))
}

#[async_trait]
impl ChainClient for JsonRpcClient {
    async fn transaction_count(&self, address: &str) -> Result<u64, ChainError> {
        let result = self
            .call("eth_getTransactionCount", json!([address, "pending"]))
            .await?;
        parse_quantity(&result)
    }

    async fn estimate_gas(
        &self,
        signed_payload: &[u8],
        from_address: &str,
    ) -> Result<u64, ChainError> {
        let decoded = decode_transaction(signed_payload)?;
        let result = self
            .call("eth_estimateGas", json!([decoded.to_call_object(from_address)]))
            .await?;
        parse_quantity(&result)
    }

    async fn send_raw_transaction(&self, signed_payload: &[u8]) -> Result<String, ChainError> {
        let result = self
            .call("eth_sendRawTransaction", json!([to_hex(signed_payload)]))
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ChainError::MalformedResponse(format!("expected tx hash, got {}", result)))
    }
}

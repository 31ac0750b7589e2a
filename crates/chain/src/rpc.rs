//! JSON-RPC 2.0 client over the shared HTTP transport.
//!
//! One mandatory public endpoint plus an optional private endpoint that is
//! used for `eth_sendRawTransaction` only. The client is stateless beyond
//! its endpoints and default headers; every call carries its own timeout.

use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::http::SharedTransport;

/// Read calls (`eth_call`, block/receipt probes).
pub const READ_TIMEOUT: Duration = Duration::from_millis(800);
/// Batched reads carry more payload.
pub const BATCH_TIMEOUT: Duration = Duration::from_millis(900);
/// Raw transaction submission.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct RpcClient {
    http: SharedTransport,
    public_url: String,
    private_url: Option<String>,
    headers: Vec<(String, String)>,
}

impl RpcClient {
    /// `auth_header` is either a full `Name: Value` pair or a bare value
    /// that becomes the `Authorization` header.
    pub fn new(
        http: SharedTransport,
        public_url: impl Into<String>,
        auth_header: Option<&str>,
        private_url: Option<String>,
    ) -> Self {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        if let Some(raw) = auth_header {
            match raw.split_once(':') {
                Some((name, value)) if !name.trim().is_empty() && !value.trim().is_empty() => {
                    headers.push((name.trim().to_string(), value.trim().to_string()));
                }
                _ => headers.push(("Authorization".to_string(), raw.trim().to_string())),
            }
        }
        Self {
            http,
            public_url: public_url.into(),
            private_url,
            headers,
        }
    }

    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    pub fn has_private_endpoint(&self) -> bool {
        self.private_url.is_some()
    }

    fn envelope(method: &str, params: Value) -> Value {
        json!({"jsonrpc": "2.0", "method": method, "params": params, "id": 1})
    }

    async fn post(&self, url: &str, body: String, timeout: Duration) -> Result<Value> {
        let response = self.http.post(url, body, &self.headers, timeout).await?;
        if !(200..300).contains(&response.status) {
            return Err(Error::Network(format!("http status {}", response.status)));
        }
        serde_json::from_str(&response.body)
            .map_err(|e| Error::Decode(format!("invalid json-rpc body: {e}")))
    }

    fn unwrap_result(value: Value) -> Result<Value> {
        if let Some(err) = value.get("error") {
            return Err(Error::Rpc {
                code: err.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }
        value
            .get("result")
            .cloned()
            .ok_or_else(|| Error::Decode("response missing result".into()))
    }

    /// Single JSON-RPC call against the public endpoint.
    pub async fn request(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        let body = Self::envelope(method, params).to_string();
        let value = self.post(&self.public_url, body, timeout).await?;
        Self::unwrap_result(value)
    }

    /// `eth_call` against `to` with raw calldata. `block` pins the call to a
    /// specific height; `None` means `latest`.
    pub async fn call(&self, to: Address, data: &Bytes, block: Option<u64>) -> Result<Bytes> {
        let tag = match block {
            Some(number) => format!("{number:#x}"),
            None => "latest".to_string(),
        };
        let result = self
            .request(
                "eth_call",
                json!([{"to": format!("{to:#x}"), "data": format!("{data}")}, tag]),
                READ_TIMEOUT,
            )
            .await?;
        decode_hex_bytes(&result)
    }

    /// One HTTP round trip carrying N `eth_call` entries. Request ids are
    /// stringified indices so replies can be reassembled regardless of the
    /// order the endpoint returns them in. Per-entry failures surface as
    /// `None`; the call errs only when the whole batch is unusable.
    pub async fn batch_call(
        &self,
        calls: &[(Address, Bytes)],
        block_tag: &str,
    ) -> Result<Vec<Option<Bytes>>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }
        let entries: Vec<Value> = calls
            .iter()
            .enumerate()
            .map(|(index, (to, data))| {
                json!({
                    "jsonrpc": "2.0",
                    "id": index.to_string(),
                    "method": "eth_call",
                    "params": [{"to": format!("{to:#x}"), "data": format!("{data}")}, block_tag],
                })
            })
            .collect();
        let response = self
            .http
            .post(
                &self.public_url,
                Value::Array(entries).to_string(),
                &self.headers,
                BATCH_TIMEOUT,
            )
            .await?;
        if !(200..300).contains(&response.status) {
            return Err(Error::Network(format!("http status {}", response.status)));
        }
        let parsed: Value = serde_json::from_str(&response.body)
            .map_err(|e| Error::Decode(format!("invalid batch body: {e}")))?;
        let Value::Array(items) = parsed else {
            return Err(Error::Decode("batch response is not an array".into()));
        };

        let mut out = vec![None; calls.len()];
        for item in items {
            let index = match item.get("id") {
                Some(Value::String(s)) => s.parse::<usize>().ok(),
                Some(Value::Number(n)) => n.as_u64().map(|v| v as usize),
                _ => None,
            };
            let Some(index) = index.filter(|i| *i < calls.len()) else {
                continue;
            };
            if let Some(result) = item.get("result") {
                out[index] = decode_hex_bytes(result).ok();
            }
        }
        Ok(out)
    }

    pub async fn send_raw_public(&self, raw: &Bytes) -> Result<B256> {
        let result = self
            .request(
                "eth_sendRawTransaction",
                json!([format!("{raw}")]),
                WRITE_TIMEOUT,
            )
            .await?;
        decode_b256(&result)
    }

    /// Submit through the private endpoint; falls back to the public one
    /// when no private endpoint is configured.
    pub async fn send_raw_private(&self, raw: &Bytes) -> Result<B256> {
        let Some(private_url) = &self.private_url else {
            return self.send_raw_public(raw).await;
        };
        let body = Self::envelope("eth_sendRawTransaction", json!([format!("{raw}")])).to_string();
        let value = self.post(private_url, body, WRITE_TIMEOUT).await?;
        decode_b256(&Self::unwrap_result(value)?)
    }

    pub async fn get_block_by_number(&self, tag: &str, full: bool) -> Result<Value> {
        self.request("eth_getBlockByNumber", json!([tag, full]), READ_TIMEOUT)
            .await
    }

    /// `baseFeePerGas` of the latest block; `None` on pre-1559 chains.
    pub async fn latest_base_fee(&self) -> Result<Option<u128>> {
        let block = self.get_block_by_number("latest", false).await?;
        match block.get("baseFeePerGas") {
            Some(value) if !value.is_null() => Ok(Some(decode_hex_u128(value)?)),
            _ => Ok(None),
        }
    }

    pub async fn block_number(&self) -> Result<u64> {
        let result = self
            .request("eth_blockNumber", json!([]), READ_TIMEOUT)
            .await?;
        decode_hex_u64(&result)
    }

    /// `None` while the transaction is unmined.
    pub async fn transaction_receipt(&self, hash: B256) -> Result<Option<Value>> {
        let result = self
            .request(
                "eth_getTransactionReceipt",
                json!([format!("{hash}")]),
                READ_TIMEOUT,
            )
            .await?;
        Ok((!result.is_null()).then_some(result))
    }

    pub async fn transaction_count(&self, address: Address, tag: &str) -> Result<u64> {
        let result = self
            .request(
                "eth_getTransactionCount",
                json!([format!("{address:#x}"), tag]),
                READ_TIMEOUT,
            )
            .await?;
        decode_hex_u64(&result)
    }

    pub async fn max_priority_fee_per_gas(&self) -> Result<u128> {
        let result = self
            .request("eth_maxPriorityFeePerGas", json!([]), READ_TIMEOUT)
            .await?;
        decode_hex_u128(&result)
    }

    pub async fn new_block_filter(&self) -> Result<String> {
        let result = self
            .request("eth_newBlockFilter", json!([]), READ_TIMEOUT)
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Decode("filter id is not a string".into()))
    }

    pub async fn get_filter_changes(&self, filter_id: &str) -> Result<Vec<Value>> {
        let result = self
            .request("eth_getFilterChanges", json!([filter_id]), READ_TIMEOUT)
            .await?;
        match result {
            Value::Array(items) => Ok(items),
            other => Err(Error::Decode(format!(
                "filter changes is not an array: {other}"
            ))),
        }
    }

    pub async fn uninstall_filter(&self, filter_id: &str) -> Result<bool> {
        let result = self
            .request("eth_uninstallFilter", json!([filter_id]), READ_TIMEOUT)
            .await?;
        Ok(result.as_bool().unwrap_or(false))
    }
}

fn hex_str(value: &Value) -> Result<&str> {
    value
        .as_str()
        .ok_or_else(|| Error::Decode(format!("expected hex string, got {value}")))
}

pub fn decode_hex_bytes(value: &Value) -> Result<Bytes> {
    hex_str(value)?
        .parse::<Bytes>()
        .map_err(|e| Error::Decode(format!("bad hex bytes: {e}")))
}

pub fn decode_hex_u64(value: &Value) -> Result<u64> {
    let raw = hex_str(value)?;
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    u64::from_str_radix(digits, 16).map_err(|e| Error::Decode(format!("bad hex u64 {raw}: {e}")))
}

pub fn decode_hex_u128(value: &Value) -> Result<u128> {
    let raw = hex_str(value)?;
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    u128::from_str_radix(digits, 16).map_err(|e| Error::Decode(format!("bad hex u128 {raw}: {e}")))
}

pub fn decode_hex_u256(value: &Value) -> Result<U256> {
    let raw = hex_str(value)?;
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    U256::from_str_radix(digits, 16)
        .map_err(|e| Error::Decode(format!("bad hex u256 {raw}: {e}")))
}

pub fn decode_b256(value: &Value) -> Result<B256> {
    hex_str(value)?
        .parse::<B256>()
        .map_err(|e| Error::Decode(format!("bad hash: {e}")))
}

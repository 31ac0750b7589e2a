//! Submission pipeline with replace-by-fee escalation.
//!
//! Each attempt signs the current fields, submits (public endpoint by
//! default, private endpoint when enabled, or a race across configured
//! relays), then polls for a receipt. On timeout both fee fields are
//! bumped by a fixed factor at the same nonce and the payload is re-signed
//! and resubmitted. Prior sends are never cancelled; mempool fee
//! replacement takes care of them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::{Bytes, B256};
use futures::future::select_ok;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::crypto::keccak::keccak256;
use crate::error::{Error, Result};
use crate::http::SharedTransport;
use crate::rpc::{decode_b256, RpcClient, WRITE_TIMEOUT};
use crate::signer::{TxFields, Wallet};
use crate::telemetry::{MetricsEvent, MetricsLogger};

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct RelayEndpoint {
    pub url: String,
    pub auth_header: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SubmitConfig {
    pub bump_factor: f64,
    pub bump_interval: Duration,
    pub max_bumps: u32,
    pub receipt_timeout: Duration,
    pub submit_private: bool,
    pub dry_run: bool,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            bump_factor: 1.2,
            bump_interval: Duration::from_secs(4),
            max_bumps: 3,
            receipt_timeout: Duration::from_millis(3_000),
            submit_private: false,
            dry_run: true,
        }
    }
}

pub struct Submitter {
    rpc: Arc<RpcClient>,
    http: SharedTransport,
    wallet: Arc<Wallet>,
    relays: Vec<RelayEndpoint>,
    config: SubmitConfig,
    metrics: MetricsLogger,
}

impl Submitter {
    pub fn new(
        rpc: Arc<RpcClient>,
        http: SharedTransport,
        wallet: Arc<Wallet>,
        relays: Vec<RelayEndpoint>,
        config: SubmitConfig,
        metrics: MetricsLogger,
    ) -> Self {
        Self {
            rpc,
            http,
            wallet,
            relays,
            config,
            metrics,
        }
    }

    /// Drive one transaction to a receipt, escalating fees at the same
    /// nonce on every timeout. Exhausting the bump budget is a
    /// `Submission` failure.
    pub async fn submit_with_rbf(&self, mut fields: TxFields) -> Result<B256> {
        let mut previous_hash = B256::ZERO;
        for attempt in 0..=self.config.max_bumps {
            let raw = self.wallet.sign_transaction(&fields)?;
            let (hash, submit_kind) = self.send(&raw).await?;

            self.metrics.emit(MetricsEvent::TxSubmitted {
                tx_hash: format!("{hash}"),
                nonce: fields.nonce,
                submit_kind,
                rbf_index: attempt,
                max_fee_per_gas: fields.max_fee_per_gas,
                max_priority_fee: fields.max_priority_fee_per_gas,
            });

            if self.config.dry_run {
                info!(tx_hash = %hash, nonce = fields.nonce, "dry run, not broadcast");
                return Ok(hash);
            }
            info!(tx_hash = %hash, nonce = fields.nonce, attempt, "transaction submitted");

            if self.wait_for_receipt(hash).await? {
                return Ok(hash);
            }
            previous_hash = hash;
            if attempt == self.config.max_bumps {
                break;
            }

            fields.max_fee_per_gas = bump_fee(fields.max_fee_per_gas, self.config.bump_factor);
            fields.max_priority_fee_per_gas =
                bump_fee(fields.max_priority_fee_per_gas, self.config.bump_factor);
            self.metrics.emit(MetricsEvent::TxRbfBump {
                tx_hash_prev: format!("{previous_hash}"),
                nonce: fields.nonce,
                bump_index: attempt + 1,
                max_fee: fields.max_fee_per_gas,
                max_priority_fee: fields.max_priority_fee_per_gas,
            });
            warn!(
                nonce = fields.nonce,
                bump = attempt + 1,
                max_fee = fields.max_fee_per_gas,
                "no receipt, bumping fees"
            );
            tokio::time::sleep(self.config.bump_interval).await;
        }
        Err(Error::Submission(format!(
            "no receipt after {} bumps (last {previous_hash})",
            self.config.max_bumps
        )))
    }

    async fn send(&self, raw: &Bytes) -> Result<(B256, &'static str)> {
        if self.config.dry_run {
            return Ok((B256::from(keccak256(raw)), "dry_run"));
        }
        if !self.relays.is_empty() {
            return Ok((self.send_via_relays(raw).await?, "relay"));
        }
        if self.config.submit_private && self.rpc.has_private_endpoint() {
            return Ok((self.rpc.send_raw_private(raw).await?, "private"));
        }
        Ok((self.rpc.send_raw_public(raw).await?, "public"))
    }

    /// Race the configured relays; the first non-error response wins.
    async fn send_via_relays(&self, raw: &Bytes) -> Result<B256> {
        let body =
            json!({"jsonrpc": "2.0", "method": "eth_sendRawTransaction", "params": [format!("{raw}")], "id": 1})
                .to_string();
        let attempts = self.relays.iter().map(|relay| {
            let http = self.http.clone();
            let body = body.clone();
            let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
            if let Some(auth) = &relay.auth_header {
                headers.push(("Authorization".to_string(), auth.clone()));
            }
            let url = relay.url.clone();
            Box::pin(async move {
                let response = http.post(&url, body, &headers, WRITE_TIMEOUT).await?;
                if !(200..300).contains(&response.status) {
                    return Err(Error::Network(format!("relay status {}", response.status)));
                }
                let value: serde_json::Value = serde_json::from_str(&response.body)
                    .map_err(|e| Error::Decode(e.to_string()))?;
                if let Some(err) = value.get("error") {
                    return Err(Error::Rpc {
                        code: err.get("code").and_then(|c| c.as_i64()).unwrap_or(0),
                        message: err
                            .get("message")
                            .and_then(|m| m.as_str())
                            .unwrap_or("relay error")
                            .to_string(),
                    });
                }
                decode_b256(value.get("result").unwrap_or(&serde_json::Value::Null))
            }) as futures::future::BoxFuture<'_, Result<B256>>
        });

        match select_ok(attempts).await {
            Ok((hash, _rest)) => Ok(hash),
            Err(err) => {
                debug!(error = %err, "last relay error");
                Err(Error::Submission("all relays failed".into()))
            }
        }
    }

    /// Poll `eth_getTransactionReceipt` until the deadline. `Ok(false)`
    /// means unmined within the window (the RBF trigger, not a failure).
    pub async fn wait_for_receipt(&self, hash: B256) -> Result<bool> {
        let deadline = Instant::now() + self.config.receipt_timeout;
        while Instant::now() < deadline {
            if let Ok(Some(_receipt)) = self.rpc.transaction_receipt(hash).await {
                self.metrics.emit(MetricsEvent::TxReceipt {
                    tx_hash: format!("{hash}"),
                });
                info!(tx_hash = %hash, "receipt observed");
                return Ok(true);
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
        Ok(false)
    }
}

fn bump_fee(fee: u128, factor: f64) -> u128 {
    (fee as f64 * factor) as u128
}

/// Sandwich guard: refuse to submit when the observed price impact runs
/// past 1.5x the slippage ceiling.
pub fn sandwich_risk_exceeded(observed_impact_bps: f64, max_slippage_bps: f64) -> bool {
    observed_impact_bps > max_slippage_bps * 1.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::MockTransport;
    use crate::signer::NonceManager;
    use alloy::consensus::TxEnvelope;
    use alloy::eips::eip2718::Decodable2718;
    use alloy::primitives::{Address, U256};
    use serde_json::json;

    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn fields(nonce: u64) -> TxFields {
        TxFields {
            chain_id: 137,
            nonce,
            gas_limit: 1_900_000,
            max_fee_per_gas: 100_000_000_000,
            max_priority_fee_per_gas: 30_000_000_000,
            to: Address::repeat_byte(0x42),
            value: U256::ZERO,
            data: Bytes::from(vec![0x01]),
        }
    }

    fn submitter(mock: Arc<MockTransport>, config: SubmitConfig) -> Submitter {
        let rpc = Arc::new(RpcClient::new(mock.clone(), "http://rpc.test", None, None));
        let wallet = Arc::new(Wallet::from_private_key(TEST_KEY).unwrap());
        Submitter::new(rpc, mock, wallet, Vec::new(), config, MetricsLogger::disabled())
    }

    fn extract_raw_tx(body: &str) -> Bytes {
        let value: serde_json::Value = serde_json::from_str(body).unwrap();
        value["params"][0].as_str().unwrap().parse().unwrap()
    }

    #[tokio::test]
    async fn dry_run_signs_but_never_broadcasts() {
        let mock = Arc::new(MockTransport::new());
        let submitter = submitter(
            mock.clone(),
            SubmitConfig {
                dry_run: true,
                ..Default::default()
            },
        );

        let hash = submitter.submit_with_rbf(fields(0)).await.unwrap();

        assert_ne!(hash, B256::ZERO);
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn bumps_escalate_fees_at_a_fixed_nonce() {
        let mock = Arc::new(MockTransport::new());
        // Three submissions accepted, receipts never found (queue empties
        // for receipt polls, which the zero timeout skips anyway).
        for _ in 0..3 {
            mock.push_result(json!(format!("{}", B256::repeat_byte(0x11))));
        }
        let submitter = submitter(
            mock.clone(),
            SubmitConfig {
                dry_run: false,
                max_bumps: 2,
                bump_interval: Duration::ZERO,
                receipt_timeout: Duration::ZERO,
                ..Default::default()
            },
        );

        let err = submitter.submit_with_rbf(fields(42)).await.unwrap_err();
        assert!(matches!(err, Error::Submission(_)));

        let sends: Vec<_> = mock
            .requests()
            .iter()
            .filter(|(_, body)| body.contains("eth_sendRawTransaction"))
            .map(|(_, body)| extract_raw_tx(body))
            .collect();
        assert_eq!(sends.len(), 3);

        let mut last_fee = 0u128;
        for raw in &sends {
            let TxEnvelope::Eip1559(signed) = TxEnvelope::decode_2718(&mut raw.as_ref()).unwrap()
            else {
                panic!("wrong envelope");
            };
            assert_eq!(signed.tx().nonce, 42);
            assert!(signed.tx().max_fee_per_gas > last_fee);
            last_fee = signed.tx().max_fee_per_gas;
        }
    }

    #[tokio::test]
    async fn receipt_ends_the_attempt() {
        let mock = Arc::new(MockTransport::new());
        mock.push_result(json!(format!("{}", B256::repeat_byte(0x22))));
        mock.push_result(json!({"status": "0x1", "blockNumber": "0x10"}));
        let submitter = submitter(
            mock.clone(),
            SubmitConfig {
                dry_run: false,
                receipt_timeout: Duration::from_millis(500),
                ..Default::default()
            },
        );

        let hash = submitter.submit_with_rbf(fields(7)).await.unwrap();
        assert_eq!(hash, B256::repeat_byte(0x22));
    }

    #[test]
    fn sandwich_guard_trips_past_the_multiplier() {
        assert!(!sandwich_risk_exceeded(74.0, 50.0));
        assert!(!sandwich_risk_exceeded(75.0, 50.0));
        assert!(sandwich_risk_exceeded(76.0, 50.0));
    }
}

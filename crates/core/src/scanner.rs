//! Health factor scanning for the watched user set.
//!
//! Preferred path: one Multicall3 `tryAggregate(false, ...)` carrying a
//! `getUserAccountData` call per user. Fallback: one batched JSON-RPC
//! request of plain `eth_call`s, reassembled by id. Either way the sixth
//! return word is the 1e18-scaled health factor; anything malformed reads
//! as 0.0, which the selection logic treats as "unknown, not underwater"
//! only after the usual dust filtering upstream.

use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use tracing::{debug, warn};

use liquidator_chain::abi::decode_bool_bytes_array_return;
use liquidator_chain::contracts::{try_aggregate_call, user_account_data_call};
use liquidator_chain::{Error, Result, RpcClient};
use liquidator_dex::math::u256_to_f64;

const WAD: f64 = 1e18;

#[derive(Debug, Clone, Copy)]
pub struct UserHealth {
    pub user: Address,
    pub health_factor: f64,
}

/// Sixth word of a `getUserAccountData` return, scaled down from 1e18.
pub fn decode_health_factor(data: &[u8]) -> f64 {
    if data.len() < 6 * 32 {
        return 0.0;
    }
    let word = U256::from_be_slice(&data[5 * 32..6 * 32]);
    u256_to_f64(word) / WAD
}

pub struct HealthScanner {
    rpc: Arc<RpcClient>,
    multicall: Address,
    pool: Address,
}

impl HealthScanner {
    pub fn new(rpc: Arc<RpcClient>, multicall: Address, pool: Address) -> Self {
        Self {
            rpc,
            multicall,
            pool,
        }
    }

    pub async fn fetch_health_factors(&self, users: &[Address]) -> Result<Vec<UserHealth>> {
        match users {
            [] => Ok(Vec::new()),
            [user] => {
                let ret = self
                    .rpc
                    .call(self.pool, &user_account_data_call(*user), None)
                    .await?;
                Ok(vec![UserHealth {
                    user: *user,
                    health_factor: decode_health_factor(&ret),
                }])
            }
            _ => match self.fetch_via_multicall(users).await {
                Ok(health) => Ok(health),
                Err(err) => {
                    warn!(error = %err, "multicall scan failed, using json-rpc batch");
                    self.fetch_via_batch(users).await
                }
            },
        }
    }

    async fn fetch_via_multicall(&self, users: &[Address]) -> Result<Vec<UserHealth>> {
        let calls: Vec<(Address, Bytes)> = users
            .iter()
            .map(|user| (self.pool, user_account_data_call(*user)))
            .collect();
        let data = try_aggregate_call(false, &calls);

        let ret = self.rpc.call(self.multicall, &data, None).await?;
        let results = decode_bool_bytes_array_return(&ret)
            .ok_or_else(|| Error::Decode("tryAggregate return malformed".into()))?;

        Ok(users
            .iter()
            .enumerate()
            .map(|(index, user)| {
                let health_factor = results
                    .get(index)
                    .filter(|(success, _)| *success)
                    .map(|(_, data)| decode_health_factor(data))
                    .unwrap_or(0.0);
                UserHealth {
                    user: *user,
                    health_factor,
                }
            })
            .collect())
    }

    async fn fetch_via_batch(&self, users: &[Address]) -> Result<Vec<UserHealth>> {
        let calls: Vec<(Address, Bytes)> = users
            .iter()
            .map(|user| (self.pool, user_account_data_call(*user)))
            .collect();
        let replies = self.rpc.batch_call(&calls, "latest").await?;

        Ok(users
            .iter()
            .zip(replies)
            .map(|(user, reply)| {
                let health_factor = reply
                    .map(|data| decode_health_factor(&data))
                    .unwrap_or_else(|| {
                        debug!(user = %user, "no batch reply, health unknown");
                        0.0
                    });
                UserHealth {
                    user: *user,
                    health_factor,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liquidator_chain::abi::{append_bool, append_bytes, append_usize, WORD};
    use liquidator_chain::http::mock::MockTransport;
    use serde_json::json;

    fn account_data_hex(health_factor_wei: u128) -> String {
        let mut body = String::new();
        for _ in 0..5 {
            body.push_str(&format!("{:064x}", 1u64));
        }
        body.push_str(&format!("{health_factor_wei:064x}"));
        format!("0x{body}")
    }

    fn account_data_bytes(health_factor_wei: u128) -> Vec<u8> {
        let mut out = vec![0u8; 6 * 32];
        out[5 * 32..].copy_from_slice(&U256::from(health_factor_wei).to_be_bytes::<32>());
        out
    }

    /// `tryAggregate` return bytes for the given per-user results.
    fn aggregate_return_hex(results: &[(bool, Vec<u8>)]) -> String {
        let elements: Vec<Vec<u8>> = results
            .iter()
            .map(|(success, data)| {
                let mut element = Vec::new();
                append_bool(&mut element, *success);
                append_usize(&mut element, 2 * WORD);
                append_bytes(&mut element, data);
                element
            })
            .collect();

        let mut out = Vec::new();
        append_usize(&mut out, WORD);
        append_usize(&mut out, elements.len());
        let mut offset = elements.len() * WORD;
        for element in &elements {
            append_usize(&mut out, offset);
            offset += element.len();
        }
        for element in &elements {
            out.extend_from_slice(element);
        }
        format!(
            "0x{}",
            out.iter().map(|b| format!("{b:02x}")).collect::<String>()
        )
    }

    #[test]
    fn sixth_word_scales_down_from_wad() {
        let raw: Bytes = account_data_hex(1_000_000_000_000_000_000).parse().unwrap();
        assert!((decode_health_factor(&raw) - 1.0).abs() < 1e-12);

        let half: Bytes = account_data_hex(500_000_000_000_000_000).parse().unwrap();
        assert!((decode_health_factor(&half) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn short_or_missing_data_reads_as_zero() {
        assert_eq!(decode_health_factor(&[]), 0.0);
        assert_eq!(decode_health_factor(&[0u8; 64]), 0.0);
    }

    #[tokio::test]
    async fn single_user_goes_straight_to_the_pool() {
        let mock = Arc::new(MockTransport::new());
        mock.push_result(json!(account_data_hex(2_000_000_000_000_000_000)));
        let rpc = Arc::new(RpcClient::new(mock.clone(), "http://rpc.test", None, None));
        let scanner = HealthScanner::new(rpc, Address::repeat_byte(0xaa), Address::repeat_byte(0xbb));

        let health = scanner
            .fetch_health_factors(&[Address::repeat_byte(0x01)])
            .await
            .unwrap();

        assert_eq!(health.len(), 1);
        assert!((health[0].health_factor - 2.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn multicall_results_decode_per_user() {
        let mock = Arc::new(MockTransport::new());
        mock.push_result(json!(aggregate_return_hex(&[
            (true, account_data_bytes(1_200_000_000_000_000_000)),
            (false, Vec::new()), // failed inner call reads as unknown
            (true, account_data_bytes(800_000_000_000_000_000)),
        ])));
        let rpc = Arc::new(RpcClient::new(mock.clone(), "http://rpc.test", None, None));
        let scanner = HealthScanner::new(rpc, Address::repeat_byte(0xaa), Address::repeat_byte(0xbb));

        let health = scanner
            .fetch_health_factors(&[
                Address::repeat_byte(0x01),
                Address::repeat_byte(0x02),
                Address::repeat_byte(0x03),
            ])
            .await
            .unwrap();

        assert!((health[0].health_factor - 1.2).abs() < 1e-12);
        assert_eq!(health[1].health_factor, 0.0);
        assert!((health[2].health_factor - 0.8).abs() < 1e-12);
        // One multicall round trip, no batch fallback.
        assert_eq!(mock.requests().len(), 1);
        assert!(mock.requests()[0].1.contains("eth_call"));
    }

    #[tokio::test]
    async fn multicall_failure_degrades_to_json_rpc_batch() {
        let mock = Arc::new(MockTransport::new());
        // Multicall attempt: RPC error object.
        mock.push(
            200,
            json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32000, "message": "no multicall"}})
                .to_string(),
        );
        // Batch fallback: two replies out of order, one failure.
        mock.push(
            200,
            json!([
                {"jsonrpc": "2.0", "id": "1", "result": account_data_hex(900_000_000_000_000_000)},
                {"jsonrpc": "2.0", "id": "0", "result": account_data_hex(1_500_000_000_000_000_000)},
            ])
            .to_string(),
        );
        let rpc = Arc::new(RpcClient::new(mock, "http://rpc.test", None, None));
        let scanner = HealthScanner::new(rpc, Address::repeat_byte(0xaa), Address::repeat_byte(0xbb));

        let health = scanner
            .fetch_health_factors(&[Address::repeat_byte(0x01), Address::repeat_byte(0x02)])
            .await
            .unwrap();

        assert!((health[0].health_factor - 1.5).abs() < 1e-12);
        assert!((health[1].health_factor - 0.9).abs() < 1e-12);
    }
}

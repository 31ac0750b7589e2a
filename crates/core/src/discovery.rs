//! Optional borrower discovery through the protocol subgraph.
//!
//! Used to seed the watch set when no explicit `MONITOR_USERS` list is
//! configured. Failures here are never fatal; the engine just keeps the
//! users it already has.

use std::time::Duration;

use alloy::primitives::Address;
use serde_json::{json, Value};
use tracing::debug;

use liquidator_chain::{Error, HttpTransport, Result, SharedTransport};

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SubgraphClient {
    http: SharedTransport,
    url: String,
}

impl SubgraphClient {
    pub fn new(http: SharedTransport, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    /// Addresses of borrowers with open debt, capped at `limit`.
    pub async fn fetch_borrowers(&self, limit: usize) -> Result<Vec<Address>> {
        let query = format!(
            "{{ users(first: {limit}, where: {{ borrowedReservesCount_gt: 0 }}) {{ id }} }}"
        );
        let body = json!({ "query": query }).to_string();
        let headers = [("Content-Type".to_string(), "application/json".to_string())];
        let response = self
            .http
            .post(&self.url, body, &headers, DISCOVERY_TIMEOUT)
            .await?;
        if !(200..300).contains(&response.status) {
            return Err(Error::Network(format!(
                "subgraph status {}",
                response.status
            )));
        }

        let value: Value = serde_json::from_str(&response.body)
            .map_err(|e| Error::Decode(format!("subgraph body: {e}")))?;
        let users = value
            .pointer("/data/users")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Decode("subgraph response missing data.users".into()))?;

        let mut out = Vec::with_capacity(users.len());
        for user in users {
            let Some(id) = user.get("id").and_then(Value::as_str) else {
                continue;
            };
            match id.parse::<Address>() {
                Ok(address) => out.push(address),
                Err(err) => debug!(id, error = %err, "unparseable borrower id"),
            }
        }
        Ok(out)
    }
}

//! New-block source with three strategies in strict preference order:
//! WebSocket `newHeads` subscription, HTTP block filter, and plain
//! `eth_blockNumber` polling. Whatever strategy is active, heights flow
//! through one monotonic cursor so the consumer sees every new height
//! exactly once and never a duplicate or a decrease.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::providers::{Provider, ProviderBuilder};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::rpc::RpcClient;

/// Monotonic height cursor. `advance` answers whether the height is new.
#[derive(Debug, Default)]
pub struct BlockCursor {
    last: u64,
}

impl BlockCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, height: u64) -> bool {
        if height > self.last {
            self.last = height;
            true
        } else {
            false
        }
    }

    pub fn last(&self) -> u64 {
        self.last
    }
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// WS endpoint for the subscription strategy; `None` skips straight to
    /// the HTTP strategies.
    pub ws_url: Option<String>,
    /// Reconnect backoff bounds for the subscription.
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    /// No header within this window means the subscription stalled.
    pub stall_timeout: Duration,
    /// Polling cadence and its error backoff ceiling.
    pub poll_interval: Duration,
    pub poll_backoff_max: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            ws_url: None,
            reconnect_base: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(30),
            stall_timeout: Duration::from_secs(600),
            poll_interval: Duration::from_millis(10),
            poll_backoff_max: Duration::from_millis(80),
        }
    }
}

pub struct BlockWatcher {
    rpc: Arc<RpcClient>,
    config: WatcherConfig,
    running: Arc<AtomicBool>,
}

impl BlockWatcher {
    pub fn new(rpc: Arc<RpcClient>, config: WatcherConfig) -> Self {
        Self {
            rpc,
            config,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Flag checked by every strategy loop; clear it to stop the watcher.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Start the watcher task and hand back the height channel.
    pub fn spawn(self, channel_size: usize) -> mpsc::Receiver<u64> {
        let (tx, rx) = mpsc::channel(channel_size);
        tokio::spawn(async move {
            self.run(tx).await;
        });
        rx
    }

    async fn run(self, tx: mpsc::Sender<u64>) {
        let mut cursor = BlockCursor::new();

        if let Some(ws_url) = self.config.ws_url.clone() {
            info!(url = %ws_url, "block source: newHeads subscription");
            if self.run_subscription(&ws_url, &tx, &mut cursor).await {
                return;
            }
            warn!("subscription unavailable, falling back to block filter");
        }

        info!("block source: eth_newBlockFilter");
        if self.run_filter(&tx, &mut cursor).await {
            return;
        }
        warn!("block filter unavailable, falling back to polling");

        info!("block source: eth_blockNumber polling");
        self.run_polling(&tx, &mut cursor).await;
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Returns `true` when the watcher finished (shutdown or consumer
    /// gone); `false` asks the caller to cascade to the next strategy.
    async fn run_subscription(
        &self,
        ws_url: &str,
        tx: &mpsc::Sender<u64>,
        cursor: &mut BlockCursor,
    ) -> bool {
        let mut backoff = self.config.reconnect_base;
        let mut ever_connected = false;

        while self.is_running() {
            let provider = match ProviderBuilder::new().connect(ws_url).await {
                Ok(provider) => provider,
                Err(err) => {
                    if !ever_connected {
                        warn!(error = %err, "ws connect failed");
                        return false;
                    }
                    warn!(error = %err, "ws reconnect failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.config.reconnect_max);
                    continue;
                }
            };

            // One subscription per connection; it lives until the stream
            // ends or stalls.
            let subscription = match provider.subscribe_blocks().await {
                Ok(subscription) => subscription,
                Err(err) => {
                    warn!(error = %err, "newHeads subscribe failed");
                    if !ever_connected {
                        return false;
                    }
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.config.reconnect_max);
                    continue;
                }
            };
            ever_connected = true;
            backoff = self.config.reconnect_base;
            info!("newHeads subscription active");

            let mut stream = subscription.into_stream();
            loop {
                if !self.is_running() {
                    return true;
                }
                match tokio::time::timeout(self.config.stall_timeout, stream.next()).await {
                    Ok(Some(header)) => {
                        let height = header.inner.number;
                        if cursor.advance(height) && tx.send(height).await.is_err() {
                            return true;
                        }
                    }
                    Ok(None) => {
                        warn!("newHeads stream closed, reconnecting");
                        break;
                    }
                    Err(_) => {
                        warn!(
                            stall_secs = self.config.stall_timeout.as_secs(),
                            "no header within health window, reconnecting"
                        );
                        break;
                    }
                }
            }
        }
        true
    }

    async fn run_filter(&self, tx: &mpsc::Sender<u64>, cursor: &mut BlockCursor) -> bool {
        let filter_id = match self.rpc.new_block_filter().await {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, "newBlockFilter failed");
                return false;
            }
        };

        let mut consecutive_errors = 0u32;
        while self.is_running() {
            match self.rpc.get_filter_changes(&filter_id).await {
                Ok(changes) => {
                    consecutive_errors = 0;
                    if changes.is_empty() {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        continue;
                    }
                    // Hashes only say "something advanced"; the canonical
                    // height comes from eth_blockNumber.
                    if let Ok(height) = self.rpc.block_number().await {
                        if cursor.advance(height) && tx.send(height).await.is_err() {
                            break;
                        }
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                Err(err) => {
                    consecutive_errors += 1;
                    debug!(error = %err, consecutive_errors, "getFilterChanges failed");
                    if consecutive_errors > 25 {
                        warn!("block filter keeps failing, abandoning it");
                        let _ = self.rpc.uninstall_filter(&filter_id).await;
                        return false;
                    }
                    tokio::time::sleep(Duration::from_millis(40)).await;
                }
            }
        }

        let _ = self.rpc.uninstall_filter(&filter_id).await;
        true
    }

    async fn run_polling(&self, tx: &mpsc::Sender<u64>, cursor: &mut BlockCursor) {
        let mut backoff = self.config.poll_interval;
        while self.is_running() {
            match self.rpc.block_number().await {
                Ok(height) => {
                    backoff = self.config.poll_interval;
                    if cursor.advance(height) && tx.send(height).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    debug!(error = %err, "blockNumber poll failed");
                    backoff = (backoff * 2).min(self.config.poll_backoff_max);
                }
            }
            tokio::time::sleep(backoff).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::MockTransport;
    use serde_json::json;

    #[test]
    fn cursor_suppresses_duplicates_and_decreases() {
        let mut cursor = BlockCursor::new();
        let heights = [100u64, 100, 99, 101, 101, 102];
        let seen: Vec<u64> = heights
            .into_iter()
            .filter(|height| cursor.advance(*height))
            .collect();
        assert_eq!(seen, vec![100, 101, 102]);
        assert_eq!(cursor.last(), 102);
    }

    #[tokio::test]
    async fn filter_strategy_fetches_canonical_height_and_uninstalls() {
        let mock = Arc::new(MockTransport::new());
        mock.push_result(json!("0xf1"));
        mock.push_result(json!(["0xabc"])); // one change
        mock.push_result(json!("0x64")); // canonical height 100
        let rpc = Arc::new(RpcClient::new(mock.clone(), "http://rpc.test", None, None));
        let watcher = BlockWatcher::new(rpc, WatcherConfig::default());
        let running = watcher.shutdown_handle();

        let mut rx = watcher.spawn(8);
        assert_eq!(rx.recv().await, Some(100));
        running.store(false, Ordering::Relaxed);
        // Let the loop notice the flag and uninstall.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let bodies: Vec<String> = mock.requests().into_iter().map(|(_, b)| b).collect();
        assert!(bodies.iter().any(|b| b.contains("eth_newBlockFilter")));
        assert!(bodies.iter().any(|b| b.contains("eth_blockNumber")));
    }

    #[tokio::test]
    async fn polling_strategy_dedupes_heights() {
        let mock = Arc::new(MockTransport::new());
        mock.push_result(json!("0x64"));
        mock.push_result(json!("0x64"));
        mock.push_result(json!("0x65"));
        let rpc = Arc::new(RpcClient::new(mock, "http://rpc.test", None, None));
        let watcher = BlockWatcher::new(rpc, WatcherConfig::default());
        let running = watcher.shutdown_handle();
        let (tx, mut rx) = mpsc::channel(8);

        let handle = tokio::spawn(async move {
            let mut cursor = BlockCursor::new();
            watcher.run_polling(&tx, &mut cursor).await;
        });

        assert_eq!(rx.recv().await, Some(100));
        assert_eq!(rx.recv().await, Some(101));
        running.store(false, Ordering::Relaxed);
        let _ = handle.await;
    }
}

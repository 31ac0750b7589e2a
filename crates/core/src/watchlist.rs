//! Watched positions keyed by `(user, debt_asset, collateral_asset)`.
//!
//! Entries are upserted on every scan and never removed implicitly. Two
//! derived selections drive the pipeline: the prestage set (health factor
//! within the buffer above 1.0) triggers calldata precomputation, and the
//! trigger set (health factor below 1.0) triggers execution. The buffer
//! adapts between configured bounds based on how busy recent prestage
//! rounds were.

use std::collections::HashMap;

use alloy::primitives::Address;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchKey {
    pub user: Address,
    pub debt_asset: Address,
    pub collateral_asset: Address,
}

#[derive(Debug, Clone)]
pub struct WatchEntry {
    pub key: WatchKey,
    pub usd_value: f64,
    pub health_factor: f64,
    /// Watch until `health_factor <= 1.0 + target_buffer`. Non-positive
    /// values take the list's current adaptive buffer on upsert.
    pub target_buffer: f64,
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub default_buffer: f64,
    pub buffer_min: f64,
    pub buffer_max: f64,
    pub max_prestage: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            default_buffer: 0.05,
            buffer_min: 0.01,
            buffer_max: 0.10,
            max_prestage: 32,
        }
    }
}

const BUFFER_STEP: f64 = 0.005;

pub struct Watchlist {
    entries: Mutex<HashMap<WatchKey, WatchEntry>>,
    buffer: Mutex<f64>,
    config: WatchConfig,
}

impl Watchlist {
    pub fn new(config: WatchConfig) -> Self {
        let buffer = config
            .default_buffer
            .clamp(config.buffer_min, config.buffer_max);
        Self {
            entries: Mutex::new(HashMap::new()),
            buffer: Mutex::new(buffer),
            config,
        }
    }

    /// Upsert the scan results and return the entries that should be
    /// pre-staged now, bounded by the prestage budget.
    pub fn upsert_and_select_prestage(&self, scan: Vec<WatchEntry>) -> Vec<WatchEntry> {
        let buffer = *self.buffer.lock();
        let mut prestage = Vec::new();
        let mut entries = self.entries.lock();
        for mut entry in scan {
            if entry.target_buffer <= 0.0 {
                entry.target_buffer = buffer;
            }
            if entry.health_factor <= 1.0 + entry.target_buffer
                && prestage.len() < self.config.max_prestage
            {
                prestage.push(entry.clone());
            }
            entries.insert(entry.key, entry);
        }
        prestage
    }

    /// Entries that crossed into liquidatable territory.
    pub fn collect_triggers(&self) -> Vec<WatchEntry> {
        self.entries
            .lock()
            .values()
            .filter(|entry| entry.health_factor < 1.0)
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> Vec<WatchEntry> {
        self.entries.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn current_buffer(&self) -> f64 {
        *self.buffer.lock()
    }

    /// Widen the buffer when prestage rounds run near-empty, narrow it
    /// when they hit the budget; always stays inside the configured
    /// bounds.
    pub fn adapt_buffer(&self, recent_prestage_count: usize) {
        let mut buffer = self.buffer.lock();
        if recent_prestage_count >= self.config.max_prestage {
            *buffer -= BUFFER_STEP;
        } else if recent_prestage_count < self.config.max_prestage / 4 {
            *buffer += BUFFER_STEP;
        }
        *buffer = buffer.clamp(self.config.buffer_min, self.config.buffer_max);
    }
}

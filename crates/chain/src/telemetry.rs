//! Append-only JSONL metrics stream.
//!
//! Producers serialize one tagged event per line into a channel; a single
//! background thread drains the queue in batches and flushes to the file.
//! Dropping the last handle closes the channel and ends the writer.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Serialize)]
pub struct VenueQuote {
    pub dex: &'static str,
    pub out_units: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MetricsEvent {
    GasQuote {
        base_fee: u128,
        priority_fee: u128,
        max_fee: u128,
    },
    RouteQuote {
        pair: String,
        amount_in_units: String,
        quotes: Vec<VenueQuote>,
        selected_dex: &'static str,
    },
    TxBuilt {
        tx_kind: &'static str,
        pair: String,
        users_count: usize,
        debt_units_total: String,
        amount_out_min_units: String,
    },
    TxSubmitted {
        tx_hash: String,
        nonce: u64,
        submit_kind: &'static str,
        rbf_index: u32,
        max_fee_per_gas: u128,
        max_priority_fee: u128,
    },
    TxRbfBump {
        tx_hash_prev: String,
        nonce: u64,
        bump_index: u32,
        max_fee: u128,
        max_priority_fee: u128,
    },
    TxReceipt {
        tx_hash: String,
    },
    SkipReason {
        pair: String,
        user: String,
        usd_value: f64,
        reason: &'static str,
    },
}

#[derive(Serialize)]
struct Record {
    ts_ms: u128,
    #[serde(flatten)]
    event: MetricsEvent,
}

#[derive(Clone)]
pub struct MetricsLogger {
    sender: Option<mpsc::Sender<String>>,
}

impl MetricsLogger {
    /// Open (or create) the JSONL file and start the writer thread.
    pub fn to_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        let (sender, receiver) = mpsc::channel::<String>();

        std::thread::Builder::new()
            .name("metrics-writer".into())
            .spawn(move || {
                let mut out = BufWriter::new(file);
                while let Ok(line) = receiver.recv() {
                    let _ = out.write_all(line.as_bytes());
                    let _ = out.write_all(b"\n");
                    // Drain whatever queued up behind the first line before
                    // paying for a flush.
                    while let Ok(line) = receiver.try_recv() {
                        let _ = out.write_all(line.as_bytes());
                        let _ = out.write_all(b"\n");
                    }
                    let _ = out.flush();
                }
            })?;

        Ok(Self {
            sender: Some(sender),
        })
    }

    /// Sink that drops every event; used in tests.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn emit(&self, event: MetricsEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        let record = Record {
            ts_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or(0),
            event,
        };
        if let Ok(line) = serde_json::to_string(&record) {
            let _ = sender.send(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_snake_case_tags() {
        let record = Record {
            ts_ms: 1,
            event: MetricsEvent::SkipReason {
                pair: "0xaa/0xbb".into(),
                user: "0xcc".into(),
                usd_value: 123.0,
                reason: "profit_guard",
            },
        };
        let line = serde_json::to_string(&record).unwrap();
        assert!(line.contains("\"event\":\"skip_reason\""));
        assert!(line.contains("\"reason\":\"profit_guard\""));
        assert!(line.contains("\"ts_ms\":1"));
    }

    #[test]
    fn file_sink_appends_one_json_object_per_line() {
        let dir = std::env::temp_dir().join(format!("liq-metrics-{}", std::process::id()));
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("metrics.jsonl");
        let _ = std::fs::remove_file(&path);

        {
            let logger = MetricsLogger::to_file(&path).unwrap();
            logger.emit(MetricsEvent::TxReceipt {
                tx_hash: "0x01".into(),
            });
            logger.emit(MetricsEvent::GasQuote {
                base_fee: 40,
                priority_fee: 2,
                max_fee: 82,
            });
        }
        // Writer drains after the senders drop.
        std::thread::sleep(std::time::Duration::from_millis(200));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("event").is_some());
        }
    }
}

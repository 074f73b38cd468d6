//! File-backed `SnapshotSink` / `EventSink` implementations.
//!
//! Stands in for the relational store described by schema: one JSON
//! object per line, append-only, each line carrying the same fields the
//! `liquidity_snapshots` / `anomaly_events` tables would. Idempotency on
//! `snapshot_id`/`event_id` is the real store's job; this sink trusts the
//! caller not to replay the same record twice, which holds for the
//! orchestrator's single-writer-per-file usage.

use async_trait::async_trait;
use liquidity_engine::anomaly::AnomalyEvent;
use liquidity_engine::error::{EngineError, Result};
use liquidity_engine::metrics::MetricsSample;
use liquidity_engine::{EventSink, SnapshotSink};
use serde::Serialize;
use serde_json::json;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

pub struct JsonlSnapshotSink {
    exchange: String,
    file: Mutex<tokio::fs::File>,
}

impl JsonlSnapshotSink {
    pub async fn open(path: &str, exchange: impl Into<String>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| EngineError::Configuration(format!("opening {path}: {e}")))?;
        Ok(Self {
            exchange: exchange.into(),
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl SnapshotSink for JsonlSnapshotSink {
    async fn write(&self, sample: &MetricsSample) -> Result<()> {
        let depth_by_band: serde_json::Map<String, serde_json::Value> = sample
            .depth
            .iter()
            .map(|band| {
                (
                    band.bps.to_string(),
                    json!({
                        "bid_base": band.bid_base.to_string(),
                        "ask_base": band.ask_base.to_string(),
                        "bid_usd": band.bid_usd.to_string(),
                        "ask_usd": band.ask_usd.to_string(),
                    }),
                )
            })
            .collect();

        let row = json!({
            "snapshot_id": Uuid::new_v4(),
            "symbol": sample.symbol,
            "exchange": self.exchange,
            "timestamp": sample.captured_at,
            "mid_price": sample.mid.to_string(),
            "spread_bps": sample.spread_bps.to_string(),
            "last_update_id": sample.last_update_id,
            "depth": depth_by_band,
            "imbalance": sample.imbalance.to_string(),
            "slippage": serialize_slippage(sample),
            "best_bid_qty": sample.best_bid_qty.to_string(),
            "best_ask_qty": sample.best_ask_qty.to_string(),
        });

        write_line(&self.file, &row).await
    }
}

fn serialize_slippage(sample: &MetricsSample) -> serde_json::Value {
    sample
        .slippage
        .iter()
        .map(|s| {
            let side = match s.side {
                liquidity_engine::metrics::SlippageSide::Buy => "buy",
                liquidity_engine::metrics::SlippageSide::Sell => "sell",
            };
            let result = match &s.result {
                liquidity_engine::metrics::SlippageResult::Filled {
                    avg_fill,
                    slippage_abs,
                    slippage_bps,
                    ..
                } => json!({
                    "avg_fill": avg_fill.to_string(),
                    "slippage_abs": slippage_abs.to_string(),
                    "slippage_bps": slippage_bps.to_string(),
                }),
                liquidity_engine::metrics::SlippageResult::InsufficientLiquidity => {
                    json!({ "insufficient_liquidity": true })
                }
            };
            json!({ "notional": s.notional.to_string(), "side": side, "result": result })
        })
        .collect()
}

pub struct JsonlEventSink {
    exchange: String,
    file: Mutex<tokio::fs::File>,
}

impl JsonlEventSink {
    pub async fn open(path: &str, exchange: impl Into<String>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| EngineError::Configuration(format!("opening {path}: {e}")))?;
        Ok(Self {
            exchange: exchange.into(),
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl EventSink for JsonlEventSink {
    async fn write(&self, event: &AnomalyEvent) -> Result<()> {
        let row = json!({
            "event_id": Uuid::new_v4(),
            "symbol": event.symbol,
            "exchange": self.exchange,
            "detected_at": event.detected_at,
            "severity": severity_label(event.severity),
            "reason": event.reason,
            "z_scores": event.z_scores.iter().map(|(m, z)| json!({"metric": m, "z": z})).collect::<Vec<_>>(),
            "max_zscore": event.max_zscore,
            "mid": event.market_state.mid.to_string(),
            "spread_bps": event.market_state.spread_bps.to_string(),
            "depth_10bps_usd": event.market_state.depth_10bps_usd.map(|d| d.to_string()),
            "imbalance": event.market_state.imbalance.to_string(),
        });

        write_line(&self.file, &row).await
    }
}

fn severity_label(severity: liquidity_engine::Severity) -> &'static str {
    match severity {
        liquidity_engine::Severity::Warning => "warning",
        liquidity_engine::Severity::High => "high",
        liquidity_engine::Severity::Critical => "critical",
    }
}

async fn write_line<T: Serialize>(file: &Mutex<tokio::fs::File>, value: &T) -> Result<()> {
    let mut line = serde_json::to_vec(value)
        .map_err(|e| EngineError::Configuration(format!("serializing sink row: {e}")))?;
    line.push(b'\n');
    let mut guard = file.lock().await;
    guard
        .write_all(&line)
        .await
        .map_err(|e| EngineError::Configuration(format!("writing sink row: {e}")))?;
    Ok(())
}

//! `SnapshotFetcher` adapter over the exchange's REST depth-snapshot
//! endpoint: one `reqwest::Client`, one base URL, JSON decode, mapping
//! non-2xx responses and transport failures into the engine's error type.

use liquidity_engine::book::Snapshot;
use liquidity_engine::decimal::{Price, Qty};
use liquidity_engine::error::{EngineError, Result};
use liquidity_engine::ports::SnapshotFetcher;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use async_trait::async_trait;

pub struct BinanceRestFetcher {
    client: Client,
    base_url: String,
}

impl BinanceRestFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DepthSnapshotResponse {
    #[serde(rename = "lastUpdateId")]
    last_update_id: u64,
    bids: Vec<[String; 2]>,
    asks: Vec<[String; 2]>,
}

#[async_trait]
impl SnapshotFetcher for BinanceRestFetcher {
    /// Venue rate limits are honored upstream: `BookEngineTask::request_snapshot`
    /// guards each symbol with an in-flight flag, so this adapter never sees
    /// more than one outstanding `fetch` call per symbol at a time.
    async fn fetch(&self, symbol: &str, depth_limit: usize) -> Result<Snapshot> {
        let url = format!("{}/fapi/v1/depth", self.base_url);
        let limit = depth_limit.max(5).to_string();
        let resp = self
            .client
            .get(&url)
            .query(&[("symbol", symbol), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::Transport(format!(
                "snapshot fetch for {symbol} failed: {status} {body}"
            )));
        }

        let parsed: DepthSnapshotResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::Transport(format!("decoding snapshot for {symbol}: {e}")))?;

        Ok(Snapshot {
            last_update_id: parsed.last_update_id,
            bids: parse_levels(&parsed.bids)?,
            asks: parse_levels(&parsed.asks)?,
        })
    }
}

fn parse_levels(levels: &[[String; 2]]) -> Result<Vec<(Price, Qty)>> {
    levels
        .iter()
        .map(|[price, qty]| {
            let price: Decimal = price
                .parse()
                .map_err(|_| EngineError::MalformedFrame(format!("non-numeric price {price}")))?;
            let qty: Decimal = qty
                .parse()
                .map_err(|_| EngineError::MalformedFrame(format!("non-numeric qty {qty}")))?;
            Ok((Price(price), Qty(qty)))
        })
        .collect()
}

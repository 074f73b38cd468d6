//! Layers CLI flags, an optional TOML file, and environment variables into
//! the immutable configuration the orchestrator and engine run with,
//! failing fast if a required value is missing from every layer.

use std::path::Path;

use liquidity_engine::EngineConfig;
use serde::Deserialize;

use crate::error::MonitorError;

/// Optional on-disk overrides for `EngineConfig` fields. Every field is
/// optional; anything absent keeps the built-in default.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub book_view_depth: Option<usize>,
    pub max_resync_attempts: Option<u32>,
    pub resync_failure_window_ms: Option<u64>,
    pub metric_period_ms: Option<u64>,
    pub depth_bands_bps: Option<Vec<u32>>,
    pub imbalance_levels: Option<usize>,
    pub rolling_window_len: Option<usize>,
    pub rolling_min_samples: Option<usize>,
    pub anomaly_cooldown_ms: Option<u64>,
    pub exchange: Option<String>,
    pub ws_url: Option<String>,
    pub rest_base_url: Option<String>,
    pub snapshot_sink_path: Option<String>,
    pub event_sink_path: Option<String>,
}

/// The fully-resolved configuration for one orchestrator run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub exchange: String,
    pub ws_url: String,
    pub rest_base_url: String,
    pub snapshot_sink_path: String,
    pub event_sink_path: String,
    /// Required by the orchestrator; never logged.
    pub db_password: String,
}

impl AppConfig {
    pub fn load(config_path: Option<&Path>) -> Result<Self, MonitorError> {
        let file_config = match config_path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    MonitorError::Configuration(format!("reading {}: {e}", path.display()))
                })?;
                toml::from_str::<FileConfig>(&text).map_err(|e| {
                    MonitorError::Configuration(format!("parsing {}: {e}", path.display()))
                })?
            }
            None => FileConfig::default(),
        };

        let mut engine = EngineConfig::default();
        if let Some(v) = file_config.book_view_depth {
            engine.book_view_depth = v;
        }
        if let Some(v) = file_config.max_resync_attempts {
            engine.max_resync_attempts = v;
        }
        if let Some(v) = file_config.resync_failure_window_ms {
            engine.resync_failure_window_ms = v;
        }
        if let Some(v) = file_config.metric_period_ms {
            engine.metric_period_ms = v;
        }
        if let Some(v) = file_config.depth_bands_bps {
            engine.depth_bands_bps = v;
        }
        if let Some(v) = file_config.imbalance_levels {
            engine.imbalance_levels = v;
        }
        if let Some(v) = file_config.rolling_window_len {
            engine.rolling_window_len = v;
        }
        if let Some(v) = file_config.rolling_min_samples {
            engine.rolling_min_samples = v;
        }
        if let Some(v) = file_config.anomaly_cooldown_ms {
            engine.anomaly_cooldown_ms = v;
        }

        let db_password = std::env::var("DB_PASSWORD").map_err(|_| {
            MonitorError::Configuration("DB_PASSWORD environment variable is required".to_string())
        })?;

        Ok(Self {
            engine,
            exchange: file_config.exchange.unwrap_or_else(|| "binance".to_string()),
            ws_url: file_config
                .ws_url
                .unwrap_or_else(|| "wss://fstream.binance.com/stream".to_string()),
            rest_base_url: file_config
                .rest_base_url
                .unwrap_or_else(|| "https://fapi.binance.com".to_string()),
            snapshot_sink_path: file_config
                .snapshot_sink_path
                .unwrap_or_else(|| "liquidity_snapshots.ndjson".to_string()),
            event_sink_path: file_config
                .event_sink_path
                .unwrap_or_else(|| "anomaly_events.ndjson".to_string()),
            db_password,
        })
    }
}

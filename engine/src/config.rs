//! Immutable engine configuration, constructed once at startup and passed
//! by reference. `EngineConfig` carries every tunable the book, metrics,
//! and anomaly stages need; the orchestrator binary layers CLI/file/env
//! values into this struct once at startup and hands out `&EngineConfig`
//! to every stage.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Top-K levels per side kept in a published `BookView`.
pub const DEFAULT_BOOK_VIEW_DEPTH: usize = 50;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Top-K levels per side retained in each `BookView`.
    pub book_view_depth: usize,
    /// Consecutive resync attempts allowed before a book goes `Stale`.
    pub max_resync_attempts: u32,
    /// Window in which `max_resync_attempts` failures count as persistent (ms).
    pub resync_failure_window_ms: u64,
    /// Minimum interval between published `MetricsSample`s per symbol (ms).
    pub metric_period_ms: u64,
    /// Basis-point depth bands, e.g. `[10, 50, 100]`.
    pub depth_bands_bps: Vec<u32>,
    /// Number of top-of-book levels per side used for imbalance.
    pub imbalance_levels: usize,
    /// Notional sizes (in quote currency) to estimate slippage for.
    pub slippage_notionals: Vec<Decimal>,
    /// Rolling window capacity per (symbol, metric) pair.
    pub rolling_window_len: usize,
    /// Minimum samples in a rolling window before z-scores are computed.
    pub rolling_min_samples: usize,
    /// Debounce window for repeated anomaly events of the same symbol (ms).
    pub anomaly_cooldown_ms: u64,
    /// Metric names monitored by the anomaly detector.
    pub monitored_metrics: Vec<&'static str>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            book_view_depth: DEFAULT_BOOK_VIEW_DEPTH,
            max_resync_attempts: 3,
            resync_failure_window_ms: 60_000,
            metric_period_ms: 1_000,
            depth_bands_bps: vec![10, 50, 100],
            imbalance_levels: 5,
            slippage_notionals: vec![dec!(100_000), dec!(500_000), dec!(1_000_000)],
            rolling_window_len: 300,
            rolling_min_samples: 30,
            anomaly_cooldown_ms: 5_000,
            monitored_metrics: vec!["spread_bps", "depth_10bps_usd", "imbalance"],
        }
    }
}

//! Rolling statistical baselines and severity-classified anomaly events.

pub mod window;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::config::EngineConfig;
use crate::counters::AnomalyCounters;
use crate::metrics::MetricsSample;

pub use window::RollingWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    High,
    Critical,
}

impl Severity {
    /// `None` below the warning threshold of `|z| = 3.0`.
    fn classify(z_abs: f64) -> Option<Severity> {
        if z_abs >= 5.0 {
            Some(Severity::Critical)
        } else if z_abs >= 4.0 {
            Some(Severity::High)
        } else if z_abs >= 3.0 {
            Some(Severity::Warning)
        } else {
            None
        }
    }
}

/// A snapshot of the headline market state at the moment an event fired,
/// persisted alongside the event as context.
#[derive(Debug, Clone)]
pub struct MarketStateAtTrigger {
    pub mid: Decimal,
    pub spread_bps: Decimal,
    pub depth_10bps_usd: Option<Decimal>,
    pub imbalance: Decimal,
}

#[derive(Debug, Clone)]
pub struct AnomalyEvent {
    pub detected_at: DateTime<Utc>,
    pub symbol: String,
    pub severity: Severity,
    /// Names every monitored metric whose `|z| >= 3.0` at this tick, not
    /// just the worst offender.
    pub reason: String,
    pub z_scores: Vec<(&'static str, f64)>,
    pub max_zscore: f64,
    pub market_state: MarketStateAtTrigger,
}

/// Maintains one `RollingWindow` per `(exchange, symbol, metric)` triple --
/// the same symbol quoted on two exchanges never shares a baseline -- and
/// debounces repeated events.
pub struct AnomalyDetector {
    config: EngineConfig,
    windows: HashMap<(String, String, &'static str), RollingWindow>,
    last_emitted: HashMap<(String, String), (DateTime<Utc>, Severity)>,
    counters: AnomalyCounters,
}

impl AnomalyDetector {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            windows: HashMap::new(),
            last_emitted: HashMap::new(),
            counters: AnomalyCounters::default(),
        }
    }

    pub fn counters(&self) -> &AnomalyCounters {
        &self.counters
    }

    fn metric_value(sample: &MetricsSample, metric: &str) -> Option<f64> {
        match metric {
            "spread_bps" => sample.spread_bps.to_f64(),
            "depth_10bps_usd" => sample.depth_usd_at(10).and_then(|d| d.to_f64()),
            "imbalance" => sample.imbalance.to_f64(),
            _ => None,
        }
    }

    /// Feed one `MetricsSample`. Returns `Some(event)` when a threshold is
    /// crossed and the cooldown does not suppress it.
    pub fn on_sample(&mut self, exchange: &str, sample: &MetricsSample, now: DateTime<Utc>) -> Option<AnomalyEvent> {
        let mut z_scores = Vec::new();

        for &metric in self.config.monitored_metrics.clone().iter() {
            let Some(value) = Self::metric_value(sample, metric) else {
                continue;
            };
            if !value.is_finite() {
                AnomalyCounters::bump(&self.counters.inputs_dropped_non_finite);
                continue;
            }

            let key = (exchange.to_string(), sample.symbol.clone(), metric);
            let window = self
                .windows
                .entry(key)
                .or_insert_with(|| RollingWindow::new(self.config.rolling_window_len));
            window.push(value);

            if window.len() < self.config.rolling_min_samples {
                continue;
            }
            let std = window.std_dev();
            if std == 0.0 {
                continue;
            }
            let mean = window.mean();
            let z = (value - mean) / std;
            z_scores.push((metric, z));
        }

        let z_max = z_scores
            .iter()
            .map(|(_, z)| z.abs())
            .fold(0.0_f64, f64::max);

        let severity = Severity::classify(z_max)?;

        let symbol_key = (exchange.to_string(), sample.symbol.clone());
        if let Some((last_at, last_severity)) = self.last_emitted.get(&symbol_key) {
            let elapsed_ms = (now - *last_at).num_milliseconds();
            if elapsed_ms < self.config.anomaly_cooldown_ms as i64 && severity <= *last_severity {
                AnomalyCounters::bump(&self.counters.events_suppressed_by_cooldown);
                return None;
            }
        }

        let offenders: Vec<&str> = z_scores
            .iter()
            .filter(|(_, z)| z.abs() >= 3.0)
            .map(|(name, _)| *name)
            .collect();
        let reason = format!("threshold crossed on: {}", offenders.join(", "));

        self.last_emitted.insert(symbol_key, (now, severity));
        AnomalyCounters::bump(&self.counters.events_emitted);

        Some(AnomalyEvent {
            detected_at: now,
            symbol: sample.symbol.clone(),
            severity,
            reason,
            z_scores,
            max_zscore: z_max,
            market_state: MarketStateAtTrigger {
                mid: sample.mid,
                spread_bps: sample.spread_bps,
                depth_10bps_usd: sample.depth_usd_at(10),
                imbalance: sample.imbalance,
            },
        })
    }
}

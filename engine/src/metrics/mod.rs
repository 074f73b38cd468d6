//! Transforms a `BookView` into a `MetricsSample`.
//!
//! Every computation here stays in `Decimal` until the anomaly detector's
//! boundary; nothing in this module touches `f64`.

pub mod slippage;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::book::BookView;
use crate::config::EngineConfig;
use crate::counters::MetricsCounters;
use crate::decimal::Price;

pub use slippage::{SlippageResult, SlippageSample, SlippageSide};

/// Depth accumulated within one basis-point band, both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthBand {
    pub bps: u32,
    pub bid_base: Decimal,
    pub ask_base: Decimal,
    pub bid_usd: Decimal,
    pub ask_usd: Decimal,
}

#[derive(Debug, Clone)]
pub struct MetricsSample {
    pub captured_at: DateTime<Utc>,
    pub symbol: String,
    pub last_update_id: u64,
    pub mid: Decimal,
    pub spread_abs: Decimal,
    pub spread_bps: Decimal,
    pub depth: Vec<DepthBand>,
    pub imbalance: Decimal,
    pub slippage: Vec<SlippageSample>,
    pub best_bid_qty: Decimal,
    pub best_ask_qty: Decimal,
}

impl MetricsSample {
    /// The three metrics the anomaly detector monitors by default; pulled
    /// out here because both the detector and persistence care about them
    /// by name rather than by struct field.
    pub fn depth_usd_at(&self, bps: u32) -> Option<Decimal> {
        self.depth
            .iter()
            .find(|d| d.bps == bps)
            .map(|d| d.bid_usd + d.ask_usd)
    }
}

/// Computes one `MetricsSample` from a `BookView`. Pure; takes no
/// ownership of anything beyond the view and the config it's handed.
pub fn compute_sample(view: &BookView, config: &EngineConfig) -> Option<MetricsSample> {
    let (best_bid, best_bid_qty) = view.best_bid()?;
    let (best_ask, best_ask_qty) = view.best_ask()?;

    let bid = best_bid.0;
    let ask = best_ask.0;
    let mid = (bid + ask) / dec!(2);
    if mid.is_zero() {
        return None;
    }
    let spread_abs = ask - bid;
    let spread_bps = spread_abs / mid * dec!(10000);

    let depth = config
        .depth_bands_bps
        .iter()
        .map(|&bps| depth_band(view, mid, bps))
        .collect();

    let imbalance = compute_imbalance(view, config.imbalance_levels);

    let slippage = config
        .slippage_notionals
        .iter()
        .flat_map(|&notional| {
            [slippage::SlippageSide::Buy, slippage::SlippageSide::Sell]
                .into_iter()
                .map(move |side| (notional, side))
        })
        .map(|(notional, side)| slippage::estimate(view, mid, notional, side))
        .collect();

    Some(MetricsSample {
        captured_at: view.captured_at,
        symbol: view.symbol.clone(),
        last_update_id: view.last_update_id,
        mid,
        spread_abs,
        spread_bps,
        depth,
        imbalance,
        slippage,
        best_bid_qty: best_bid_qty.0,
        best_ask_qty: best_ask_qty.0,
    })
}

fn depth_band(view: &BookView, mid: Decimal, bps: u32) -> DepthBand {
    let band = Decimal::from(bps) / dec!(10000);
    let lower = mid * (Decimal::ONE - band);
    let upper = mid * (Decimal::ONE + band);

    let mut bid_base = Decimal::ZERO;
    let mut bid_usd = Decimal::ZERO;
    for &(price, qty) in &view.bids {
        if price.0 >= lower {
            bid_base += qty.0;
            bid_usd += price * qty;
        }
    }

    let mut ask_base = Decimal::ZERO;
    let mut ask_usd = Decimal::ZERO;
    for &(price, qty) in &view.asks {
        if price.0 <= upper {
            ask_base += qty.0;
            ask_usd += price * qty;
        }
    }

    DepthBand {
        bps,
        bid_base,
        ask_base,
        bid_usd,
        ask_usd,
    }
}

/// `(bid_vol - ask_vol) / (bid_vol + ask_vol)` over the top `levels` per
/// side; zero when the book is empty on both sides at that depth.
fn compute_imbalance(view: &BookView, levels: usize) -> Decimal {
    let bid_vol: Decimal = view.bids.iter().take(levels).map(|(_, q)| q.0).sum();
    let ask_vol: Decimal = view.asks.iter().take(levels).map(|(_, q)| q.0).sum();
    let denom = bid_vol + ask_vol;
    if denom.is_zero() {
        Decimal::ZERO
    } else {
        (bid_vol - ask_vol) / denom
    }
}

/// Rate-controls publication to at most once per `metric_period_ms` per
/// symbol; intermediate views in between are silently coalesced (the
/// newest view wins).
pub struct MetricsEngine {
    config: EngineConfig,
    last_published: HashMap<String, DateTime<Utc>>,
    counters: MetricsCounters,
}

impl MetricsEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            last_published: HashMap::new(),
            counters: MetricsCounters::default(),
        }
    }

    pub fn counters(&self) -> &MetricsCounters {
        &self.counters
    }

    /// Feed one `BookView`. Returns `Some(sample)` only when the cadence
    /// allows a publish and the view carries a valid two-sided book.
    pub fn on_view(&mut self, view: &BookView, now: DateTime<Utc>) -> Option<MetricsSample> {
        if let Some(last) = self.last_published.get(&view.symbol) {
            if (now - *last).num_milliseconds() < self.config.metric_period_ms as i64 {
                MetricsCounters::bump(&self.counters.samples_skipped);
                return None;
            }
        }

        match compute_sample(view, &self.config) {
            Some(sample) => {
                self.last_published.insert(view.symbol.clone(), now);
                MetricsCounters::bump(&self.counters.samples_published);
                Some(sample)
            }
            None => {
                MetricsCounters::bump(&self.counters.samples_skipped);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Qty;

    fn level(price: &str, qty: &str) -> (Price, Qty) {
        (Price(price.parse().unwrap()), Qty(qty.parse().unwrap()))
    }

    fn view(bids: Vec<(Price, Qty)>, asks: Vec<(Price, Qty)>) -> BookView {
        BookView {
            symbol: "BTC-PERP".to_string(),
            bids,
            asks,
            last_update_id: 1,
            captured_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn spread_and_mid_from_top_of_book() {
        let v = view(vec![level("99.0", "1")], vec![level("101.0", "1")]);
        let sample = compute_sample(&v, &EngineConfig::default()).unwrap();
        assert_eq!(sample.mid, dec!(100.0));
        assert_eq!(sample.spread_abs, dec!(2.0));
        assert_eq!(sample.spread_bps, dec!(200.0));
    }

    #[test]
    fn empty_side_skips_the_sample() {
        let v = view(vec![], vec![level("101.0", "1")]);
        assert!(compute_sample(&v, &EngineConfig::default()).is_none());
    }

    /// Imbalance extremes: an empty side saturates to +-1.
    #[test]
    fn imbalance_is_plus_one_when_ask_side_empty() {
        let v = view(vec![level("100.0", "100")], vec![]);
        assert_eq!(compute_imbalance(&v, 5), Decimal::ONE);
    }

    #[test]
    fn imbalance_is_zero_for_a_symmetric_book() {
        let v = view(vec![level("100.0", "10")], vec![level("101.0", "10")]);
        assert_eq!(compute_imbalance(&v, 5), Decimal::ZERO);
    }

    #[test]
    fn depth_band_sums_both_sides_within_band() {
        let v = view(
            vec![level("100.0", "1"), level("90.0", "1")],
            vec![level("100.2", "2"), level("110.0", "1")],
        );
        let band = depth_band(&v, dec!(100.0), 50);
        // 50 bps of 100 is [99.5, 100.5]; only the near levels qualify.
        assert_eq!(band.bid_base, dec!(1));
        assert_eq!(band.ask_base, dec!(2));
    }

    #[test]
    fn cadence_coalesces_views_within_the_period() {
        let mut engine = MetricsEngine::new(EngineConfig::default());
        let v = view(vec![level("99.0", "1")], vec![level("101.0", "1")]);
        let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert!(engine.on_view(&v, t0).is_some());
        // 100ms later, within the default 1000ms period: coalesced away.
        assert!(engine.on_view(&v, t0 + chrono::Duration::milliseconds(100)).is_none());
        // A full period later: published again.
        assert!(engine.on_view(&v, t0 + chrono::Duration::milliseconds(1000)).is_some());
    }
}

//! Per-stage introspection counters.
//!
//! No global mutable state: each stage owns one of these, updates it with
//! relaxed atomics on its own hot path, and exposes an immutable snapshot
//! for whatever health surface an embedder wires up.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ParserCounters {
    pub malformed_frames: AtomicU64,
}

#[derive(Debug, Default)]
pub struct BookCounters {
    pub stale_deltas_dropped: AtomicU64,
    pub gaps_detected: AtomicU64,
    pub resync_attempts: AtomicU64,
    pub resync_failures: AtomicU64,
    pub views_dropped: AtomicU64,
    pub views_published: AtomicU64,
}

#[derive(Debug, Default)]
pub struct MetricsCounters {
    pub samples_published: AtomicU64,
    pub samples_skipped: AtomicU64,
}

#[derive(Debug, Default)]
pub struct AnomalyCounters {
    pub events_emitted: AtomicU64,
    pub events_suppressed_by_cooldown: AtomicU64,
    pub inputs_dropped_non_finite: AtomicU64,
}

macro_rules! snapshot_impl {
    ($ty:ident { $($field:ident),+ $(,)? }) => {
        impl $ty {
            pub fn bump(counter: &AtomicU64) {
                counter.fetch_add(1, Ordering::Relaxed);
            }

            pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
                vec![$((stringify!($field), self.$field.load(Ordering::Relaxed))),+]
            }
        }
    };
}

snapshot_impl!(ParserCounters { malformed_frames });
snapshot_impl!(BookCounters {
    stale_deltas_dropped,
    gaps_detected,
    resync_attempts,
    resync_failures,
    views_dropped,
    views_published,
});
snapshot_impl!(MetricsCounters {
    samples_published,
    samples_skipped,
});
snapshot_impl!(AnomalyCounters {
    events_emitted,
    events_suppressed_by_cooldown,
    inputs_dropped_non_finite,
});

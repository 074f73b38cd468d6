//! Trait boundaries for the external collaborators this engine never
//! implements itself: the exchange transport, the snapshot REST endpoint,
//! and the two persistence sinks. The core engine depends only on these
//! traits; concrete adapters (WebSocket client, HTTP client, file/DB
//! writers) live in the orchestrator binary so the engine crate stays
//! free of transport and storage concerns.

use async_trait::async_trait;

use crate::anomaly::AnomalyEvent;
use crate::book::Snapshot;
use crate::error::Result;
use crate::metrics::MetricsSample;

/// One raw unit handed up by a `FrameSource`: either a depth update still
/// in wire form, or a transport-level sentinel the BookEngine must react to.
#[derive(Debug, Clone)]
pub enum Frame {
    Depth(serde_json::Value),
    /// The transport reconnected; the BookEngine must re-enter `Syncing`.
    StreamReset,
}

/// The exchange WebSocket transport, reduced to its essential shape.
/// Reconnection with exponential backoff is the adapter's responsibility;
/// the only contract the engine relies on is that a reconnect is always
/// preceded or followed by a `Frame::StreamReset`.
#[async_trait]
pub trait FrameSource: Send {
    async fn connect(&mut self, symbols: &[String]) -> Result<()>;
    async fn next_frame(&mut self) -> Result<Option<Frame>>;
    async fn close(&mut self);
}

/// On-demand full book snapshot, tagged with the sequence cursor at
/// capture time. Must tolerate concurrent calls across symbols; each
/// symbol's BookEngine enforces its own single-flight rate limit.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    async fn fetch(&self, symbol: &str, depth_limit: usize) -> Result<Snapshot>;
}

/// Idempotent persistence for `MetricsSample` rows (`liquidity_snapshots`).
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn write(&self, sample: &MetricsSample) -> Result<()>;
}

/// Idempotent persistence for `AnomalyEvent` rows (`anomaly_events`).
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn write(&self, event: &AnomalyEvent) -> Result<()>;
}

//! Wires one pipeline per symbol: `FrameSource -> Parser -> BookEngine ->
//! MetricsEngine -> { SnapshotSink, AnomalyDetector -> EventSink }`, each
//! stage its own task connected by the bounded links in the overflow
//! matrix below. Share-nothing at the `Book` level: every symbol gets its
//! own `FrameSource`, `Book`, `MetricsEngine`, and `AnomalyDetector`
//! instance, each driven out of its own `tokio::select!` loop, with N
//! independent loops spawned side by side.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use liquidity_engine::book::engine::{decode_state, BookEngineTask};
use liquidity_engine::book::BookState;
use liquidity_engine::config::EngineConfig;
use liquidity_engine::metrics::MetricsSample;
use liquidity_engine::ports::{EventSink, Frame, FrameSource, SnapshotFetcher, SnapshotSink};
use liquidity_engine::queue::DropOldestQueue;
use liquidity_engine::{AnomalyDetector, AnomalyEvent, MetricsEngine};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Capacity of the FrameSource -> Parser link: drop oldest.
const FRAME_LINK_CAPACITY: usize = 1024;
/// Capacity of the Parser -> BookEngine link: block briefly, then
/// drop oldest (enforced inside `BookEngineTask::feed`).
const PARSED_LINK_CAPACITY: usize = 1024;
/// Capacity of the MetricsEngine -> AnomalyDetector link: block.
const METRICS_TO_ANOMALY_CAPACITY: usize = 64;
/// Capacity of the MetricsEngine -> SnapshotSink link: block.
const METRICS_TO_SINK_CAPACITY: usize = 256;
/// Capacity of the AnomalyDetector -> EventSink link: block.
const EVENT_SINK_CAPACITY: usize = 64;
/// How long a stage keeps draining its input after shutdown is signalled
/// before giving up and closing its output ("drain up to a deadline").
const DRAIN_DEADLINE: Duration = Duration::from_secs(2);

/// Handle a caller can poll to ask "is this symbol's book healthy", used
/// by the top-level supervisor to decide whether every monitored symbol
/// has gone `Stale` ("persistent external failure" exit path).
#[derive(Clone)]
pub struct SymbolHealth(Arc<std::sync::atomic::AtomicU8>);

impl SymbolHealth {
    pub fn state(&self) -> BookState {
        decode_state(self.0.load(Ordering::Relaxed))
    }
}

/// Spawn every task for one symbol and return a handle the supervisor can
/// poll for book health. `source` is already pointed at this symbol alone
/// (one `FrameSource` per symbol, share-nothing at the book level);
/// `fetcher`/`snapshot_sink`/`event_sink` are shared across symbols,
/// backed by a connection pool behind the sinks.
pub fn spawn_symbol_pipeline<Src, Fetch, Snap, Evt>(
    exchange: String,
    symbol: String,
    config: EngineConfig,
    mut source: Src,
    fetcher: Arc<Fetch>,
    snapshot_sink: Arc<Snap>,
    event_sink: Arc<Evt>,
    shutdown: CancellationToken,
) -> SymbolHealth
where
    Src: FrameSource + 'static,
    Fetch: SnapshotFetcher + 'static,
    Snap: SnapshotSink + 'static,
    Evt: EventSink + 'static,
{
    let frame_queue = Arc::new(DropOldestQueue::<Frame>::new(FRAME_LINK_CAPACITY));
    let parsed_queue = Arc::new(DropOldestQueue::new(PARSED_LINK_CAPACITY));
    let view_queue = Arc::new(DropOldestQueue::new(
        liquidity_engine::book::engine::VIEW_LINK_CAPACITY,
    ));

    let book_task = BookEngineTask::new(
        exchange.clone(),
        symbol.clone(),
        config.clone(),
        fetcher,
        parsed_queue.clone(),
        view_queue.clone(),
        shutdown.clone(),
    );
    let health = SymbolHealth(book_task.health());

    // FrameSource reader: owns the transport connection for this symbol.
    {
        let symbol = symbol.clone();
        let frame_queue = frame_queue.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = source.connect(std::slice::from_ref(&symbol)).await {
                warn!(%symbol, error = %e, "frame source failed to connect");
                return;
            }
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        source.close().await;
                        break;
                    }
                    frame = source.next_frame() => {
                        match frame {
                            Ok(Some(frame)) => frame_queue.push(frame),
                            Ok(None) => {
                                info!(%symbol, "frame source ended");
                                break;
                            }
                            Err(e) => {
                                warn!(%symbol, error = %e, "frame source error");
                            }
                        }
                    }
                }
            }
        });
    }

    // Parser: JSON -> Delta, feeding the BookEngine's own queue.
    {
        let frame_queue = frame_queue.clone();
        let parsed_queue = parsed_queue.clone();
        let shutdown = shutdown.clone();
        let parser = liquidity_engine::Parser::new();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = shutdown.cancelled() => {
                        match drain_deadline(&frame_queue).await {
                            Some(frame) => frame,
                            None => break,
                        }
                    }
                    frame = frame_queue.pop() => frame,
                };
                if let Some(parsed) = parser.parse(frame) {
                    BookEngineTask::<Fetch>::feed(&parsed_queue, parsed).await;
                }
            }
        });
    }

    // BookEngine: the stateful per-symbol reconstruction loop.
    tokio::spawn(book_task.run());

    // MetricsEngine: rate-controlled BookView -> MetricsSample, fanning
    // out to the snapshot sink and the anomaly detector.
    let (to_anomaly_tx, to_anomaly_rx) = mpsc::channel::<MetricsSample>(METRICS_TO_ANOMALY_CAPACITY);
    let (to_sink_tx, to_sink_rx) = mpsc::channel::<MetricsSample>(METRICS_TO_SINK_CAPACITY);
    {
        let view_queue = view_queue.clone();
        let shutdown = shutdown.clone();
        let mut metrics_engine = MetricsEngine::new(config.clone());
        tokio::spawn(async move {
            loop {
                let view = tokio::select! {
                    _ = shutdown.cancelled() => {
                        match drain_deadline(&view_queue).await {
                            Some(view) => view,
                            None => break,
                        }
                    }
                    view = view_queue.pop() => view,
                };
                if let Some(sample) = metrics_engine.on_view(&view, Utc::now()) {
                    if to_sink_tx.send(sample.clone()).await.is_err() {
                        break;
                    }
                    if to_anomaly_tx.send(sample).await.is_err() {
                        break;
                    }
                }
            }
        });
    }

    // AnomalyDetector: MetricsSample -> classified AnomalyEvent.
    let (event_tx, event_rx) = mpsc::channel::<AnomalyEvent>(EVENT_SINK_CAPACITY);
    {
        let exchange = exchange.clone();
        let mut to_anomaly_rx = to_anomaly_rx;
        let mut detector = AnomalyDetector::new(config);
        tokio::spawn(async move {
            while let Some(sample) = to_anomaly_rx.recv().await {
                if let Some(event) = detector.on_sample(&exchange, &sample, Utc::now()) {
                    if event_tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
        });
    }

    // SnapshotSink writer.
    {
        let mut to_sink_rx = to_sink_rx;
        tokio::spawn(async move {
            while let Some(sample) = to_sink_rx.recv().await {
                if let Err(e) = snapshot_sink.write(&sample).await {
                    warn!(error = %e, "snapshot sink write failed");
                }
            }
        });
    }

    // EventSink writer.
    {
        let mut event_rx = event_rx;
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                if let Err(e) = event_sink.write(&event).await {
                    warn!(error = %e, "event sink write failed");
                }
            }
        });
    }

    health
}

/// Give a drop-oldest queue a bounded grace period to finish draining
/// after shutdown, rather than discarding whatever is still queued the
/// instant the cancellation token fires.
async fn drain_deadline<T>(queue: &DropOldestQueue<T>) -> Option<T> {
    tokio::time::timeout(DRAIN_DEADLINE, queue.pop()).await.ok()
}

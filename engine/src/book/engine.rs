//! The async task that drives a `Book` for one symbol: drains parsed
//! frames, calls out to a `SnapshotFetcher` while `Syncing`, and publishes
//! `BookView`s downstream. `Book` itself stays synchronous -- apply-delta
//! never suspends -- so this module is the only place in the crate that
//! awaits anything on the book's behalf.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::book::{Book, BookState, BookView, DeltaOutcome, SnapshotOutcome};
use crate::config::EngineConfig;
use crate::counters::BookCounters;
use crate::parser::ParsedFrame;
use crate::ports::SnapshotFetcher;
use crate::queue::DropOldestQueue;

/// Grace period the Parser -> BookEngine link gives a full queue before
/// falling back to drop-oldest.
const PARSER_LINK_GRACE: Duration = Duration::from_millis(50);
/// Deadline for an in-flight snapshot fetch request.
const SNAPSHOT_FETCH_DEADLINE: Duration = Duration::from_secs(10);
/// Capacity of the BookEngine -> MetricsEngine link.
pub const VIEW_LINK_CAPACITY: usize = 16;

fn encode_state(state: BookState) -> u8 {
    match state {
        BookState::Uninitialized => 0,
        BookState::Syncing => 1,
        BookState::Live => 2,
        BookState::Stale => 3,
    }
}

/// Decode a value previously produced by [`encode_state`]. Exposed so a
/// supervisor polling [`BookEngineTask::health`] doesn't need to depend on
/// the private encoding, only on this free function and `BookState`.
pub fn decode_state(value: u8) -> BookState {
    match value {
        0 => BookState::Uninitialized,
        1 => BookState::Syncing,
        2 => BookState::Live,
        _ => BookState::Stale,
    }
}

pub struct BookEngineTask<F: SnapshotFetcher> {
    book: Book,
    config: EngineConfig,
    fetcher: Arc<F>,
    counters: Arc<BookCounters>,
    input: Arc<DropOldestQueue<ParsedFrame>>,
    views: Arc<DropOldestQueue<BookView>>,
    shutdown: CancellationToken,
    /// Current `BookState`, encoded via [`encode_state`]. A supervisor can
    /// poll this (see [`BookEngineTask::health`]) without synchronizing
    /// with the task itself -- the only cross-task visibility the book
    /// state needs beyond the monotone counters and the queues themselves.
    health: Arc<AtomicU8>,
    /// `true` while a snapshot fetch spawned by [`Self::request_snapshot`]
    /// has not yet resolved. Enforces the `SnapshotFetcher` contract's "no
    /// more than one in-flight request" per symbol -- without this, a
    /// flapping `FrameSource` emitting back-to-back `StreamReset`s would
    /// spawn overlapping fetches, and a late result from an earlier one
    /// could be misapplied to a book that already resynced by other means.
    snapshot_in_flight: bool,
}

impl<F: SnapshotFetcher + 'static> BookEngineTask<F> {
    pub fn new(
        exchange: impl Into<String>,
        symbol: impl Into<String>,
        config: EngineConfig,
        fetcher: Arc<F>,
        input: Arc<DropOldestQueue<ParsedFrame>>,
        views: Arc<DropOldestQueue<BookView>>,
        shutdown: CancellationToken,
    ) -> Self {
        let symbol = symbol.into();
        Self {
            book: Book::new(exchange, symbol),
            config,
            fetcher,
            counters: Arc::new(BookCounters::default()),
            input,
            views,
            shutdown,
            health: Arc::new(AtomicU8::new(encode_state(BookState::Uninitialized))),
            snapshot_in_flight: false,
        }
    }

    pub fn counters(&self) -> Arc<BookCounters> {
        self.counters.clone()
    }

    /// A handle a supervisor can poll (via [`decode_state`]) to observe
    /// this symbol's book lifecycle state from outside the task, without
    /// sharing the `Book` itself.
    pub fn health(&self) -> Arc<AtomicU8> {
        self.health.clone()
    }

    fn sync_health(&self) {
        self.health.store(encode_state(self.book.state()), Ordering::Relaxed);
    }

    /// Push this parser-stage frame onto the input link with the
    /// Parser -> BookEngine overflow policy (block briefly, then drop
    /// oldest).
    pub async fn feed(input: &DropOldestQueue<ParsedFrame>, frame: ParsedFrame) {
        input.push_with_grace(frame, PARSER_LINK_GRACE).await;
    }

    pub async fn run(mut self) {
        self.book.start_syncing();
        self.sync_health();
        let (snapshot_tx, mut snapshot_rx) = mpsc::channel(1);
        self.request_snapshot(&snapshot_tx);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!(symbol = %self.book.symbol, "book engine shutting down");
                    break;
                }
                frame = self.input.pop() => {
                    self.handle_frame(frame, &snapshot_tx).await;
                    self.sync_health();
                }
                result = snapshot_rx.recv() => {
                    if let Some(result) = result {
                        self.handle_snapshot_result(result, &snapshot_tx);
                        self.sync_health();
                    }
                }
            }
        }
    }

    async fn handle_frame(&mut self, frame: ParsedFrame, snapshot_tx: &mpsc::Sender<crate::error::Result<crate::book::Snapshot>>) {
        match frame {
            ParsedFrame::StreamReset => {
                debug!(symbol = %self.book.symbol, "stream reset, resyncing");
                self.book.start_syncing();
                self.request_snapshot(snapshot_tx);
            }
            ParsedFrame::Delta(delta) => {
                if let Err(e) = Book::validate_delta(&delta) {
                    warn!(symbol = %self.book.symbol, error = %e, "malformed delta reached book engine");
                    return;
                }
                match self.book.state() {
                    crate::book::BookState::Syncing => {
                        self.book.buffer_delta(delta);
                    }
                    crate::book::BookState::Live => {
                        match self.book.apply_delta_live(delta) {
                            DeltaOutcome::Applied => self.publish_view().await,
                            DeltaOutcome::DroppedStale => {
                                BookCounters::bump(&self.counters.stale_deltas_dropped);
                            }
                            DeltaOutcome::GapDetected => {
                                BookCounters::bump(&self.counters.gaps_detected);
                                self.request_snapshot(snapshot_tx);
                            }
                        }
                    }
                    crate::book::BookState::Uninitialized | crate::book::BookState::Stale => {
                        // No views while Stale/Uninitialized; the delta is
                        // simply not applicable yet.
                    }
                }
            }
        }
    }

    /// Spawn a snapshot fetch, unless one is already in flight for this
    /// symbol -- the `SnapshotFetcher` contract allows no more than one
    /// concurrent request per symbol.
    fn request_snapshot(&mut self, snapshot_tx: &mpsc::Sender<crate::error::Result<crate::book::Snapshot>>) {
        if self.snapshot_in_flight {
            return;
        }
        self.snapshot_in_flight = true;

        let fetcher = self.fetcher.clone();
        let symbol = self.book.symbol.clone();
        let depth = self.config.book_view_depth;
        let tx = snapshot_tx.clone();
        tokio::spawn(async move {
            let result = tokio::time::timeout(SNAPSHOT_FETCH_DEADLINE, fetcher.fetch(&symbol, depth))
                .await
                .unwrap_or_else(|_| {
                    Err(crate::error::EngineError::SnapshotUnreachable {
                        symbol: symbol.clone(),
                        attempts: 1,
                    })
                });
            let _ = tx.send(result).await;
        });
    }

    fn handle_snapshot_result(
        &mut self,
        result: crate::error::Result<crate::book::Snapshot>,
        snapshot_tx: &mpsc::Sender<crate::error::Result<crate::book::Snapshot>>,
    ) {
        self.snapshot_in_flight = false;

        if self.book.state() != BookState::Syncing {
            // The book already resynced (or went Stale) through a
            // different in-flight request while this one was pending; a
            // late result here is stale and must not be fed into
            // `apply_snapshot` against a book that isn't `Syncing`.
            debug!(symbol = %self.book.symbol, "dropping stale snapshot result, book not syncing");
            return;
        }

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(symbol = %self.book.symbol, error = %e, "snapshot fetch failed");
                BookCounters::bump(&self.counters.resync_failures);
                self.request_snapshot(snapshot_tx);
                return;
            }
        };

        BookCounters::bump(&self.counters.resync_attempts);
        let now = Utc::now();
        match self
            .book
            .apply_snapshot(snapshot, self.config.max_resync_attempts, self.config.resync_failure_window_ms as i64, now)
        {
            SnapshotOutcome::Live => {
                info!(symbol = %self.book.symbol, last_update_id = self.book.last_update_id(), "book live");
            }
            SnapshotOutcome::NoBridgeYet => {
                self.request_snapshot(snapshot_tx);
            }
            SnapshotOutcome::Stale => {
                warn!(symbol = %self.book.symbol, "persistent gap, book stale");
                BookCounters::bump(&self.counters.resync_failures);
            }
        }
    }

    async fn publish_view(&self) {
        let Some(view) = self.book.view(self.config.book_view_depth, Utc::now()) else {
            return;
        };
        let was_full = self.views.len() >= VIEW_LINK_CAPACITY;
        self.views.push(view);
        if was_full {
            BookCounters::bump(&self.counters.views_dropped);
        } else {
            BookCounters::bump(&self.counters.views_published);
        }
    }
}

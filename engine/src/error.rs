use thiserror::Error;

/// Errors surfaced by the core engine. These never unwind across stage
/// boundaries: each stage matches on its own errors, increments a
/// counter, and continues. Only configuration errors are fatal, and only
/// at startup.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("book for {symbol} is stale and requires an external restart")]
    BookStale { symbol: String },

    #[error("snapshot unreachable for {symbol} after {attempts} attempts")]
    SnapshotUnreachable { symbol: String, attempts: u32 },

    #[error("no bridge delta found to connect snapshot at {snapshot_last_id} to buffered deltas")]
    NoBridgeDelta { snapshot_last_id: u64 },

    #[error("arithmetic overflow computing {0}")]
    Overflow(&'static str),

    #[error("configuration error: {0}")]
    Configuration(String),

    /// A terminal transport failure the `FrameSource` adapter could not
    /// recover from internally (its own reconnect/backoff is exhausted).
    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

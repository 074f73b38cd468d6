//! Order-book reconstruction, liquidity metrics, and anomaly detection.
//!
//! This crate is the pure, deterministic core: no network I/O, no file
//! I/O, no process lifecycle. Those live in the orchestrator binary,
//! which depends on this crate and supplies concrete implementations of
//! the `ports` traits.

pub mod anomaly;
pub mod book;
pub mod config;
pub mod counters;
pub mod decimal;
pub mod error;
pub mod metrics;
pub mod parser;
pub mod ports;
pub mod queue;

pub use anomaly::{AnomalyDetector, AnomalyEvent, Severity};
pub use book::{Book, BookState, BookView, Delta, Snapshot};
pub use config::EngineConfig;
pub use decimal::{Price, Qty};
pub use error::{EngineError, Result};
pub use metrics::{MetricsEngine, MetricsSample};
pub use parser::{ParsedFrame, Parser};
pub use ports::{EventSink, Frame, FrameSource, SnapshotFetcher, SnapshotSink};

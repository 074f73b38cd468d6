use thiserror::Error;

/// Orchestrator-level errors. Fatal at startup only; bridged into
/// `EngineError::Transport` for code paths that surface failures through
/// the engine's own error type at the `ports` boundary.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<MonitorError> for liquidity_engine::EngineError {
    fn from(e: MonitorError) -> Self {
        liquidity_engine::EngineError::Transport(e.to_string())
    }
}

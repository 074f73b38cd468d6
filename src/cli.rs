use std::path::PathBuf;

use clap::Parser;

/// liquidity-monitor — real-time order-book reconstruction and anomaly
/// detection for crypto derivative venues.
#[derive(Parser, Debug)]
#[command(name = "liquidity-monitor", version)]
pub struct Args {
    /// Symbol to monitor (repeatable, e.g. --symbol BTC-PERP --symbol ETH-PERP)
    #[arg(long = "symbol", required = true)]
    pub symbols: Vec<String>,

    /// Path to an optional TOML config file overriding defaults
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

//! Command Line Interface module
//!
//! Implements the CLI commands and argument parsing for scripwatch.

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "scripwatch")]
#[command(about = "Live quote and candle chart monitor")]
#[command(long_about = "Watch NSE/BSE instruments: live-feed quotes, auto-refreshing candle charts and market hours")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(long, default_value = "config.toml")]
    pub config_file: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Instrument selection shared by the data commands
#[derive(Args, Debug, Clone)]
pub struct InstrumentArgs {
    /// Numeric scrip code
    #[arg(required_unless_present = "symbol")]
    pub scrip: Option<u32>,

    /// Resolve the scrip code from a trading symbol instead
    #[arg(long, conflicts_with = "scrip")]
    pub symbol: Option<String>,

    /// Exchange (N or B); defaults to the configured exchange
    #[arg(short, long)]
    pub exchange: Option<String>,

    /// Segment (C for cash, D for derivatives)
    #[arg(short, long, default_value = "C")]
    pub segment: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Interactive view: live price line plus auto-refreshing chart
    Watch {
        #[command(flatten)]
        instrument: InstrumentArgs,

        /// Chart interval (1m, 5m, 15m, 30m, 1h, 1d)
        #[arg(short, long)]
        interval: Option<String>,
    },

    /// Fetch a single quote
    Snapshot {
        #[command(flatten)]
        instrument: InstrumentArgs,
    },

    /// Fetch a candle series
    Candles {
        #[command(flatten)]
        instrument: InstrumentArgs,

        /// Candle interval (1m, 5m, 15m, 30m, 1h, 1d)
        #[arg(short, long)]
        interval: Option<String>,

        /// Range start (YYYY-MM-DD)
        #[arg(long, requires = "to")]
        from: Option<String>,

        /// Range end (YYYY-MM-DD); alone, the interval's default lookback ends here
        #[arg(long)]
        to: Option<String>,

        /// Request the interval's default lookback ending today
        #[arg(long, conflicts_with_all = ["from", "to"])]
        lookback: bool,
    },

    /// Look up scrip codes for a trading symbol
    Search {
        symbol: String,

        /// Exchange (N or B)
        #[arg(short, long)]
        exchange: Option<String>,
    },

    /// Show whether the exchange is open now
    MarketStatus,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Reset configuration to defaults
    Reset,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Adjust log level based on verbose flag, falling back to the configured level
    pub fn effective_log_level(&self, configured: &str) -> String {
        if self.verbose {
            "debug".to_string()
        } else {
            self.log_level
                .clone()
                .unwrap_or_else(|| configured.to_string())
        }
    }
}

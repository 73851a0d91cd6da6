//! CLI argument definitions.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `price` | Latest price for a pair |
//! | `ohlcv` | Latest candle for a pair |
//! | `level1` | Top of book for a pair |
//! | `history` | Historical prices, candles or books over a window |
//! | `backfill` | Read a historical window and write it to a sink |
//! | `sources` | Declared capabilities and configuration of every source |
//!
//! # Examples
//!
//! ```bash
//! marketdsl price BTC/USD
//! marketdsl ohlcv ETH/USDT --source ccxt --exchange binance --pretty
//! marketdsl history ohlcv EUR/USD --asset-class forex --start 2024-01-01T00:00:00Z \
//!     --end 2024-02-01T00:00:00Z --timeframe 1d
//! marketdsl backfill BTC/USDT --start 2024-01-01T00:00:00Z --end 2024-01-02T00:00:00Z \
//!     --timeframe 1h --sink timeseries
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};

use marketdsl_core::{SinkId, SourceId, DEFAULT_TIMEOUT_MS};

#[derive(Debug, Parser)]
#[command(
    name = "marketdsl",
    author,
    version,
    about = "Typed multi-source market data reader and writer",
    long_about = "Reads prices, candles and order book tops from CoinGecko, TwelveData, \
CCXT (through an MCP server) and Alpha Vantage, and writes series to a time-series \
database or a message stream.\n\
\n\
Credentials and endpoints come from the environment:\n\
  MARKETDSL_COINGECKO_API_KEY, MARKETDSL_TWELVEDATA_API_KEY,\n\
  MARKETDSL_ALPHAVANTAGE_API_KEY, MARKETDSL_CCXT_MCP_URL,\n\
  MARKETDSL_DATABASE_URL, MARKETDSL_STREAM_URL, MARKETDSL_STREAM_API_KEY"
)]
pub struct Cli {
    /// Source selection; `auto` falls back across every configured source.
    #[arg(long, global = true, value_enum, default_value_t = SourceSelector::Auto)]
    pub source: SourceSelector,

    /// Venue id the pair trades on.
    #[arg(long, global = true, default_value = "coinbase")]
    pub exchange: String,

    /// crypto, equity, forex or commodity.
    #[arg(long, global = true, default_value = "crypto")]
    pub asset_class: String,

    /// Address the perpetual/derivative market instead of spot.
    #[arg(long, global = true, default_value_t = false)]
    pub derivative: bool,

    /// Upper bound for every transport call.
    #[arg(long, global = true, default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Extra attempts for rate-limited or network failures, per source.
    #[arg(long, global = true, default_value_t = 0)]
    pub retries: u32,

    /// Per-call debug logging on stderr.
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,

    /// Pretty-print JSON output.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Treat warnings and errors as failures (exit code 5).
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceSelector {
    Auto,
    Coingecko,
    Twelvedata,
    Ccxt,
    Alphavantage,
}

impl SourceSelector {
    pub const fn source_id(self) -> Option<SourceId> {
        match self {
            Self::Auto => None,
            Self::Coingecko => Some(SourceId::CoinGecko),
            Self::Twelvedata => Some(SourceId::TwelveData),
            Self::Ccxt => Some(SourceId::Ccxt),
            Self::Alphavantage => Some(SourceId::AlphaVantage),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Latest price snapshot.
    Price(PairArgs),

    /// Latest candle.
    Ohlcv(PairArgs),

    /// Best bid and ask.
    Level1(PairArgs),

    /// Historical series over `[start, end)`, ascending.
    History(HistoryArgs),

    /// Read a historical window and publish it to a sink.
    Backfill(BackfillArgs),

    /// List sources with their declared operations and configuration state.
    Sources,
}

#[derive(Debug, Args)]
pub struct PairArgs {
    /// BASE/QUOTE, e.g. BTC/USD.
    pub pair: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SeriesKind {
    Prices,
    Ohlcv,
    Level1,
}

#[derive(Debug, Args)]
pub struct WindowArgs {
    /// Inclusive RFC3339 UTC start.
    #[arg(long)]
    pub start: String,

    /// Exclusive RFC3339 UTC end.
    #[arg(long)]
    pub end: String,

    /// Candle width for OHLCV series: 1m, 5m, 15m, 1h, 4h, 1d.
    #[arg(long, default_value = "1d")]
    pub timeframe: String,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    #[arg(value_enum)]
    pub series: SeriesKind,

    pub pair: String,

    #[command(flatten)]
    pub window: WindowArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SinkSelector {
    Timeseries,
    Stream,
}

impl SinkSelector {
    pub const fn sink_id(self) -> SinkId {
        match self {
            Self::Timeseries => SinkId::TimeSeries,
            Self::Stream => SinkId::Stream,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackfillSeries {
    Prices,
    Ohlcv,
}

#[derive(Debug, Args)]
pub struct BackfillArgs {
    pub pair: String,

    #[command(flatten)]
    pub window: WindowArgs,

    #[arg(long, value_enum)]
    pub sink: SinkSelector,

    #[arg(long, value_enum, default_value_t = BackfillSeries::Ohlcv)]
    pub series: BackfillSeries,
}

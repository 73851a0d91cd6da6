//! Actor configuration resolved from flags and the environment.
//!
//! | Variable | Used by |
//! |----------|---------|
//! | `MARKETDSL_COINGECKO_API_KEY` | CoinGecko (optional) |
//! | `MARKETDSL_COINGECKO_BASE_URL` | CoinGecko root override, e.g. the pro API |
//! | `MARKETDSL_TWELVEDATA_API_KEY` | TwelveData (required) |
//! | `MARKETDSL_ALPHAVANTAGE_API_KEY` | Alpha Vantage (required) |
//! | `MARKETDSL_CCXT_MCP_URL` | CCXT MCP endpoint (required) |
//! | `MARKETDSL_DATABASE_URL` | time-series store, default `marketdsl.duckdb` |
//! | `MARKETDSL_STREAM_URL` | stream REST proxy (required for `--sink stream`) |
//! | `MARKETDSL_STREAM_API_KEY` | stream bearer token (optional) |

use std::env;

use marketdsl_core::{ActorConfig, SinkId, SourceId};

pub const DEFAULT_DATABASE_URL: &str = "marketdsl.duckdb";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub coingecko_api_key: Option<String>,
    pub coingecko_base_url: Option<String>,
    pub twelvedata_api_key: Option<String>,
    pub alphavantage_api_key: Option<String>,
    pub ccxt_mcp_url: Option<String>,
    pub database_url: Option<String>,
    pub stream_url: Option<String>,
    pub stream_api_key: Option<String>,
    pub timeout_ms: u64,
    pub debug: bool,
}

impl Settings {
    pub fn from_env(timeout_ms: u64, debug: bool) -> Self {
        Self::from_lookup(|name| env::var(name).ok(), timeout_ms, debug)
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        timeout_ms: u64,
        debug: bool,
    ) -> Self {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        Self {
            coingecko_api_key: read("MARKETDSL_COINGECKO_API_KEY"),
            coingecko_base_url: read("MARKETDSL_COINGECKO_BASE_URL"),
            twelvedata_api_key: read("MARKETDSL_TWELVEDATA_API_KEY"),
            alphavantage_api_key: read("MARKETDSL_ALPHAVANTAGE_API_KEY"),
            ccxt_mcp_url: read("MARKETDSL_CCXT_MCP_URL"),
            database_url: read("MARKETDSL_DATABASE_URL"),
            stream_url: read("MARKETDSL_STREAM_URL"),
            stream_api_key: read("MARKETDSL_STREAM_API_KEY"),
            timeout_ms,
            debug,
        }
    }

    fn base(&self, name: &str) -> ActorConfig {
        ActorConfig::new(name)
            .with_timeout_ms(self.timeout_ms)
            .with_debug(self.debug)
    }

    pub fn source_config(&self, source: SourceId) -> ActorConfig {
        let mut config = self.base(source.as_str());
        match source {
            SourceId::CoinGecko => {
                config.api_key = self.coingecko_api_key.clone();
                config.base_url = self.coingecko_base_url.clone();
            }
            SourceId::TwelveData => config.api_key = self.twelvedata_api_key.clone(),
            SourceId::AlphaVantage => config.api_key = self.alphavantage_api_key.clone(),
            SourceId::Ccxt => config.connection_string = self.ccxt_mcp_url.clone(),
        }
        config
    }

    pub fn sink_config(&self, sink: SinkId) -> ActorConfig {
        let mut config = self.base(sink.as_str());
        match sink {
            SinkId::TimeSeries => {
                config.connection_string = Some(
                    self.database_url
                        .clone()
                        .unwrap_or_else(|| String::from(DEFAULT_DATABASE_URL)),
                );
            }
            SinkId::Stream => {
                config.connection_string = self.stream_url.clone();
                config.api_key = self.stream_api_key.clone();
            }
        }
        config
    }

    /// Whether `source` has everything its constructor requires.
    pub fn is_configured(&self, source: SourceId) -> bool {
        match source {
            SourceId::CoinGecko => true,
            SourceId::TwelveData => self.twelvedata_api_key.is_some(),
            SourceId::AlphaVantage => self.alphavantage_api_key.is_some(),
            SourceId::Ccxt => self.ccxt_mcp_url.is_some(),
        }
    }
}

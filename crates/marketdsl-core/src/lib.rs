//! # marketdsl core
//!
//! Typed market-data readers and writers behind one contract.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`domain`] | Immutable value types (symbols, exchanges, prices, candles, books) |
//! | [`result`] | `DslResult` and the runtime error taxonomy |
//! | [`contract`] | `Actor`, `MarketDataReader` and `MarketDataWriter` traits |
//! | [`lifecycle`] | Initialize/cleanup state machine and bounded transport calls |
//! | [`sources`] | CoinGecko, TwelveData, CCXT and Alpha Vantage readers |
//! | [`targets`] | Time-series database and stream writers |
//! | [`routing`] | Ordered fallback across readers |
//! | [`retry`] | Caller-side retry of retryable failures |
//! | [`envelope`] | Machine-readable output wrapper |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use marketdsl_core::{
//!     Actor, ActorConfig, AssetClass, Exchange, InstrumentType, MarketContext, MarketDataReader,
//!     MarketSymbol, VenueType,
//! };
//! use marketdsl_core::http_client::ReqwestHttpClient;
//! use marketdsl_core::sources::CoinGeckoSource;
//!
//! let source = CoinGeckoSource::new(ActorConfig::new("coingecko"), Arc::new(ReqwestHttpClient::new()))?;
//! source.initialize().await?;
//!
//! let context = MarketContext::new(
//!     Exchange::new("coinbase", "Coinbase", "US", VenueType::Centralized)?,
//!     MarketSymbol::new("BTC", "Bitcoin", AssetClass::Crypto, "USD", InstrumentType::Cash)?,
//! );
//! let price = source.read_price(&context).await?;
//! println!("{} {}", context, price.price());
//!
//! source.cleanup().await;
//! ```

pub mod config;
pub mod contract;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod http_client;
pub mod lifecycle;
pub mod mcp;
pub mod result;
pub mod retry;
pub mod routing;
pub mod source;
pub mod sources;
pub mod symbol_map;
pub mod targets;

pub use config::{ActorConfig, DEFAULT_TIMEOUT_MS};
pub use contract::{
    Actor, ActorFuture, BoxFuture, ItemOutcome, MarketDataReader, MarketDataWriter,
    PublishResult, ReadCapabilities, ReadOperation,
};
pub use domain::{
    validate_currency_code, AssetClass, BookLevel, Exchange, InstrumentType, Level1,
    MarketContext, MarketSymbol, Ohlcv, Price, TimeInterval, Timeframe, UtcDateTime, VenueType,
};
pub use envelope::{Envelope, EnvelopeError, EnvelopeMeta, SCHEMA_VERSION};
pub use error::ValidationError;
pub use lifecycle::{ActorBase, ActorState, Lifecycle};
pub use result::{DslError, DslErrorKind, DslResult};
pub use retry::{Backoff, RetryPolicy};
pub use routing::{ReaderRouter, RouteFailure, RouteResult, RouteSuccess, SourceStrategy};
pub use source::{SinkId, SourceId};

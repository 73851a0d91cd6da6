//! # Domain Models
//!
//! Immutable market-data value types. Every type is built through a validating
//! factory and exposes read-only accessors; deserialization runs the same
//! validation, so an invalid instance cannot exist.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`MarketSymbol`] | Ticker, name, asset class, quote currency, instrument type |
//! | [`Exchange`] | Venue identity and type |
//! | [`MarketContext`] | Exchange + symbol addressed by every call |
//! | [`TimeInterval`] | Half-open historical window, `start < end` |
//! | [`Price`] | Price snapshot with optional size |
//! | [`Ohlcv`] | Candle with `low <= open, close <= high` |
//! | [`Level1`] | Top of book with `bid <= ask` |
//! | [`Timeframe`] | Candle width (1m .. 1d) |
//! | [`UtcDateTime`] | UTC timestamp |

mod exchange;
mod models;
mod range;
mod symbol;
mod timeframe;
mod timestamp;

pub use exchange::{Exchange, MarketContext, VenueType};
pub use models::{BookLevel, Level1, Ohlcv, Price};
pub use range::TimeInterval;
pub use symbol::{validate_currency_code, AssetClass, InstrumentType, MarketSymbol};
pub use timeframe::Timeframe;
pub use timestamp::UtcDateTime;

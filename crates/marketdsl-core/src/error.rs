use thiserror::Error;

/// Construction-time validation errors exposed by `marketdsl-core`.
///
/// These represent integration bugs (bad arguments, bad configuration) and are
/// raised by value-type factories and actor constructors. Runtime conditions are
/// reported through [`crate::DslError`] instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter or digit: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },
    #[error("pair must look like BASE/QUOTE: '{value}'")]
    InvalidPair { value: String },

    #[error("field '{field}' cannot be empty")]
    EmptyField { field: &'static str },
    #[error("exchange id must match [a-z0-9_-]+: '{value}'")]
    InvalidExchangeId { value: String },

    #[error("invalid timeframe '{value}', expected one of 1m, 5m, 15m, 1h, 4h, 1d")]
    InvalidTimeframe { value: String },
    #[error("invalid asset class '{value}', expected one of crypto, equity, forex, commodity")]
    InvalidAssetClass { value: String },
    #[error("invalid source '{value}', expected one of coingecko, twelvedata, ccxt, alphavantage")]
    InvalidSource { value: String },
    #[error("invalid sink '{value}', expected one of timeseries, stream")]
    InvalidSink { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("unix timestamp {value} is out of range")]
    TimestampOutOfRange { value: i64 },
    #[error("time interval start must be before end: start={start}, end={end}")]
    InvalidTimeRange { start: String, end: String },

    #[error("currency must be 3-5 uppercase ASCII alphanumerics: '{value}'")]
    InvalidCurrency { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },
    #[error("field '{field}' must be positive")]
    NonPositiveValue { field: &'static str },

    #[error("ohlcv high must be >= low")]
    InvalidBarRange,
    #[error("ohlcv open/close must be within high/low range")]
    InvalidBarBounds,
    #[error("level1 must carry at least one side")]
    EmptyBook,
    #[error("level1 bid price must be <= ask price")]
    CrossedBook,

    #[error("timeout_ms must be greater than zero")]
    InvalidTimeout,
    #[error("actor '{actor}' requires an api_key")]
    MissingApiKey { actor: String },
    #[error("actor '{actor}' requires a connection_string")]
    MissingConnectionString { actor: String },
    #[error("connection string is not a valid http(s) url: '{value}'")]
    InvalidConnectionString { value: String },

    #[error("request_id must be at least 8 characters")]
    InvalidRequestId,
    #[error("schema_version must match vMAJOR.MINOR.PATCH: '{value}'")]
    InvalidSchemaVersion { value: String },
    #[error("error code cannot be empty")]
    EmptyErrorCode,
    #[error("error message cannot be empty")]
    EmptyErrorMessage,
}

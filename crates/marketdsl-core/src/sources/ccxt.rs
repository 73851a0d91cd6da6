//! CCXT exchange data through an MCP tool server.
//!
//! The actor's connection handle is an MCP session opened against the
//! endpoint in `connection_string`. Each read is one `tools/call`:
//!
//! | Operation | Tool |
//! |-----------|------|
//! | price, historical prices | `fetch-trades` |
//! | ohlcv, historical ohlcv | `fetch-ohlcv` |
//! | level1 | `fetch-order-book` |
//!
//! Tool failures carry the CCXT exception name in their text, which is how
//! they are classified.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::contract::{ActorFuture, BoxFuture};
use crate::mcp::{McpConnector, McpError, McpErrorKind, McpSession};
use crate::symbol_map::SymbolTable;
use crate::{
    Actor, ActorBase, ActorConfig, ActorState, AssetClass, BookLevel, DslError, DslErrorKind,
    DslResult, InstrumentType, Level1, MarketContext, MarketDataReader, Ohlcv, Price,
    ReadCapabilities, ReadOperation, SourceId, TimeInterval, Timeframe, UtcDateTime,
    ValidationError,
};

use super::{admit, as_number, finish_series, undeclared};

const MAX_LIMIT: i64 = 1000;

pub const CAPABILITIES: ReadCapabilities = ReadCapabilities::new(
    &[
        ReadOperation::Price,
        ReadOperation::Ohlcv,
        ReadOperation::Level1,
        ReadOperation::HistoricalPrices,
        ReadOperation::HistoricalOhlcv,
    ],
    &[AssetClass::Crypto],
);

/// Canonical exchange id -> CCXT exchange id.
const EXCHANGES: &[(&str, &str)] = &[
    ("binance", "binance"),
    ("coinbase", "coinbase"),
    ("kraken", "kraken"),
    ("bybit", "bybit"),
    ("okx", "okx"),
    ("kucoin", "kucoin"),
    ("bitfinex", "bitfinex"),
    ("gate", "gateio"),
    ("gateio", "gateio"),
];

/// Canonical base ticker -> CCXT unified code.
const BASE_ALIASES: &[(&str, &str)] = &[("XBT", "BTC"), ("XDG", "DOGE")];

type Session = Box<dyn McpSession>;

struct CcxtMarket {
    exchange: &'static str,
    symbol: String,
    market_type: &'static str,
}

impl CcxtMarket {
    fn arguments(&self) -> Map<String, Value> {
        let mut arguments = Map::new();
        arguments.insert(String::from("exchange"), json!(self.exchange));
        arguments.insert(String::from("symbol"), json!(self.symbol));
        arguments.insert(String::from("marketType"), json!(self.market_type));
        arguments
    }
}

/// CCXT reader backed by an MCP tool server.
pub struct CcxtSource {
    base: ActorBase<Session>,
    connector: Arc<dyn McpConnector>,
    bases: SymbolTable,
}

impl CcxtSource {
    /// `connection_string` must be the http(s) URL of the MCP endpoint.
    pub fn new(
        config: ActorConfig,
        connector: Arc<dyn McpConnector>,
    ) -> Result<Self, ValidationError> {
        config.require_http_endpoint()?;
        let bases = SymbolTable::new(BASE_ALIASES, &config.symbol_overrides);
        Ok(Self {
            base: ActorBase::new(config)?,
            connector,
            bases,
        })
    }

    fn translate(&self, context: &MarketContext) -> DslResult<CcxtMarket> {
        let exchange_id = context.exchange().id();
        let exchange = EXCHANGES
            .iter()
            .find(|(known, _)| *known == exchange_id)
            .map(|(_, ccxt)| *ccxt)
            .ok_or_else(|| {
                DslError::invalid_symbol(format!(
                    "{}: exchange '{exchange_id}' is not mapped to a ccxt exchange",
                    self.base.name()
                ))
            })?;

        let symbol = context.symbol();
        let base = self.bases.lookup(symbol.ticker()).unwrap_or(symbol.ticker());
        let quote = symbol.quote_currency();
        let (symbol, market_type) = match symbol.instrument_type() {
            InstrumentType::Cash => (format!("{base}/{quote}"), "spot"),
            InstrumentType::Derivative => (format!("{base}/{quote}:{quote}"), "swap"),
        };

        Ok(CcxtMarket {
            exchange,
            symbol,
            market_type,
        })
    }

    fn admit(
        &self,
        operation: ReadOperation,
        context: &MarketContext,
    ) -> DslResult<(Arc<Session>, CcxtMarket)> {
        admit(&self.base, CAPABILITIES, operation, context, |context| {
            self.translate(context)
        })
    }

    fn undeclared<T>(&self, operation: ReadOperation, context: &MarketContext) -> DslResult<T> {
        undeclared(&self.base, CAPABILITIES, operation, context, |context| {
            self.translate(context)
        })
    }

    async fn call(
        &self,
        session: &Session,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> DslResult<Value> {
        self.base
            .bounded(tool, async {
                session
                    .call_tool(tool, Value::Object(arguments))
                    .await
                    .map_err(classify_tool_error)
            })
            .await
    }

    async fn fetch_price(&self, context: &MarketContext) -> DslResult<Price> {
        let (session, market) = self.admit(ReadOperation::Price, context)?;
        let mut arguments = market.arguments();
        arguments.insert(String::from("limit"), json!(1));

        let payload = self.call(&session, "fetch-trades", arguments).await?;
        let trades = parse_trades(&payload)?;
        trades
            .into_iter()
            .max_by_key(Price::timestamp)
            .ok_or_else(|| DslError::not_found(format!("no trades for {}", market.symbol)))
    }

    async fn fetch_ohlcv(&self, context: &MarketContext) -> DslResult<Ohlcv> {
        let (session, market) = self.admit(ReadOperation::Ohlcv, context)?;
        let mut arguments = market.arguments();
        arguments.insert(String::from("timeframe"), json!(Timeframe::OneMinute.as_str()));
        arguments.insert(String::from("limit"), json!(1));

        let payload = self.call(&session, "fetch-ohlcv", arguments).await?;
        let candles = parse_ohlcv_rows(&payload)?;
        candles
            .into_iter()
            .max_by_key(Ohlcv::timestamp)
            .ok_or_else(|| DslError::not_found(format!("no candles for {}", market.symbol)))
    }

    async fn fetch_level1(&self, context: &MarketContext) -> DslResult<Level1> {
        let (session, market) = self.admit(ReadOperation::Level1, context)?;
        let mut arguments = market.arguments();
        arguments.insert(String::from("limit"), json!(5));

        let payload = self.call(&session, "fetch-order-book", arguments).await?;
        parse_order_book(&payload)
    }

    async fn fetch_historical_prices(
        &self,
        context: &MarketContext,
        range: TimeInterval,
    ) -> DslResult<Vec<Price>> {
        let (session, market) = self.admit(ReadOperation::HistoricalPrices, context)?;
        let mut arguments = market.arguments();
        arguments.insert(String::from("since"), json!(range.start().unix_millis()));
        arguments.insert(String::from("limit"), json!(MAX_LIMIT));

        let payload = self.call(&session, "fetch-trades", arguments).await?;
        Ok(finish_series(parse_trades(&payload)?, &range, Price::timestamp))
    }

    async fn fetch_historical_ohlcv(
        &self,
        context: &MarketContext,
        range: TimeInterval,
        timeframe: Timeframe,
    ) -> DslResult<Vec<Ohlcv>> {
        let (session, market) = self.admit(ReadOperation::HistoricalOhlcv, context)?;
        let buckets = range.duration().whole_seconds() / timeframe.duration().whole_seconds();
        let mut arguments = market.arguments();
        arguments.insert(String::from("timeframe"), json!(timeframe.as_str()));
        arguments.insert(String::from("since"), json!(range.start().unix_millis()));
        arguments.insert(String::from("limit"), json!((buckets + 1).clamp(1, MAX_LIMIT)));

        let payload = self.call(&session, "fetch-ohlcv", arguments).await?;
        Ok(finish_series(parse_ohlcv_rows(&payload)?, &range, Ohlcv::timestamp))
    }

    async fn connect(&self) -> DslResult<Session> {
        let endpoint = self.base.config().require_http_endpoint()?;
        debug!(actor = %self.base.name(), endpoint = %endpoint, "opening mcp session");
        self.connector
            .connect(endpoint)
            .await
            .map_err(DslError::from)
    }
}

impl Actor for CcxtSource {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn state(&self) -> ActorState {
        self.base.state()
    }

    fn initialize(&self) -> ActorFuture<'_, ()> {
        Box::pin(self.base.initialize(self.connect()))
    }

    fn cleanup(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Some(session) = self.base.close() {
                session.close().await;
            }
        })
    }
}

impl MarketDataReader for CcxtSource {
    fn source(&self) -> SourceId {
        SourceId::Ccxt
    }

    fn capabilities(&self) -> ReadCapabilities {
        CAPABILITIES
    }

    fn read_price<'a>(&'a self, context: &'a MarketContext) -> ActorFuture<'a, Price> {
        Box::pin(self.fetch_price(context))
    }

    fn read_ohlcv<'a>(&'a self, context: &'a MarketContext) -> ActorFuture<'a, Ohlcv> {
        Box::pin(self.fetch_ohlcv(context))
    }

    fn read_level1<'a>(&'a self, context: &'a MarketContext) -> ActorFuture<'a, Level1> {
        Box::pin(self.fetch_level1(context))
    }

    fn read_historical_prices<'a>(
        &'a self,
        context: &'a MarketContext,
        range: TimeInterval,
    ) -> ActorFuture<'a, Vec<Price>> {
        Box::pin(self.fetch_historical_prices(context, range))
    }

    fn read_historical_ohlcv<'a>(
        &'a self,
        context: &'a MarketContext,
        range: TimeInterval,
        timeframe: Timeframe,
    ) -> ActorFuture<'a, Vec<Ohlcv>> {
        Box::pin(self.fetch_historical_ohlcv(context, range, timeframe))
    }

    fn read_historical_level1<'a>(
        &'a self,
        context: &'a MarketContext,
        _range: TimeInterval,
    ) -> ActorFuture<'a, Vec<Level1>> {
        Box::pin(async move { self.undeclared(ReadOperation::HistoricalLevel1, context) })
    }
}

/// Classifies a failed tool call by the CCXT exception name in its text.
pub fn classify_tool_error(error: McpError) -> DslError {
    if error.kind() != &McpErrorKind::Tool {
        return DslError::from(error);
    }

    let message = error.message();
    let kind = if contains_any(message, &["RateLimitExceeded", "DDoSProtection"]) {
        DslErrorKind::RateLimited
    } else if contains_any(message, &["BadSymbol"]) {
        DslErrorKind::NotFound
    } else if contains_any(message, &["NotSupported"]) {
        DslErrorKind::UnsupportedOperation
    } else if contains_any(
        message,
        &["NetworkError", "RequestTimeout", "ExchangeNotAvailable"],
    ) {
        DslErrorKind::NetworkError
    } else {
        DslErrorKind::InvalidResponse
    };

    DslError::new(kind, message)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Unwraps `{"<key>": [...]}` or passes a bare array/object through.
fn unwrap_list<'a>(payload: &'a Value, key: &str) -> DslResult<Vec<&'a Value>> {
    let inner = payload.get(key).unwrap_or(payload);
    match inner {
        Value::Array(items) => Ok(items.iter().collect()),
        Value::Object(_) => Ok(vec![inner]),
        _ => Err(DslError::invalid_response(format!(
            "expected '{key}' list in tool payload"
        ))),
    }
}

fn millis_field(value: &Value) -> DslResult<Option<UtcDateTime>> {
    match value.get("timestamp").and_then(as_number) {
        Some(millis) => Ok(Some(UtcDateTime::from_unix_millis(millis as i64)?)),
        None => Ok(None),
    }
}

/// Trades as a single object, an array, or `{"trades":[...]}`.
///
/// A trade without a timestamp is stamped with the receive time; a missing
/// `size`/`amount` is recorded as 0.
pub fn parse_trades(payload: &Value) -> DslResult<Vec<Price>> {
    unwrap_list(payload, "trades")?
        .into_iter()
        .map(|trade| {
            let price = trade
                .get("price")
                .and_then(as_number)
                .ok_or_else(|| DslError::invalid_response("trade has no numeric 'price'"))?;
            let size = trade
                .get("size")
                .or_else(|| trade.get("amount"))
                .and_then(as_number)
                .unwrap_or(0.0);
            let timestamp = millis_field(trade)?.unwrap_or_else(UtcDateTime::now);
            Ok(Price::new(timestamp, price, size)?)
        })
        .collect()
}

/// `[[ms, open, high, low, close, volume], ...]` or `{"ohlcv":[...]}`.
pub fn parse_ohlcv_rows(payload: &Value) -> DslResult<Vec<Ohlcv>> {
    let rows = payload.get("ohlcv").unwrap_or(payload);
    let rows = rows
        .as_array()
        .ok_or_else(|| DslError::invalid_response("ohlcv payload is not an array"))?;

    rows.iter()
        .map(|row| {
            let fields = row
                .as_array()
                .filter(|fields| fields.len() >= 5)
                .ok_or_else(|| {
                    DslError::invalid_response("ohlcv row is not [ms, o, h, l, c, v]")
                })?;
            let number = |index: usize| {
                fields.get(index).and_then(as_number).ok_or_else(|| {
                    DslError::invalid_response(format!("ohlcv column {index} is not a number"))
                })
            };
            let volume = fields.get(5).and_then(as_number).unwrap_or(0.0);
            Ok(Ohlcv::new(
                UtcDateTime::from_unix_millis(number(0)? as i64)?,
                number(1)?,
                number(2)?,
                number(3)?,
                number(4)?,
                volume,
            )?)
        })
        .collect()
}

fn best_level(book: &Value, side: &str) -> DslResult<Option<BookLevel>> {
    let Some(levels) = book.get(side).and_then(Value::as_array) else {
        return Ok(None);
    };
    let Some(best) = levels.first() else {
        return Ok(None);
    };

    let entry = best
        .as_array()
        .ok_or_else(|| DslError::invalid_response(format!("{side} level is not [price, size]")))?;
    let price = entry
        .first()
        .and_then(as_number)
        .ok_or_else(|| DslError::invalid_response(format!("{side} price is not a number")))?;
    let size = entry.get(1).and_then(as_number).unwrap_or(0.0);
    Ok(Some(BookLevel::new(price, size)?))
}

/// Top of `{"bids":[[p, s], ...], "asks":[[p, s], ...], "timestamp": ms}`.
pub fn parse_order_book(payload: &Value) -> DslResult<Level1> {
    let book = payload.get("orderbook").unwrap_or(payload);
    let timestamp = millis_field(book)?.unwrap_or_else(UtcDateTime::now);
    Ok(Level1::new(
        timestamp,
        best_level(book, "bids")?,
        best_level(book, "asks")?,
    )?)
}

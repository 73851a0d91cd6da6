//! Twelve Data REST source.
//!
//! Twelve Data covers every asset class with one symbol grammar: pairs as
//! `BASE/QUOTE`, equities by bare ticker. Errors frequently arrive with a
//! 200 status and a `{"status":"error","code":N}` body, so every payload is
//! checked before parsing.

use std::sync::Arc;

use serde_json::Value;

use crate::contract::{ActorFuture, BoxFuture};
use crate::http_client::{HttpAuth, HttpClient, HttpResponse};
use crate::symbol_map::SymbolTable;
use crate::{
    Actor, ActorBase, ActorConfig, ActorState, AssetClass, DslError, DslResult, Level1,
    MarketContext, MarketDataReader, Ohlcv, Price, ReadCapabilities, ReadOperation, SourceId,
    TimeInterval, Timeframe, UtcDateTime, ValidationError,
};

use super::{
    admit, finish_series, format_date, number_field, optional_number_field,
    parse_provider_datetime, undeclared, RestSession,
};

pub const DEFAULT_BASE_URL: &str = "https://api.twelvedata.com";

const MAX_OUTPUT_SIZE: &str = "5000";

pub const CAPABILITIES: ReadCapabilities = ReadCapabilities::new(
    &[
        ReadOperation::Price,
        ReadOperation::Ohlcv,
        ReadOperation::HistoricalOhlcv,
    ],
    &[
        AssetClass::Crypto,
        AssetClass::Forex,
        AssetClass::Equity,
        AssetClass::Commodity,
    ],
);

/// Tickers whose Twelve Data symbol differs from the canonical pair.
const NATIVE_SYMBOLS: &[(&str, &str)] = &[
    ("XBT", "BTC/USD"),
    ("GOLD", "XAU/USD"),
    ("SILVER", "XAG/USD"),
];

/// Twelve Data reader. Requires an API key.
pub struct TwelveDataSource {
    base: ActorBase<RestSession>,
    http: Arc<dyn HttpClient>,
    symbols: SymbolTable,
}

impl TwelveDataSource {
    pub fn new(config: ActorConfig, http: Arc<dyn HttpClient>) -> Result<Self, ValidationError> {
        config.require_api_key()?;
        let symbols = SymbolTable::new(NATIVE_SYMBOLS, &config.symbol_overrides);
        Ok(Self {
            base: ActorBase::new(config)?,
            http,
            symbols,
        })
    }

    fn translate(&self, context: &MarketContext) -> DslResult<String> {
        let symbol = context.symbol();
        if let Some(native) = self.symbols.lookup(symbol.ticker()) {
            return Ok(native.to_owned());
        }

        Ok(match symbol.asset_class() {
            AssetClass::Equity => symbol.ticker().to_owned(),
            AssetClass::Crypto | AssetClass::Forex | AssetClass::Commodity => symbol.pair(),
        })
    }

    fn admit(
        &self,
        operation: ReadOperation,
        context: &MarketContext,
    ) -> DslResult<(Arc<RestSession>, String)> {
        admit(&self.base, CAPABILITIES, operation, context, |context| {
            self.translate(context)
        })
    }

    fn undeclared<T>(&self, operation: ReadOperation, context: &MarketContext) -> DslResult<T> {
        undeclared(&self.base, CAPABILITIES, operation, context, |context| {
            self.translate(context)
        })
    }

    async fn get(
        &self,
        session: &RestSession,
        path: &str,
        query: &[(&str, &str)],
    ) -> DslResult<Value> {
        let timeout_ms = self.base.config().timeout_ms;
        let payload = self
            .base
            .bounded(path, session.get_json(path, query, timeout_ms))
            .await?;
        check_status(&payload)?;
        Ok(payload)
    }

    async fn fetch_price(&self, context: &MarketContext) -> DslResult<Price> {
        let (session, symbol) = self.admit(ReadOperation::Price, context)?;
        let payload = self
            .get(&session, "/price", &[("symbol", symbol.as_str())])
            .await?;
        parse_price(&payload)
    }

    async fn fetch_ohlcv(&self, context: &MarketContext) -> DslResult<Ohlcv> {
        let (session, symbol) = self.admit(ReadOperation::Ohlcv, context)?;
        let payload = self
            .get(&session, "/quote", &[("symbol", symbol.as_str())])
            .await?;
        parse_quote(&payload)
    }

    async fn fetch_historical_ohlcv(
        &self,
        context: &MarketContext,
        range: TimeInterval,
        timeframe: Timeframe,
    ) -> DslResult<Vec<Ohlcv>> {
        let (session, symbol) = self.admit(ReadOperation::HistoricalOhlcv, context)?;
        let start = format_date(range.start());
        let end = format_date(range.end());
        let payload = self
            .get(
                &session,
                "/time_series",
                &[
                    ("symbol", symbol.as_str()),
                    ("interval", interval(timeframe)),
                    ("start_date", start.as_str()),
                    ("end_date", end.as_str()),
                    ("timezone", "UTC"),
                    ("order", "ASC"),
                    ("outputsize", MAX_OUTPUT_SIZE),
                ],
            )
            .await?;

        let candles = parse_time_series(&payload)?;
        Ok(finish_series(candles, &range, Ohlcv::timestamp))
    }

    async fn connect(&self) -> DslResult<RestSession> {
        let config = self.base.config();
        let key = config.require_api_key()?;
        Ok(RestSession::new(
            Arc::clone(&self.http),
            config.base_url_or(DEFAULT_BASE_URL),
            HttpAuth::QueryParam {
                name: String::from("apikey"),
                value: key.to_owned(),
            },
        ))
    }
}

impl Actor for TwelveDataSource {
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
            self.base.close();
        })
    }
}

impl MarketDataReader for TwelveDataSource {
    fn source(&self) -> SourceId {
        SourceId::TwelveData
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
        Box::pin(async move { self.undeclared(ReadOperation::Level1, context) })
    }

    fn read_historical_prices<'a>(
        &'a self,
        context: &'a MarketContext,
        _range: TimeInterval,
    ) -> ActorFuture<'a, Vec<Price>> {
        Box::pin(async move { self.undeclared(ReadOperation::HistoricalPrices, context) })
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

const fn interval(timeframe: Timeframe) -> &'static str {
    match timeframe {
        Timeframe::OneMinute => "1min",
        Timeframe::FiveMinutes => "5min",
        Timeframe::FifteenMinutes => "15min",
        Timeframe::OneHour => "1h",
        Timeframe::FourHours => "4h",
        Timeframe::OneDay => "1day",
    }
}

/// Maps `{"status":"error","code":N,"message":...}` through the HTTP status table.
pub fn check_status(payload: &Value) -> DslResult<()> {
    if payload.get("status").and_then(Value::as_str) != Some("error") {
        return Ok(());
    }

    let message = payload
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("twelvedata reported an error");
    let code = payload
        .get("code")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
        .unwrap_or(400);

    match HttpResponse::new(code, message).error_for_status() {
        Ok(()) => Err(DslError::invalid_response(message)),
        Err(error) => Err(error),
    }
}

/// `{"price":"45000.50"}`; the endpoint carries no timestamp or size.
pub fn parse_price(payload: &Value) -> DslResult<Price> {
    let price = number_field(payload, "price")?;
    Ok(Price::new(UtcDateTime::now(), price, 0.0)?)
}

/// Latest candle from `/quote`.
pub fn parse_quote(payload: &Value) -> DslResult<Ohlcv> {
    let timestamp = match optional_number_field(payload, "timestamp")? {
        Some(seconds) => UtcDateTime::from_unix_seconds(seconds as i64)?,
        None => datetime_field(payload)?,
    };
    candle(payload, timestamp)
}

/// `{"values":[{"datetime":..,"open":..}, ...]}`
pub fn parse_time_series(payload: &Value) -> DslResult<Vec<Ohlcv>> {
    let values = payload
        .get("values")
        .and_then(Value::as_array)
        .ok_or_else(|| DslError::invalid_response("time_series payload has no 'values' array"))?;

    values
        .iter()
        .map(|row| candle(row, datetime_field(row)?))
        .collect()
}

fn datetime_field(value: &Value) -> DslResult<UtcDateTime> {
    let raw = value
        .get("datetime")
        .and_then(Value::as_str)
        .ok_or_else(|| DslError::invalid_response("missing 'datetime' field"))?;
    parse_provider_datetime(raw)
}

fn candle(value: &Value, timestamp: UtcDateTime) -> DslResult<Ohlcv> {
    Ok(Ohlcv::new(
        timestamp,
        number_field(value, "open")?,
        number_field(value, "high")?,
        number_field(value, "low")?,
        number_field(value, "close")?,
        optional_number_field(value, "volume")?.unwrap_or(0.0),
    )?)
}

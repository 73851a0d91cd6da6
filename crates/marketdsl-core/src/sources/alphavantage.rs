//! Alpha Vantage REST source for crypto and forex.
//!
//! All endpoints hang off a single `/query` route selected by `function`.
//! Throttling and bad symbols come back as 200 responses carrying `Note`,
//! `Information` or `Error Message` keys.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::contract::{ActorFuture, BoxFuture};
use crate::http_client::{HttpAuth, HttpClient};
use crate::symbol_map::SymbolTable;
use crate::{
    Actor, ActorBase, ActorConfig, ActorState, AssetClass, BookLevel, DslError, DslErrorKind,
    DslResult, Level1, MarketContext, MarketDataReader, Ohlcv, Price, ReadCapabilities,
    ReadOperation, SourceId, TimeInterval, Timeframe, UtcDateTime, ValidationError,
};

use super::{admit, as_number, finish_series, parse_provider_datetime, undeclared, RestSession};

pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co";

pub const CAPABILITIES: ReadCapabilities = ReadCapabilities::new(
    &[
        ReadOperation::Price,
        ReadOperation::Ohlcv,
        ReadOperation::Level1,
        ReadOperation::HistoricalOhlcv,
    ],
    &[AssetClass::Crypto, AssetClass::Forex],
);

const CODE_ALIASES: &[(&str, &str)] = &[("XBT", "BTC"), ("WBTC", "BTC")];

const EXCHANGE_RATE_KEY: &str = "Realtime Currency Exchange Rate";
const CRYPTO_DAILY_KEY: &str = "Time Series (Digital Currency Daily)";
const FX_DAILY_KEY: &str = "Time Series FX (Daily)";

struct Codes {
    from: String,
    to: String,
    asset_class: AssetClass,
}

/// Alpha Vantage reader. Requires an API key.
pub struct AlphaVantageSource {
    base: ActorBase<RestSession>,
    http: Arc<dyn HttpClient>,
    codes: SymbolTable,
}

impl AlphaVantageSource {
    pub fn new(config: ActorConfig, http: Arc<dyn HttpClient>) -> Result<Self, ValidationError> {
        config.require_api_key()?;
        let codes = SymbolTable::new(CODE_ALIASES, &config.symbol_overrides);
        Ok(Self {
            base: ActorBase::new(config)?,
            http,
            codes,
        })
    }

    fn translate(&self, context: &MarketContext) -> DslResult<Codes> {
        let symbol = context.symbol();
        let from = self
            .codes
            .lookup(symbol.ticker())
            .unwrap_or(symbol.ticker())
            .to_owned();

        if symbol.asset_class() == AssetClass::Forex && from.len() != 3 {
            return Err(DslError::invalid_symbol(format!(
                "{}: forex base '{from}' is not a three-letter currency code",
                self.base.name()
            )));
        }

        Ok(Codes {
            from,
            to: symbol.quote_currency().to_owned(),
            asset_class: symbol.asset_class(),
        })
    }

    fn admit(
        &self,
        operation: ReadOperation,
        context: &MarketContext,
    ) -> DslResult<(Arc<RestSession>, Codes)> {
        admit(&self.base, CAPABILITIES, operation, context, |context| {
            self.translate(context)
        })
    }

    fn undeclared<T>(&self, operation: ReadOperation, context: &MarketContext) -> DslResult<T> {
        undeclared(&self.base, CAPABILITIES, operation, context, |context| {
            self.translate(context)
        })
    }

    async fn query(
        &self,
        session: &RestSession,
        function: &str,
        params: &[(&str, &str)],
    ) -> DslResult<Value> {
        let timeout_ms = self.base.config().timeout_ms;
        let mut query = vec![("function", function)];
        query.extend_from_slice(params);

        let payload = self
            .base
            .bounded(function, session.get_json("/query", &query, timeout_ms))
            .await?;
        check_payload(&payload)?;
        Ok(payload)
    }

    async fn exchange_rate(&self, session: &RestSession, codes: &Codes) -> DslResult<Value> {
        self.query(
            session,
            "CURRENCY_EXCHANGE_RATE",
            &[
                ("from_currency", codes.from.as_str()),
                ("to_currency", codes.to.as_str()),
            ],
        )
        .await
    }

    async fn daily_series(&self, session: &RestSession, codes: &Codes) -> DslResult<Vec<Ohlcv>> {
        match codes.asset_class {
            AssetClass::Forex => {
                let payload = self
                    .query(
                        session,
                        "FX_DAILY",
                        &[
                            ("from_symbol", codes.from.as_str()),
                            ("to_symbol", codes.to.as_str()),
                            ("outputsize", "full"),
                        ],
                    )
                    .await?;
                parse_daily_series(&payload, FX_DAILY_KEY)
            }
            _ => {
                let payload = self
                    .query(
                        session,
                        "DIGITAL_CURRENCY_DAILY",
                        &[
                            ("symbol", codes.from.as_str()),
                            ("market", codes.to.as_str()),
                        ],
                    )
                    .await?;
                parse_daily_series(&payload, CRYPTO_DAILY_KEY)
            }
        }
    }

    async fn fetch_price(&self, context: &MarketContext) -> DslResult<Price> {
        let (session, codes) = self.admit(ReadOperation::Price, context)?;
        let payload = self.exchange_rate(&session, &codes).await?;
        parse_exchange_rate_price(&payload)
    }

    async fn fetch_level1(&self, context: &MarketContext) -> DslResult<Level1> {
        let (session, codes) = self.admit(ReadOperation::Level1, context)?;
        let payload = self.exchange_rate(&session, &codes).await?;
        parse_exchange_rate_level1(&payload)
    }

    async fn fetch_ohlcv(&self, context: &MarketContext) -> DslResult<Ohlcv> {
        let (session, codes) = self.admit(ReadOperation::Ohlcv, context)?;
        let candles = self.daily_series(&session, &codes).await?;
        candles.into_iter().last().ok_or_else(|| {
            DslError::not_found(format!(
                "{}: no daily candle for {}",
                self.base.name(),
                context.symbol()
            ))
        })
    }

    async fn fetch_historical_ohlcv(
        &self,
        context: &MarketContext,
        range: TimeInterval,
        timeframe: Timeframe,
    ) -> DslResult<Vec<Ohlcv>> {
        let (session, codes) = self.admit(ReadOperation::HistoricalOhlcv, context)?;
        if timeframe != Timeframe::OneDay {
            return Err(DslError::unsupported(
                format!("historical_ohlcv@{timeframe}"),
                self.base.name(),
            ));
        }

        let candles = self.daily_series(&session, &codes).await?;
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

impl Actor for AlphaVantageSource {
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

impl MarketDataReader for AlphaVantageSource {
    fn source(&self) -> SourceId {
        SourceId::AlphaVantage
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

/// Maps the in-band error keys Alpha Vantage returns with a 200 status.
pub fn check_payload(payload: &Value) -> DslResult<()> {
    if let Some(message) = payload.get("Error Message").and_then(Value::as_str) {
        return Err(DslError::not_found(message));
    }

    let notice = payload
        .get("Note")
        .or_else(|| payload.get("Information"))
        .and_then(Value::as_str);
    if let Some(message) = notice {
        if message.to_ascii_lowercase().contains("premium") {
            return Err(DslError::new(DslErrorKind::UnsupportedOperation, message));
        }
        return Err(DslError::rate_limited(message));
    }

    Ok(())
}

fn exchange_rate_block(payload: &Value) -> DslResult<&Map<String, Value>> {
    payload
        .get(EXCHANGE_RATE_KEY)
        .and_then(Value::as_object)
        .ok_or_else(|| DslError::invalid_response(format!("payload has no '{EXCHANGE_RATE_KEY}'")))
}

/// Fields are looked up by their numbered suffix, e.g. `open` matches `1. open`
/// and `1a. open (USD)`.
fn field<'a>(block: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    block.iter().find_map(|(key, value)| {
        let label = key.split_once(". ").map_or(key.as_str(), |(_, label)| label);
        let label = label.split(" (").next().unwrap_or(label);
        label.eq_ignore_ascii_case(name).then_some(value)
    })
}

fn number(block: &Map<String, Value>, name: &str) -> DslResult<f64> {
    field(block, name)
        .and_then(as_number)
        .ok_or_else(|| DslError::invalid_response(format!("missing numeric field '{name}'")))
}

/// `-` or an absent key means the side is unknown.
fn optional_side(block: &Map<String, Value>, name: &str) -> DslResult<Option<BookLevel>> {
    match field(block, name).and_then(as_number) {
        Some(price) => Ok(Some(BookLevel::new(price, 0.0)?)),
        None => Ok(None),
    }
}

fn last_refreshed(block: &Map<String, Value>) -> DslResult<UtcDateTime> {
    let raw = field(block, "Last Refreshed")
        .and_then(Value::as_str)
        .ok_or_else(|| DslError::invalid_response("missing 'Last Refreshed' field"))?;
    parse_provider_datetime(raw)
}

pub fn parse_exchange_rate_price(payload: &Value) -> DslResult<Price> {
    let block = exchange_rate_block(payload)?;
    let price = number(block, "Exchange Rate")?;
    Ok(Price::new(last_refreshed(block)?, price, 0.0)?)
}

pub fn parse_exchange_rate_level1(payload: &Value) -> DslResult<Level1> {
    let block = exchange_rate_block(payload)?;
    Ok(Level1::new(
        last_refreshed(block)?,
        optional_side(block, "Bid Price")?,
        optional_side(block, "Ask Price")?,
    )?)
}

/// Daily series keyed by date; returned ascending.
pub fn parse_daily_series(payload: &Value, series_key: &str) -> DslResult<Vec<Ohlcv>> {
    let series = payload
        .get(series_key)
        .and_then(Value::as_object)
        .ok_or_else(|| DslError::invalid_response(format!("payload has no '{series_key}'")))?;

    let mut candles = series
        .iter()
        .map(|(date, row)| {
            let row = row
                .as_object()
                .ok_or_else(|| DslError::invalid_response(format!("row '{date}' is not an object")))?;
            let volume = field(row, "volume").and_then(as_number).unwrap_or(0.0);
            Ok(Ohlcv::new(
                parse_provider_datetime(date)?,
                number(row, "open")?,
                number(row, "high")?,
                number(row, "low")?,
                number(row, "close")?,
                volume,
            )?)
        })
        .collect::<DslResult<Vec<_>>>()?;

    candles.sort_by_key(Ohlcv::timestamp);
    Ok(candles)
}

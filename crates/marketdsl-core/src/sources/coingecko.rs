//! CoinGecko aggregator over REST.
//!
//! CoinGecko publishes aggregated prices only: there is no order book, no
//! trade size and no candle endpoint with a caller-chosen width, so only
//! current and historical prices are declared.

use std::sync::Arc;

use serde_json::Value;

use crate::contract::{ActorFuture, BoxFuture};
use crate::http_client::{HttpAuth, HttpClient};
use crate::symbol_map::SymbolTable;
use crate::{
    Actor, ActorBase, ActorConfig, ActorState, AssetClass, DslError, DslResult, Level1,
    MarketContext, MarketDataReader, Ohlcv, Price, ReadCapabilities, ReadOperation, SourceId,
    TimeInterval, Timeframe, UtcDateTime, ValidationError,
};

use super::{
    admit, finish_series, number_field, optional_number_field, undeclared, RestSession,
};

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

pub const CAPABILITIES: ReadCapabilities = ReadCapabilities::new(
    &[ReadOperation::Price, ReadOperation::HistoricalPrices],
    &[AssetClass::Crypto],
);

const COIN_IDS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("SOL", "solana"),
    ("USDT", "tether"),
    ("USDC", "usd-coin"),
    ("DAI", "dai"),
    ("BNB", "binancecoin"),
    ("XRP", "ripple"),
    ("ADA", "cardano"),
    ("DOGE", "dogecoin"),
    ("DOT", "polkadot"),
    ("LTC", "litecoin"),
    ("LINK", "chainlink"),
    ("AVAX", "avalanche-2"),
    ("MATIC", "matic-network"),
    ("TRX", "tron"),
    ("ATOM", "cosmos"),
    ("UNI", "uniswap"),
    ("PAXG", "pax-gold"),
];

const VS_CURRENCIES: &[(&str, &str)] = &[
    ("USD", "usd"),
    ("EUR", "eur"),
    ("GBP", "gbp"),
    ("JPY", "jpy"),
    ("CHF", "chf"),
    ("CAD", "cad"),
    ("AUD", "aud"),
    ("KRW", "krw"),
    ("BTC", "btc"),
    ("ETH", "eth"),
];

struct CoinQuery {
    id: String,
    vs_currency: &'static str,
}

/// CoinGecko price reader.
pub struct CoinGeckoSource {
    base: ActorBase<RestSession>,
    http: Arc<dyn HttpClient>,
    coins: SymbolTable,
}

impl CoinGeckoSource {
    /// The API key is optional; when present it is sent as the pro or demo key
    /// header depending on the configured root.
    pub fn new(config: ActorConfig, http: Arc<dyn HttpClient>) -> Result<Self, ValidationError> {
        let coins = SymbolTable::new(COIN_IDS, &config.symbol_overrides);
        Ok(Self {
            base: ActorBase::new(config)?,
            http,
            coins,
        })
    }

    fn translate(&self, context: &MarketContext) -> DslResult<CoinQuery> {
        let symbol = context.symbol();
        let id = self.coins.lookup(symbol.ticker()).ok_or_else(|| {
            DslError::invalid_symbol(format!(
                "{}: no coingecko id for ticker '{}'",
                self.base.name(),
                symbol.ticker()
            ))
        })?;
        let vs_currency = lookup_vs_currency(symbol.quote_currency()).ok_or_else(|| {
            DslError::invalid_symbol(format!(
                "{}: quote currency '{}' is not a coingecko vs_currency",
                self.base.name(),
                symbol.quote_currency()
            ))
        })?;

        Ok(CoinQuery {
            id: id.to_owned(),
            vs_currency,
        })
    }

    fn admit(
        &self,
        operation: ReadOperation,
        context: &MarketContext,
    ) -> DslResult<(Arc<RestSession>, CoinQuery)> {
        admit(&self.base, CAPABILITIES, operation, context, |context| {
            self.translate(context)
        })
    }

    fn undeclared<T>(&self, operation: ReadOperation, context: &MarketContext) -> DslResult<T> {
        undeclared(&self.base, CAPABILITIES, operation, context, |context| {
            self.translate(context)
        })
    }

    async fn fetch_price(&self, context: &MarketContext) -> DslResult<Price> {
        let (session, query) = self.admit(ReadOperation::Price, context)?;
        let timeout_ms = self.base.config().timeout_ms;
        let payload = self
            .base
            .bounded(
                "simple/price",
                session.get_json(
                    "/simple/price",
                    &[
                        ("ids", query.id.as_str()),
                        ("vs_currencies", query.vs_currency),
                        ("include_last_updated_at", "true"),
                    ],
                    timeout_ms,
                ),
            )
            .await?;

        parse_simple_price(&payload, &query.id, query.vs_currency)
    }

    async fn fetch_historical_prices(
        &self,
        context: &MarketContext,
        range: TimeInterval,
    ) -> DslResult<Vec<Price>> {
        let (session, query) = self.admit(ReadOperation::HistoricalPrices, context)?;
        let timeout_ms = self.base.config().timeout_ms;
        let from = range.start().unix_seconds().to_string();
        let to = range.end().unix_seconds().to_string();
        let path = format!("/coins/{}/market_chart/range", urlencoding::encode(&query.id));
        let payload = self
            .base
            .bounded(
                "market_chart/range",
                session.get_json(
                    &path,
                    &[
                        ("vs_currency", query.vs_currency),
                        ("from", from.as_str()),
                        ("to", to.as_str()),
                    ],
                    timeout_ms,
                ),
            )
            .await?;

        let prices = parse_market_chart(&payload)?;
        Ok(finish_series(prices, &range, Price::timestamp))
    }

    async fn connect(&self) -> DslResult<RestSession> {
        let config = self.base.config();
        let base_url = config.base_url_or(DEFAULT_BASE_URL);
        let auth = match config.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => HttpAuth::Header {
                name: if base_url.contains("pro-api") {
                    String::from("x-cg-pro-api-key")
                } else {
                    String::from("x-cg-demo-api-key")
                },
                value: key.to_owned(),
            },
            _ => HttpAuth::None,
        };
        Ok(RestSession::new(Arc::clone(&self.http), base_url, auth))
    }
}

impl Actor for CoinGeckoSource {
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

impl MarketDataReader for CoinGeckoSource {
    fn source(&self) -> SourceId {
        SourceId::CoinGecko
    }

    fn capabilities(&self) -> ReadCapabilities {
        CAPABILITIES
    }

    fn read_price<'a>(&'a self, context: &'a MarketContext) -> ActorFuture<'a, Price> {
        Box::pin(self.fetch_price(context))
    }

    fn read_ohlcv<'a>(&'a self, context: &'a MarketContext) -> ActorFuture<'a, Ohlcv> {
        Box::pin(async move { self.undeclared(ReadOperation::Ohlcv, context) })
    }

    fn read_level1<'a>(&'a self, context: &'a MarketContext) -> ActorFuture<'a, Level1> {
        Box::pin(async move { self.undeclared(ReadOperation::Level1, context) })
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
        _range: TimeInterval,
        _timeframe: Timeframe,
    ) -> ActorFuture<'a, Vec<Ohlcv>> {
        Box::pin(async move { self.undeclared(ReadOperation::HistoricalOhlcv, context) })
    }

    fn read_historical_level1<'a>(
        &'a self,
        context: &'a MarketContext,
        _range: TimeInterval,
    ) -> ActorFuture<'a, Vec<Level1>> {
        Box::pin(async move { self.undeclared(ReadOperation::HistoricalLevel1, context) })
    }
}

fn lookup_vs_currency(quote: &str) -> Option<&'static str> {
    VS_CURRENCIES
        .iter()
        .find(|(code, _)| *code == quote)
        .map(|(_, vs)| *vs)
}

/// `{"bitcoin":{"usd":45000.5,"last_updated_at":1704067200}}`
pub fn parse_simple_price(payload: &Value, id: &str, vs_currency: &str) -> DslResult<Price> {
    let entry = payload.get(id).ok_or_else(|| {
        DslError::not_found(format!("coingecko returned no price for '{id}'"))
    })?;
    let price = number_field(entry, vs_currency)?;
    let timestamp = match optional_number_field(entry, "last_updated_at")? {
        Some(seconds) => UtcDateTime::from_unix_seconds(seconds as i64)?,
        None => UtcDateTime::now(),
    };

    Ok(Price::new(timestamp, price, 0.0)?)
}

/// `{"prices":[[ms, price], ...]}`
pub fn parse_market_chart(payload: &Value) -> DslResult<Vec<Price>> {
    let points = payload
        .get("prices")
        .and_then(Value::as_array)
        .ok_or_else(|| DslError::invalid_response("market_chart payload has no 'prices' array"))?;

    points
        .iter()
        .map(|point| {
            let pair = point
                .as_array()
                .filter(|pair| pair.len() >= 2)
                .ok_or_else(|| DslError::invalid_response("market_chart point is not [ms, price]"))?;
            let millis = super::as_number(&pair[0])
                .ok_or_else(|| DslError::invalid_response("market_chart timestamp is not a number"))?;
            let price = super::as_number(&pair[1])
                .ok_or_else(|| DslError::invalid_response("market_chart price is not a number"))?;
            Ok(Price::new(
                UtcDateTime::from_unix_millis(millis as i64)?,
                price,
                0.0,
            )?)
        })
        .collect()
}

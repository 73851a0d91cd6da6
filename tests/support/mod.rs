//! Scripted transports and stores shared by the integration suites.
//!
//! Every fake counts the calls it receives so tests can assert that a
//! rejected request never reached the network.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use marketdsl_core::contract::BoxFuture;
use marketdsl_core::http_client::{HttpClient, HttpError, HttpRequest, HttpResponse};
use marketdsl_core::mcp::{McpConnector, McpError, McpSession};
use marketdsl_core::targets::{StoreConnector, TimeSeriesStore};
use marketdsl_core::{
    AssetClass, DslError, DslResult, Exchange, InstrumentType, MarketContext, MarketSymbol, Ohlcv,
    Price, TimeInterval, UtcDateTime, VenueType,
};

// =============================================================================
// Contexts and values
// =============================================================================

pub fn context(exchange: &str, pair: &str, asset_class: AssetClass) -> MarketContext {
    MarketContext::new(
        Exchange::new(exchange, exchange, "", VenueType::Centralized).expect("valid exchange"),
        MarketSymbol::parse_pair(pair, asset_class).expect("valid pair"),
    )
}

pub fn crypto(exchange: &str, pair: &str) -> MarketContext {
    context(exchange, pair, AssetClass::Crypto)
}

pub fn perpetual(exchange: &str, base: &str, quote: &str) -> MarketContext {
    MarketContext::new(
        Exchange::new(exchange, exchange, "", VenueType::Centralized).expect("valid exchange"),
        MarketSymbol::new(base, "", AssetClass::Crypto, quote, InstrumentType::Derivative)
            .expect("valid symbol"),
    )
}

pub fn ts(input: &str) -> UtcDateTime {
    UtcDateTime::parse(input).expect("valid timestamp")
}

pub fn range(start: &str, end: &str) -> TimeInterval {
    TimeInterval::parse(start, end).expect("valid range")
}

pub fn price_at(input: &str, price: f64) -> Price {
    Price::new(ts(input), price, 1.0).expect("valid price")
}

pub fn candle_at(input: &str, close: f64) -> Ohlcv {
    Ohlcv::new(ts(input), close, close + 10.0, close - 10.0, close, 5.0).expect("valid candle")
}

// =============================================================================
// HTTP
// =============================================================================

/// One scripted HTTP exchange.
#[derive(Debug, Clone)]
pub enum Reply {
    Respond(HttpResponse),
    Fail(HttpError),
    /// Never answers within any realistic actor timeout.
    Hang,
}

impl Reply {
    pub fn json(body: Value) -> Self {
        Self::Respond(HttpResponse::ok_json(body.to_string()))
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self::Respond(HttpResponse::new(status, body))
    }
}

/// HTTP client answering from a queue, in order.
#[derive(Default)]
pub struct ScriptedHttp {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<HttpRequest>>,
    calls: AtomicUsize,
}

impl ScriptedHttp {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        })
    }

    pub fn silent() -> Arc<Self> {
        Self::new([])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn last_url(&self) -> String {
        self.requests()
            .last()
            .map(|request| request.url.clone())
            .expect("at least one request")
    }

    pub fn client(self: &Arc<Self>) -> Arc<dyn HttpClient> {
        Arc::clone(self) as Arc<dyn HttpClient>
    }
}

impl HttpClient for ScriptedHttp {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, HttpError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().expect("requests lock").push(request);
        let reply = self.replies.lock().expect("replies lock").pop_front();

        Box::pin(async move {
            match reply {
                Some(Reply::Respond(response)) => Ok(response),
                Some(Reply::Fail(error)) => Err(error),
                Some(Reply::Hang) => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Err(HttpError::timeout("scripted hang elapsed"))
                }
                None => Err(HttpError::connect("no scripted reply left")),
            }
        })
    }
}

// =============================================================================
// MCP
// =============================================================================

#[derive(Default)]
struct ToolScript {
    results: Mutex<VecDeque<Result<Value, McpError>>>,
    invocations: Mutex<Vec<(String, Value)>>,
    calls: AtomicUsize,
    closed: AtomicUsize,
}

/// MCP connector whose sessions answer tool calls from a queue.
pub struct ScriptedMcp {
    script: Arc<ToolScript>,
    refuse: Option<McpError>,
    connects: AtomicUsize,
}

impl ScriptedMcp {
    pub fn new(results: impl IntoIterator<Item = Result<Value, McpError>>) -> Arc<Self> {
        let script = ToolScript {
            results: Mutex::new(results.into_iter().collect()),
            ..ToolScript::default()
        };
        Arc::new(Self {
            script: Arc::new(script),
            refuse: None,
            connects: AtomicUsize::new(0),
        })
    }

    /// Connector that cannot open a session.
    pub fn refusing(error: McpError) -> Arc<Self> {
        Arc::new(Self {
            script: Arc::new(ToolScript::default()),
            refuse: Some(error),
            connects: AtomicUsize::new(0),
        })
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn tool_calls(&self) -> usize {
        self.script.calls.load(Ordering::SeqCst)
    }

    pub fn closed_sessions(&self) -> usize {
        self.script.closed.load(Ordering::SeqCst)
    }

    pub fn invocations(&self) -> Vec<(String, Value)> {
        self.script.invocations.lock().expect("invocations lock").clone()
    }

    pub fn connector(self: &Arc<Self>) -> Arc<dyn McpConnector> {
        Arc::clone(self) as Arc<dyn McpConnector>
    }
}

impl McpConnector for ScriptedMcp {
    fn connect(&self, _endpoint: String) -> BoxFuture<'_, Result<Box<dyn McpSession>, McpError>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if let Some(error) = &self.refuse {
                return Err(error.clone());
            }
            let session: Box<dyn McpSession> = Box::new(ScriptedSession {
                script: Arc::clone(&self.script),
            });
            Ok(session)
        })
    }
}

struct ScriptedSession {
    script: Arc<ToolScript>,
}

impl McpSession for ScriptedSession {
    fn call_tool<'a>(
        &'a self,
        name: &'a str,
        arguments: Value,
    ) -> BoxFuture<'a, Result<Value, McpError>> {
        Box::pin(async move {
            self.script.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .invocations
                .lock()
                .expect("invocations lock")
                .push((name.to_owned(), arguments));
            self.script
                .results
                .lock()
                .expect("results lock")
                .pop_front()
                .unwrap_or_else(|| Err(McpError::protocol("no scripted tool result left")))
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.script.closed.fetch_add(1, Ordering::SeqCst);
        })
    }
}

// =============================================================================
// Time-series store
// =============================================================================

/// In-memory upsert store keyed like the DuckDB one.
#[derive(Default)]
pub struct MemoryStore {
    prices: Mutex<BTreeMap<(String, i64), f64>>,
    candles: Mutex<BTreeMap<(String, i64), f64>>,
    reject_at: BTreeSet<i64>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store refusing rows stamped at any of `timestamps`.
    pub fn rejecting(timestamps: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            reject_at: timestamps.iter().map(|input| ts(input).unix_millis()).collect(),
            ..Self::default()
        })
    }

    pub fn price_rows(&self) -> usize {
        self.prices.lock().expect("prices lock").len()
    }

    pub fn candle_rows(&self) -> usize {
        self.candles.lock().expect("candles lock").len()
    }

    fn check(&self, millis: i64) -> DslResult<()> {
        if self.reject_at.contains(&millis) {
            return Err(DslError::rejected(format!("row at {millis} refused")));
        }
        Ok(())
    }
}

impl TimeSeriesStore for MemoryStore {
    fn upsert_price(&self, context: &MarketContext, price: &Price) -> DslResult<()> {
        let millis = price.timestamp().unix_millis();
        self.check(millis)?;
        self.prices
            .lock()
            .expect("prices lock")
            .insert((context.key(), millis), price.price());
        Ok(())
    }

    fn upsert_ohlcv(&self, context: &MarketContext, candle: &Ohlcv) -> DslResult<()> {
        let millis = candle.timestamp().unix_millis();
        self.check(millis)?;
        self.candles
            .lock()
            .expect("candles lock")
            .insert((context.key(), millis), candle.close());
        Ok(())
    }
}

/// Hands out the same [`MemoryStore`] on every open.
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
    opens: AtomicUsize,
}

impl MemoryConnector {
    pub fn new(store: &Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            store: Arc::clone(store),
            opens: AtomicUsize::new(0),
        })
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl StoreConnector for MemoryConnector {
    fn open(
        &self,
        _connection_string: String,
    ) -> BoxFuture<'_, DslResult<Arc<dyn TimeSeriesStore>>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let store: Arc<dyn TimeSeriesStore> = Arc::clone(&self.store) as Arc<dyn TimeSeriesStore>;
        Box::pin(async move { Ok(store) })
    }
}

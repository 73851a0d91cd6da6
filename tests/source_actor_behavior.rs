//! Behavior-driven tests for source actors
//!
//! These tests verify HOW each source turns provider payloads and failures
//! into domain values and classified errors, using scripted transports.

#[path = "support/mod.rs"]
mod support;

use serde_json::json;

use marketdsl_core::http_client::HttpError;
use marketdsl_core::mcp::McpError;
use marketdsl_core::sources::{AlphaVantageSource, CcxtSource, CoinGeckoSource, TwelveDataSource};
use marketdsl_core::{
    Actor, ActorConfig, ActorState, DslErrorKind, MarketDataReader, Timeframe,
};

use support::{crypto, perpetual, range, ts, Reply, ScriptedHttp, ScriptedMcp};

const MCP_ENDPOINT: &str = "http://127.0.0.1:7010/mcp";

fn ccxt(mcp: &std::sync::Arc<ScriptedMcp>) -> CcxtSource {
    CcxtSource::new(
        ActorConfig::new("ccxt").with_connection_string(MCP_ENDPOINT),
        mcp.connector(),
    )
    .expect("valid config")
}

// =============================================================================
// CCXT: Current Market Data
// =============================================================================

#[tokio::test]
async fn when_ccxt_reports_a_trade_system_returns_its_price_and_size() {
    // Given: A CCXT source whose trade tool reports one trade
    let mcp = ScriptedMcp::new([Ok(json!({
        "price": 45000.5,
        "size": 1.5,
        "timestamp": 1_704_067_200_000_i64
    }))]);
    let source = ccxt(&mcp);
    source.initialize().await.expect("session opens");

    // When: The current price of BTC/USD on Coinbase is requested
    let price = source
        .read_price(&crypto("coinbase", "BTC/USD"))
        .await
        .expect("price should parse");

    // Then: Price and size come straight from the trade
    assert_eq!(price.price(), 45_000.5);
    assert_eq!(price.size(), 1.5);
    assert_eq!(price.timestamp(), ts("2024-01-01T00:00:00Z"));

    // And: Exactly one trade tool call was made with the unified spot symbol
    let invocations = mcp.invocations();
    assert_eq!(invocations.len(), 1);
    let (tool, arguments) = &invocations[0];
    assert_eq!(tool, "fetch-trades");
    assert_eq!(arguments["exchange"], json!("coinbase"));
    assert_eq!(arguments["symbol"], json!("BTC/USD"));
    assert_eq!(arguments["marketType"], json!("spot"));
}

#[tokio::test]
async fn when_ccxt_reads_a_derivative_system_addresses_the_swap_market() {
    // Given: A perpetual on Bybit
    let mcp = ScriptedMcp::new([Ok(json!({
        "bids": [[45000.0, 2.0], [44999.0, 1.0]],
        "asks": [[45001.0, 0.5]],
        "timestamp": 1_704_067_200_000_i64
    }))]);
    let source = ccxt(&mcp);
    source.initialize().await.expect("session opens");

    // When: Level 1 data is requested
    let level1 = source
        .read_level1(&perpetual("bybit", "BTC", "USDT"))
        .await
        .expect("book should parse");

    // Then: The top of book is returned and the swap symbol was used
    assert_eq!(level1.bid().map(|level| level.price()), Some(45_000.0));
    assert_eq!(level1.ask().map(|level| level.size()), Some(0.5));
    let (_, arguments) = &mcp.invocations()[0];
    assert_eq!(arguments["symbol"], json!("BTC/USDT:USDT"));
    assert_eq!(arguments["marketType"], json!("swap"));
}

#[tokio::test]
async fn when_ccxt_returns_historical_candles_system_orders_and_bounds_them() {
    // Given: Candles out of order, one of them outside the requested window
    let mcp = ScriptedMcp::new([Ok(json!([
        [1_704_081_600_000_i64, 101.0, 110.0, 95.0, 105.0, 3.0],
        [1_704_067_200_000_i64, 100.0, 108.0, 90.0, 101.0, 2.0],
        [1_704_240_000_000_i64, 105.0, 112.0, 99.0, 111.0, 4.0],
        [1_704_074_400_000_i64, 101.0, 109.0, 97.0, 101.0, 1.0]
    ]))]);
    let source = ccxt(&mcp);
    source.initialize().await.expect("session opens");
    let window = range("2024-01-01T00:00:00Z", "2024-01-02T00:00:00Z");

    // When: Four-hour candles for the window are requested
    let candles = source
        .read_historical_ohlcv(&crypto("binance", "ETH/USDT"), window, Timeframe::FourHours)
        .await
        .expect("candles should parse");

    // Then: They come back ascending and only inside the window
    let stamps = candles
        .iter()
        .map(|candle| candle.timestamp().unix_seconds())
        .collect::<Vec<_>>();
    assert_eq!(stamps, vec![1_704_067_200, 1_704_074_400, 1_704_081_600]);

    // And: The request asked for the window's bucket count
    let (tool, arguments) = &mcp.invocations()[0];
    assert_eq!(tool, "fetch-ohlcv");
    assert_eq!(arguments["timeframe"], json!("4h"));
    assert_eq!(arguments["since"], json!(1_704_067_200_000_i64));
    assert_eq!(arguments["limit"], json!(7));
}

#[tokio::test]
async fn when_ccxt_tool_reports_rate_limiting_system_marks_it_retryable() {
    // Given: The exchange throttles the tool call
    let mcp = ScriptedMcp::new([Err(McpError::tool(
        "ccxt.base.errors.RateLimitExceeded: binance 429 Too Many Requests",
    ))]);
    let source = ccxt(&mcp);
    source.initialize().await.expect("session opens");

    // When: A price is requested
    let error = source
        .read_price(&crypto("binance", "BTC/USDT"))
        .await
        .expect_err("throttled call fails");

    // Then: The failure is RateLimited and worth retrying
    assert_eq!(error.kind(), DslErrorKind::RateLimited);
    assert!(error.retryable());
}

#[tokio::test]
async fn when_ccxt_tool_reports_a_bad_symbol_system_returns_not_found() {
    let mcp = ScriptedMcp::new([Err(McpError::tool(
        "ccxt.base.errors.BadSymbol: kraken does not have market symbol DOGE/CHF",
    ))]);
    let source = ccxt(&mcp);
    source.initialize().await.expect("session opens");

    let error = source
        .read_ohlcv(&crypto("kraken", "DOGE/CHF"))
        .await
        .expect_err("bad symbol fails");

    assert_eq!(error.kind(), DslErrorKind::NotFound);
    assert!(!error.retryable());
}

#[tokio::test]
async fn when_mcp_server_is_unreachable_initialization_fails_for_good() {
    // Given: A connector that cannot reach the MCP server
    let mcp = ScriptedMcp::refusing(McpError::new(
        marketdsl_core::mcp::McpErrorKind::Transport,
        "connection refused",
    ));
    let source = ccxt(&mcp);

    // When: The source is initialized twice
    let first = source.initialize().await.expect_err("connect fails");
    let second = source.initialize().await.expect_err("failure is terminal");

    // Then: The first failure is a network error, the retry is refused locally
    assert_eq!(first.kind(), DslErrorKind::NetworkError);
    assert_eq!(second.kind(), DslErrorKind::NotReady);
    assert_eq!(source.state(), ActorState::Failed);
    assert_eq!(mcp.connects(), 1);
}

#[tokio::test]
async fn when_ccxt_source_is_cleaned_up_its_session_is_closed_once() {
    let mcp = ScriptedMcp::new([]);
    let source = ccxt(&mcp);
    source.initialize().await.expect("session opens");

    source.cleanup().await;
    source.cleanup().await;

    assert_eq!(mcp.closed_sessions(), 1);
    assert_eq!(source.state(), ActorState::Closed);
}

// =============================================================================
// CoinGecko: Payloads and Status Mapping
// =============================================================================

#[tokio::test]
async fn when_coingecko_returns_a_simple_price_system_parses_it() {
    // Given: CoinGecko with a demo key and a simple/price payload
    let http = ScriptedHttp::new([Reply::json(json!({
        "bitcoin": { "usd": 45000.5, "last_updated_at": 1_704_067_200 }
    }))]);
    let source = CoinGeckoSource::new(
        ActorConfig::new("coingecko").with_api_key("cg-demo"),
        http.client(),
    )
    .expect("valid config");
    source.initialize().await.expect("initialization succeeds");

    // When: The BTC/USD price is requested
    let price = source
        .read_price(&crypto("coinbase", "BTC/USD"))
        .await
        .expect("price should parse");

    // Then: The price is returned with an unknown (zero) size
    assert_eq!(price.price(), 45_000.5);
    assert_eq!(price.size(), 0.0);
    assert_eq!(price.timestamp().unix_seconds(), 1_704_067_200);

    // And: The request targeted the coin id and carried the demo key header
    let request = &http.requests()[0];
    assert!(request.url.contains("/simple/price?ids=bitcoin&vs_currencies=usd"));
    assert_eq!(
        request.headers.get("x-cg-demo-api-key").map(String::as_str),
        Some("cg-demo")
    );
}

#[tokio::test]
async fn when_coingecko_answers_with_error_statuses_system_classifies_them() {
    // Given: Four consecutive failure statuses
    let http = ScriptedHttp::new([
        Reply::status(429, "{\"status\":{\"error_code\":429}}"),
        Reply::status(404, "coin not found"),
        Reply::status(503, "upstream maintenance"),
        Reply::status(401, "invalid api key"),
    ]);
    let source = CoinGeckoSource::new(ActorConfig::new("coingecko"), http.client())
        .expect("valid config");
    source.initialize().await.expect("initialization succeeds");
    let context = crypto("coinbase", "ETH/USD");

    // When: Four prices are requested
    let mut kinds = Vec::new();
    for _ in 0..4 {
        let error = source.read_price(&context).await.expect_err("status fails");
        kinds.push(error.kind());
    }

    // Then: Each status maps to its error kind
    assert_eq!(
        kinds,
        vec![
            DslErrorKind::RateLimited,
            DslErrorKind::NotFound,
            DslErrorKind::NetworkError,
            DslErrorKind::InvalidResponse,
        ]
    );
}

#[tokio::test]
async fn when_coingecko_returns_garbage_system_reports_invalid_response() {
    let http = ScriptedHttp::new([Reply::Respond(
        marketdsl_core::http_client::HttpResponse::ok_json("<html>cloudflare</html>"),
    )]);
    let source = CoinGeckoSource::new(ActorConfig::new("coingecko"), http.client())
        .expect("valid config");
    source.initialize().await.expect("initialization succeeds");

    let error = source
        .read_price(&crypto("coinbase", "BTC/USD"))
        .await
        .expect_err("html is not json");

    assert_eq!(error.kind(), DslErrorKind::InvalidResponse);
}

#[tokio::test]
async fn when_coingecko_history_has_duplicates_system_returns_one_point_per_timestamp() {
    // Given: A market chart with a repeated point and reversed order
    let http = ScriptedHttp::new([Reply::json(json!({
        "prices": [
            [1_704_074_400_000_i64, 42_100.0],
            [1_704_067_200_000_i64, 42_000.0],
            [1_704_074_400_000_i64, 42_100.0]
        ]
    }))]);
    let source = CoinGeckoSource::new(ActorConfig::new("coingecko"), http.client())
        .expect("valid config");
    source.initialize().await.expect("initialization succeeds");

    // When: Historical prices are requested
    let prices = source
        .read_historical_prices(
            &crypto("coinbase", "BTC/USD"),
            range("2024-01-01T00:00:00Z", "2024-01-02T00:00:00Z"),
        )
        .await
        .expect("chart should parse");

    // Then: Points are ascending and unique
    let values = prices.iter().map(|price| price.price()).collect::<Vec<_>>();
    assert_eq!(values, vec![42_000.0, 42_100.0]);
    assert!(http.last_url().contains("/coins/bitcoin/market_chart/range?vs_currency=usd"));
}

// =============================================================================
// Timeouts
// =============================================================================

#[tokio::test]
async fn when_provider_hangs_system_gives_up_with_a_network_error() {
    // Given: A provider that never answers and a short actor timeout
    let http = ScriptedHttp::new([Reply::Hang]);
    let source = CoinGeckoSource::new(
        ActorConfig::new("coingecko").with_timeout_ms(50),
        http.client(),
    )
    .expect("valid config");
    source.initialize().await.expect("initialization succeeds");

    // When: A price is requested
    let started = std::time::Instant::now();
    let error = source
        .read_price(&crypto("coinbase", "BTC/USD"))
        .await
        .expect_err("hung call times out");

    // Then: The call is abandoned promptly as a retryable network error
    assert_eq!(error.kind(), DslErrorKind::NetworkError);
    assert!(error.retryable());
    assert!(error.message().contains("timed out"));
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
}

#[tokio::test]
async fn when_connection_is_refused_system_reports_a_network_error() {
    let http = ScriptedHttp::new([Reply::Fail(HttpError::connect("connection refused"))]);
    let source = CoinGeckoSource::new(ActorConfig::new("coingecko"), http.client())
        .expect("valid config");
    source.initialize().await.expect("initialization succeeds");

    let error = source
        .read_price(&crypto("coinbase", "BTC/USD"))
        .await
        .expect_err("refused");

    assert_eq!(error.kind(), DslErrorKind::NetworkError);
}

// =============================================================================
// TwelveData: In-Band Errors and Series
// =============================================================================

fn twelvedata(http: &std::sync::Arc<ScriptedHttp>) -> TwelveDataSource {
    TwelveDataSource::new(
        ActorConfig::new("twelvedata").with_api_key("td-key"),
        http.client(),
    )
    .expect("valid config")
}

#[tokio::test]
async fn when_twelvedata_reports_an_error_in_a_200_body_system_classifies_it() {
    // Given: A 200 response whose body says the credits ran out
    let http = ScriptedHttp::new([Reply::json(json!({
        "code": 429,
        "message": "You have run out of API credits for the current minute.",
        "status": "error"
    }))]);
    let source = twelvedata(&http);
    source.initialize().await.expect("initialization succeeds");

    // When: A price is requested
    let error = source
        .read_price(&crypto("coinbase", "BTC/USD"))
        .await
        .expect_err("in-band error");

    // Then: It is treated exactly like an HTTP 429
    assert_eq!(error.kind(), DslErrorKind::RateLimited);
    assert!(http.last_url().contains("apikey=td-key"));
}

#[tokio::test]
async fn when_twelvedata_returns_a_time_series_system_orders_it_ascending() {
    // Given: A time series in provider (descending) order
    let http = ScriptedHttp::new([Reply::json(json!({
        "meta": { "symbol": "BTC/USD", "interval": "1h" },
        "values": [
            { "datetime": "2024-01-01 02:00:00", "open": "3", "high": "4", "low": "2", "close": "3.5", "volume": "10" },
            { "datetime": "2024-01-01 01:00:00", "open": "2", "high": "3", "low": "1", "close": "3", "volume": "11" },
            { "datetime": "2024-01-01 00:00:00", "open": "1", "high": "2", "low": "1", "close": "2" }
        ],
        "status": "ok"
    }))]);
    let source = twelvedata(&http);
    source.initialize().await.expect("initialization succeeds");

    // When: Hourly candles are requested
    let candles = source
        .read_historical_ohlcv(
            &crypto("coinbase", "BTC/USD"),
            range("2024-01-01T00:00:00Z", "2024-01-01T03:00:00Z"),
            Timeframe::OneHour,
        )
        .await
        .expect("series should parse");

    // Then: Candles are ascending, and a missing volume is zero
    let closes = candles.iter().map(|candle| candle.close()).collect::<Vec<_>>();
    assert_eq!(closes, vec![2.0, 3.0, 3.5]);
    assert_eq!(candles[0].volume(), 0.0);
    let url = http.last_url();
    assert!(url.contains("/time_series?symbol=BTC%2FUSD&interval=1h"));
}

#[tokio::test]
async fn when_twelvedata_is_asked_for_level1_system_refuses_locally() {
    let http = ScriptedHttp::silent();
    let source = twelvedata(&http);
    source.initialize().await.expect("initialization succeeds");

    let error = source
        .read_level1(&crypto("coinbase", "BTC/USD"))
        .await
        .expect_err("no level1");

    assert_eq!(error.kind(), DslErrorKind::UnsupportedOperation);
    assert_eq!(http.calls(), 0);
}

// =============================================================================
// Alpha Vantage: Daily Data Only
// =============================================================================

fn alphavantage(http: &std::sync::Arc<ScriptedHttp>) -> AlphaVantageSource {
    AlphaVantageSource::new(
        ActorConfig::new("alphavantage").with_api_key("av-key"),
        http.client(),
    )
    .expect("valid config")
}

#[tokio::test]
async fn when_alphavantage_is_asked_for_intraday_history_system_refuses_without_calling() {
    // Given: Alpha Vantage, which only serves daily history
    let http = ScriptedHttp::silent();
    let source = alphavantage(&http);
    source.initialize().await.expect("initialization succeeds");

    // When: Hourly candles are requested
    let error = source
        .read_historical_ohlcv(
            &crypto("coinbase", "BTC/USD"),
            range("2024-01-01T00:00:00Z", "2024-01-02T00:00:00Z"),
            Timeframe::OneHour,
        )
        .await
        .expect_err("intraday unsupported");

    // Then: The interval is rejected before any request
    assert_eq!(error.kind(), DslErrorKind::UnsupportedOperation);
    assert_eq!(http.calls(), 0);
}

#[tokio::test]
async fn when_alphavantage_throttles_system_reports_rate_limiting() {
    let http = ScriptedHttp::new([Reply::json(json!({
        "Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."
    }))]);
    let source = alphavantage(&http);
    source.initialize().await.expect("initialization succeeds");

    let error = source
        .read_price(&crypto("coinbase", "BTC/USD"))
        .await
        .expect_err("throttled");

    assert_eq!(error.kind(), DslErrorKind::RateLimited);
}

#[tokio::test]
async fn when_alphavantage_quotes_an_exchange_rate_system_builds_level1() {
    // Given: An exchange-rate block with both sides
    let http = ScriptedHttp::new([Reply::json(json!({
        "Realtime Currency Exchange Rate": {
            "1. From_Currency Code": "EUR",
            "3. To_Currency Code": "USD",
            "5. Exchange Rate": "1.09500000",
            "6. Last Refreshed": "2024-01-01 00:00:00",
            "7. Time Zone": "UTC",
            "8. Bid Price": "1.09490000",
            "9. Ask Price": "1.09510000"
        }
    }))]);
    let source = alphavantage(&http);
    source.initialize().await.expect("initialization succeeds");

    // When: Level 1 for EUR/USD is requested
    let level1 = source
        .read_level1(&support::context(
            "oanda",
            "EUR/USD",
            marketdsl_core::AssetClass::Forex,
        ))
        .await
        .expect("exchange rate should parse");

    // Then: Bid and ask are populated and the mid sits between them
    assert_eq!(level1.bid().map(|level| level.price()), Some(1.0949));
    assert_eq!(level1.ask().map(|level| level.price()), Some(1.0951));
    assert_eq!(level1.timestamp(), ts("2024-01-01T00:00:00Z"));
    assert!(http.last_url().contains("function=CURRENCY_EXCHANGE_RATE"));
}

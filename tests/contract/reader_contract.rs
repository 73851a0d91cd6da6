//! Contract tests every source actor must satisfy.
//!
//! Capabilities are checked against actual behavior: an operation a source
//! does not declare must fail with `UnsupportedOperation` before any
//! transport call, and a declared one must reach the transport.

#[path = "../support/mod.rs"]
mod support;

use marketdsl_core::sources::{AlphaVantageSource, CcxtSource, CoinGeckoSource, TwelveDataSource};
use marketdsl_core::{
    Actor, ActorConfig, ActorState, AssetClass, DslErrorKind, DslResult, MarketContext, MarketDataReader,
    ReadOperation, SourceId, Timeframe,
};

use support::{crypto, range, ScriptedHttp, ScriptedMcp};

const MCP_ENDPOINT: &str = "http://127.0.0.1:7010/mcp";

/// A reader plus a counter of the transport calls it has made.
struct Harness {
    reader: Box<dyn MarketDataReader>,
    transport_calls: Box<dyn Fn() -> usize>,
}

fn harness(source: SourceId) -> Harness {
    match source {
        SourceId::CoinGecko => {
            let http = ScriptedHttp::silent();
            let reader = CoinGeckoSource::new(ActorConfig::new("coingecko"), http.client())
                .expect("valid config");
            Harness {
                reader: Box::new(reader),
                transport_calls: Box::new(move || http.calls()),
            }
        }
        SourceId::TwelveData => {
            let http = ScriptedHttp::silent();
            let config = ActorConfig::new("twelvedata").with_api_key("td-key");
            let reader = TwelveDataSource::new(config, http.client()).expect("valid config");
            Harness {
                reader: Box::new(reader),
                transport_calls: Box::new(move || http.calls()),
            }
        }
        SourceId::AlphaVantage => {
            let http = ScriptedHttp::silent();
            let config = ActorConfig::new("alphavantage").with_api_key("av-key");
            let reader = AlphaVantageSource::new(config, http.client()).expect("valid config");
            Harness {
                reader: Box::new(reader),
                transport_calls: Box::new(move || http.calls()),
            }
        }
        SourceId::Ccxt => {
            let mcp = ScriptedMcp::new([]);
            let config = ActorConfig::new("ccxt").with_connection_string(MCP_ENDPOINT);
            let reader = CcxtSource::new(config, mcp.connector()).expect("valid config");
            Harness {
                reader: Box::new(reader),
                transport_calls: Box::new(move || mcp.tool_calls()),
            }
        }
    }
}

async fn invoke(
    reader: &dyn MarketDataReader,
    operation: ReadOperation,
    context: &MarketContext,
) -> DslResult<()> {
    let window = range("2024-01-01T00:00:00Z", "2024-01-02T00:00:00Z");
    match operation {
        ReadOperation::Price => reader.read_price(context).await.map(drop),
        ReadOperation::Ohlcv => reader.read_ohlcv(context).await.map(drop),
        ReadOperation::Level1 => reader.read_level1(context).await.map(drop),
        ReadOperation::HistoricalPrices => {
            reader.read_historical_prices(context, window).await.map(drop)
        }
        ReadOperation::HistoricalOhlcv => reader
            .read_historical_ohlcv(context, window, Timeframe::OneDay)
            .await
            .map(drop),
        ReadOperation::HistoricalLevel1 => {
            reader.read_historical_level1(context, window).await.map(drop)
        }
    }
}

// =============================================================================
// Contract: Capability Honesty
// =============================================================================

#[tokio::test]
async fn undeclared_operations_fail_without_touching_the_transport() {
    for source in SourceId::ALL {
        // Given: An initialized source and a market it can translate
        let harness = harness(source);
        harness.reader.initialize().await.expect("initialization succeeds");
        let context = crypto("coinbase", "BTC/USD");
        let capabilities = harness.reader.capabilities();

        for operation in ReadOperation::ALL {
            if capabilities.supports(operation) {
                continue;
            }

            // When: The caller invokes an operation the source never declared
            let error = invoke(harness.reader.as_ref(), operation, &context)
                .await
                .expect_err("undeclared operation must fail");

            // Then: The failure is UnsupportedOperation and nothing was sent
            assert_eq!(
                error.kind(),
                DslErrorKind::UnsupportedOperation,
                "{source} {operation}"
            );
        }
        assert_eq!((harness.transport_calls)(), 0, "{source} sent a request");
    }
}

#[tokio::test]
async fn declared_operations_reach_the_transport() {
    for source in SourceId::ALL {
        // Given: An initialized source whose transport has nothing scripted
        let harness = harness(source);
        harness.reader.initialize().await.expect("initialization succeeds");
        let context = crypto("coinbase", "BTC/USD");

        for operation in harness.reader.capabilities().operations().iter().copied() {
            // When: A declared operation is invoked
            let before = (harness.transport_calls)();
            let outcome = invoke(harness.reader.as_ref(), operation, &context).await;

            // Then: It is attempted, never rejected as unsupported
            if let Err(error) = outcome {
                assert_ne!(
                    error.kind(),
                    DslErrorKind::UnsupportedOperation,
                    "{source} declared {operation} but refused it"
                );
            }
            assert_eq!(
                (harness.transport_calls)(),
                before + 1,
                "{source} {operation} should make exactly one transport call"
            );
        }
    }
}

#[test]
fn constructed_readers_report_their_declared_capabilities() {
    for source in SourceId::ALL {
        let harness = harness(source);
        assert_eq!(harness.reader.source(), source);
        assert_eq!(
            harness.reader.capabilities(),
            marketdsl_core::sources::declared_capabilities(source)
        );
    }
}

// =============================================================================
// Contract: Fail-Fast Validation
// =============================================================================

#[tokio::test]
async fn reads_before_initialize_are_not_ready() {
    for source in SourceId::ALL {
        // Given: A freshly constructed source
        let harness = harness(source);
        assert_eq!(harness.reader.state(), ActorState::Uninitialized);

        // When: A read is attempted without initializing
        let error = harness
            .reader
            .read_price(&crypto("coinbase", "BTC/USD"))
            .await
            .expect_err("must not be ready");

        // Then: NotReady, and nothing was sent
        assert_eq!(error.kind(), DslErrorKind::NotReady, "{source}");
        assert_eq!((harness.transport_calls)(), 0);
    }
}

#[tokio::test]
async fn reads_after_cleanup_are_not_ready() {
    for source in SourceId::ALL {
        // Given: A source that was initialized and then cleaned up
        let harness = harness(source);
        harness.reader.initialize().await.expect("initialization succeeds");
        harness.reader.cleanup().await;

        // When: A read is attempted
        let error = harness
            .reader
            .read_price(&crypto("coinbase", "BTC/USD"))
            .await
            .expect_err("closed actor must reject");

        // Then: NotReady
        assert_eq!(error.kind(), DslErrorKind::NotReady, "{source}");
        assert_eq!(harness.reader.state(), ActorState::Closed);
    }
}

#[tokio::test]
async fn asset_classes_outside_the_declaration_are_invalid_symbols() {
    for source in SourceId::ALL {
        let harness = harness(source);
        harness.reader.initialize().await.expect("initialization succeeds");
        let capabilities = harness.reader.capabilities();

        for asset_class in AssetClass::ALL {
            if capabilities.accepts(asset_class) {
                continue;
            }

            // Given: A market of an asset class the source does not serve
            let context = support::context("coinbase", "ABC/USD", asset_class);

            // When: Its price is requested
            let error = harness
                .reader
                .read_price(&context)
                .await
                .expect_err("asset class must be refused");

            // Then: InvalidSymbol, decided locally
            assert_eq!(
                error.kind(),
                DslErrorKind::InvalidSymbol,
                "{source} {asset_class}"
            );
        }
        assert_eq!((harness.transport_calls)(), 0, "{source} sent a request");
    }
}

#[tokio::test]
async fn coingecko_refuses_tickers_without_a_coin_id() {
    // Given: CoinGecko and a ticker missing from its coin table
    let harness = harness(SourceId::CoinGecko);
    harness.reader.initialize().await.expect("initialization succeeds");

    // When: The price is requested
    let error = harness
        .reader
        .read_price(&crypto("coinbase", "NOPE/USD"))
        .await
        .expect_err("unknown coin");

    // Then: The symbol is invalid and no request was made
    assert_eq!(error.kind(), DslErrorKind::InvalidSymbol);
    assert!(error.message().contains("NOPE"));
    assert_eq!((harness.transport_calls)(), 0);
}

#[tokio::test]
async fn ccxt_refuses_unmapped_exchanges() {
    // Given: A CCXT source and an exchange it has no mapping for
    let mcp = ScriptedMcp::new([]);
    let reader = CcxtSource::new(
        ActorConfig::new("ccxt").with_connection_string(MCP_ENDPOINT),
        mcp.connector(),
    )
    .expect("valid config");
    reader.initialize().await.expect("session opens");

    // When: Level 1 data is requested
    let error = reader
        .read_level1(&crypto("mtgox", "BTC/USD"))
        .await
        .expect_err("unmapped exchange");

    // Then: InvalidSymbol, and no tool was called
    assert_eq!(error.kind(), DslErrorKind::InvalidSymbol);
    assert_eq!(mcp.tool_calls(), 0);
}

#[test]
fn keyed_sources_refuse_construction_without_credentials() {
    let http = ScriptedHttp::silent();

    assert!(TwelveDataSource::new(ActorConfig::new("twelvedata"), http.client()).is_err());
    assert!(AlphaVantageSource::new(ActorConfig::new("alphavantage"), http.client()).is_err());
    assert!(CcxtSource::new(ActorConfig::new("ccxt"), ScriptedMcp::new([]).connector()).is_err());
    assert!(CoinGeckoSource::new(ActorConfig::new("coingecko"), http.client()).is_ok());
}

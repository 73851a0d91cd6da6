//! Reader and writer contracts implemented by every actor.
//!
//! | Trait | Implemented by |
//! |-------|----------------|
//! | [`Actor`] | every source and target |
//! | [`MarketDataReader`] | CoinGecko, TwelveData, CCXT, Alpha Vantage sources |
//! | [`MarketDataWriter`] | time-series and stream targets |
//!
//! Expected failures never panic: each method resolves to a [`DslResult`].
//! Futures are boxed so the traits stay object safe and can be shared as
//! `Arc<dyn MarketDataReader>`.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::{
    ActorState, AssetClass, DslError, DslResult, Level1, MarketContext, Ohlcv, Price, SinkId,
    SourceId, TimeInterval, Timeframe,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type ActorFuture<'a, T> = BoxFuture<'a, DslResult<T>>;

/// Reader operation used for capability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadOperation {
    Price,
    Ohlcv,
    Level1,
    HistoricalPrices,
    HistoricalOhlcv,
    HistoricalLevel1,
}

impl ReadOperation {
    pub const ALL: [Self; 6] = [
        Self::Price,
        Self::Ohlcv,
        Self::Level1,
        Self::HistoricalPrices,
        Self::HistoricalOhlcv,
        Self::HistoricalLevel1,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Ohlcv => "ohlcv",
            Self::Level1 => "level1",
            Self::HistoricalPrices => "historical_prices",
            Self::HistoricalOhlcv => "historical_ohlcv",
            Self::HistoricalLevel1 => "historical_level1",
        }
    }
}

impl Display for ReadOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared operations and accepted asset classes of a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadCapabilities {
    operations: &'static [ReadOperation],
    asset_classes: &'static [AssetClass],
}

impl ReadCapabilities {
    pub const fn new(
        operations: &'static [ReadOperation],
        asset_classes: &'static [AssetClass],
    ) -> Self {
        Self {
            operations,
            asset_classes,
        }
    }

    pub fn supports(&self, operation: ReadOperation) -> bool {
        self.operations.contains(&operation)
    }

    pub fn accepts(&self, asset_class: AssetClass) -> bool {
        self.asset_classes.contains(&asset_class)
    }

    pub const fn operations(&self) -> &'static [ReadOperation] {
        self.operations
    }

    pub const fn asset_classes(&self) -> &'static [AssetClass] {
        self.asset_classes
    }
}

/// Shared lifecycle surface.
pub trait Actor: Send + Sync {
    fn name(&self) -> &str;

    fn state(&self) -> ActorState;

    /// Acquires the connection handle. A failure is terminal for this instance.
    fn initialize(&self) -> ActorFuture<'_, ()>;

    /// Releases the connection handle. Safe to call in any state, any number of times.
    fn cleanup(&self) -> BoxFuture<'_, ()>;
}

/// Source-side contract.
pub trait MarketDataReader: Actor {
    fn source(&self) -> SourceId;

    fn capabilities(&self) -> ReadCapabilities;

    fn read_price<'a>(&'a self, context: &'a MarketContext) -> ActorFuture<'a, Price>;

    fn read_ohlcv<'a>(&'a self, context: &'a MarketContext) -> ActorFuture<'a, Ohlcv>;

    fn read_level1<'a>(&'a self, context: &'a MarketContext) -> ActorFuture<'a, Level1>;

    /// Ascending by timestamp, restricted to `range`.
    fn read_historical_prices<'a>(
        &'a self,
        context: &'a MarketContext,
        range: TimeInterval,
    ) -> ActorFuture<'a, Vec<Price>>;

    /// Ascending by timestamp, restricted to `range`.
    fn read_historical_ohlcv<'a>(
        &'a self,
        context: &'a MarketContext,
        range: TimeInterval,
        timeframe: Timeframe,
    ) -> ActorFuture<'a, Vec<Ohlcv>>;

    fn read_historical_level1<'a>(
        &'a self,
        context: &'a MarketContext,
        range: TimeInterval,
    ) -> ActorFuture<'a, Vec<Level1>>;
}

/// Outcome of one item of a write, matched to its input position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DslError>,
}

impl ItemOutcome {
    pub const fn written(index: usize) -> Self {
        Self { index, error: None }
    }

    pub const fn failed(index: usize, error: DslError) -> Self {
        Self {
            index,
            error: Some(error),
        }
    }

    pub const fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-item report of a best-effort write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishResult {
    outcomes: Vec<ItemOutcome>,
}

impl PublishResult {
    pub fn from_results(results: Vec<DslResult<()>>) -> Self {
        let outcomes = results
            .into_iter()
            .enumerate()
            .map(|(index, result)| match result {
                Ok(()) => ItemOutcome::written(index),
                Err(error) => ItemOutcome::failed(index, error),
            })
            .collect();
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &[ItemOutcome] {
        &self.outcomes
    }

    pub fn written(&self) -> usize {
        self.outcomes.iter().filter(|item| item.succeeded()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|item| !item.succeeded())
    }

    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(ItemOutcome::succeeded)
    }

    /// Converts a one-item report into an error if that item failed.
    pub fn into_single(self) -> DslResult<Self> {
        if let Some(error) = self.outcomes.iter().find_map(|item| item.error.clone()) {
            return Err(error);
        }
        Ok(self)
    }
}

/// Sink-side contract.
///
/// Batches are best effort: one item failing never aborts the others, and the
/// returned outcomes line up positionally with the input slice.
pub trait MarketDataWriter: Actor {
    fn sink(&self) -> SinkId;

    fn publish_prices<'a>(
        &'a self,
        context: &'a MarketContext,
        prices: &'a [Price],
    ) -> ActorFuture<'a, PublishResult>;

    fn publish_ohlcvs<'a>(
        &'a self,
        context: &'a MarketContext,
        candles: &'a [Ohlcv],
    ) -> ActorFuture<'a, PublishResult>;

    fn publish_price<'a>(
        &'a self,
        context: &'a MarketContext,
        price: Price,
    ) -> ActorFuture<'a, PublishResult> {
        Box::pin(async move {
            let batch = [price];
            self.publish_prices(context, &batch).await?.into_single()
        })
    }

    fn publish_ohlcv<'a>(
        &'a self,
        context: &'a MarketContext,
        candle: Ohlcv,
    ) -> ActorFuture<'a, PublishResult> {
        Box::pin(async move {
            let batch = [candle];
            self.publish_ohlcvs(context, &batch).await?.into_single()
        })
    }
}

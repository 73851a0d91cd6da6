//! Time-series database target.
//!
//! Rows are keyed by `(exchange, symbol, timestamp)` and written as upserts,
//! so replaying a batch never duplicates data. The store itself is
//! synchronous; batches run on the blocking pool under the actor timeout.

use std::sync::Arc;

use tracing::debug;

use marketdsl_warehouse::{OhlcvRow, PriceRow, Warehouse, WarehouseError};

use crate::contract::{ActorFuture, BoxFuture};
use crate::{
    Actor, ActorBase, ActorConfig, ActorState, DslError, DslResult, MarketContext,
    MarketDataWriter, Ohlcv, Price, PublishResult, SinkId, ValidationError,
};

/// Synchronous upsert surface of a time-series store.
pub trait TimeSeriesStore: Send + Sync {
    fn upsert_price(&self, context: &MarketContext, price: &Price) -> DslResult<()>;

    fn upsert_ohlcv(&self, context: &MarketContext, candle: &Ohlcv) -> DslResult<()>;
}

/// Opens a store from the actor's connection string.
pub trait StoreConnector: Send + Sync {
    fn open(&self, connection_string: String)
        -> BoxFuture<'_, DslResult<Arc<dyn TimeSeriesStore>>>;
}

/// Opens DuckDB-backed stores through [`Warehouse`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DuckDbConnector;

impl StoreConnector for DuckDbConnector {
    fn open(
        &self,
        connection_string: String,
    ) -> BoxFuture<'_, DslResult<Arc<dyn TimeSeriesStore>>> {
        Box::pin(async move {
            let warehouse = tokio::task::spawn_blocking(move || Warehouse::open(&connection_string))
                .await
                .map_err(|e| DslError::network(format!("store open task failed: {e}")))?
                .map_err(|e| DslError::network(format!("cannot open time-series store: {e}")))?;

            let store: Arc<dyn TimeSeriesStore> = Arc::new(DuckDbStore { warehouse });
            Ok(store)
        })
    }
}

struct DuckDbStore {
    warehouse: Warehouse,
}

impl TimeSeriesStore for DuckDbStore {
    fn upsert_price(&self, context: &MarketContext, price: &Price) -> DslResult<()> {
        let row = PriceRow {
            exchange: context.exchange().id().to_owned(),
            symbol: series_symbol(context),
            ts_ms: price.timestamp().unix_millis(),
            price: price.price(),
            size: price.size(),
        };
        self.warehouse.upsert_price(&row).map_err(store_error)
    }

    fn upsert_ohlcv(&self, context: &MarketContext, candle: &Ohlcv) -> DslResult<()> {
        let row = OhlcvRow {
            exchange: context.exchange().id().to_owned(),
            symbol: series_symbol(context),
            ts_ms: candle.timestamp().unix_millis(),
            open: candle.open(),
            high: candle.high(),
            low: candle.low(),
            close: candle.close(),
            volume: candle.volume(),
        };
        self.warehouse.upsert_ohlcv(&row).map_err(store_error)
    }
}

fn series_symbol(context: &MarketContext) -> String {
    context.symbol().series_symbol()
}

fn store_error(error: WarehouseError) -> DslError {
    match error {
        WarehouseError::Io(error) => DslError::network(format!("store i/o failed: {error}")),
        other => DslError::rejected(format!("store rejected row: {other}")),
    }
}

type StoreHandle = Arc<dyn TimeSeriesStore>;

/// Writer persisting prices and candles into a time-series store.
pub struct TimeSeriesWriter {
    base: ActorBase<StoreHandle>,
    connector: Arc<dyn StoreConnector>,
}

impl TimeSeriesWriter {
    /// `connection_string` names the store, e.g. a DuckDB file path.
    pub fn new(
        config: ActorConfig,
        connector: Arc<dyn StoreConnector>,
    ) -> Result<Self, ValidationError> {
        config.require_connection_string()?;
        Ok(Self {
            base: ActorBase::new(config)?,
            connector,
        })
    }

    pub fn duckdb(config: ActorConfig) -> Result<Self, ValidationError> {
        Self::new(config, Arc::new(DuckDbConnector))
    }

    async fn connect(&self) -> DslResult<StoreHandle> {
        let connection_string = self.base.config().require_connection_string()?.to_owned();
        self.connector.open(connection_string).await
    }

    async fn write_batch<T, F>(
        &self,
        operation: &str,
        context: &MarketContext,
        items: &[T],
        upsert: F,
    ) -> DslResult<PublishResult>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(&dyn TimeSeriesStore, &MarketContext, &T) -> DslResult<()> + Send + 'static,
    {
        let store = self.base.ready()?;
        if items.is_empty() {
            return Ok(PublishResult::default());
        }

        let store = Arc::clone(&*store);
        let context = context.clone();
        let items = items.to_vec();
        let results = self
            .base
            .bounded(operation, async move {
                // A timed-out batch may still land; upserts make the late write a no-op on replay.
                tokio::task::spawn_blocking(move || {
                    items
                        .iter()
                        .map(|item| upsert(&*store, &context, item))
                        .collect::<Vec<_>>()
                })
                .await
                .map_err(|e| DslError::network(format!("store task failed: {e}")))
            })
            .await?;

        let result = PublishResult::from_results(results);
        debug!(
            actor = %self.base.name(),
            operation,
            written = result.written(),
            failed = result.outcomes().len() - result.written(),
            "batch stored"
        );
        Ok(result)
    }
}

impl Actor for TimeSeriesWriter {
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

impl MarketDataWriter for TimeSeriesWriter {
    fn sink(&self) -> SinkId {
        SinkId::TimeSeries
    }

    fn publish_prices<'a>(
        &'a self,
        context: &'a MarketContext,
        prices: &'a [Price],
    ) -> ActorFuture<'a, PublishResult> {
        Box::pin(self.write_batch("upsert_prices", context, prices, |store, context, price| {
            store.upsert_price(context, price)
        }))
    }

    fn publish_ohlcvs<'a>(
        &'a self,
        context: &'a MarketContext,
        candles: &'a [Ohlcv],
    ) -> ActorFuture<'a, PublishResult> {
        Box::pin(self.write_batch("upsert_ohlcv", context, candles, |store, context, candle| {
            store.upsert_ohlcv(context, candle)
        }))
    }
}

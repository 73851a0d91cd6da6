//! Ordered fallback across registered readers.
//!
//! The router is a caller-side convenience: each reader still answers one
//! call with one result, and the router only decides which reader to ask next
//! when the previous one failed. Readers that do not declare the operation or
//! the asset class are skipped without a call.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::contract::ActorFuture;
use crate::envelope::EnvelopeError;
use crate::retry::RetryPolicy;
use crate::{
    DslError, Level1, MarketContext, MarketDataReader, Ohlcv, Price, ReadOperation, SourceId,
    TimeInterval, Timeframe,
};

/// Which readers a routed call may use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStrategy {
    /// Every registered reader, in registration order.
    Auto,
    /// The listed readers first, then the remaining registered ones.
    Priority(Vec<SourceId>),
    /// Only this reader; its failure is final.
    Strict(SourceId),
}

impl SourceStrategy {
    fn is_strict(&self) -> bool {
        matches!(self, Self::Strict(_))
    }
}

#[derive(Debug, Clone)]
pub struct RouteSuccess<T> {
    pub data: T,
    pub selected_source: SourceId,
    pub source_chain: Vec<SourceId>,
    pub warnings: Vec<String>,
    pub errors: Vec<EnvelopeError>,
    pub latency_ms: u64,
}

/// Every candidate failed or was skipped. `source_chain` is empty when the
/// router had no candidate at all.
#[derive(Debug, Clone)]
pub struct RouteFailure {
    pub source_chain: Vec<SourceId>,
    pub warnings: Vec<String>,
    pub errors: Vec<EnvelopeError>,
    pub latency_ms: u64,
}

pub type RouteResult<T> = Result<RouteSuccess<T>, RouteFailure>;

pub struct ReaderRouter {
    readers: Vec<Arc<dyn MarketDataReader>>,
    retry: RetryPolicy,
}

impl ReaderRouter {
    /// Later registrations of an already registered source are ignored.
    pub fn new(readers: Vec<Arc<dyn MarketDataReader>>) -> Self {
        let mut unique: Vec<Arc<dyn MarketDataReader>> = Vec::with_capacity(readers.len());
        for reader in readers {
            if unique.iter().all(|known| known.source() != reader.source()) {
                unique.push(reader);
            }
        }

        Self {
            readers: unique,
            retry: RetryPolicy::no_retry(),
        }
    }

    /// Applies `retry` to each reader call before falling back to the next reader.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn readers(&self) -> &[Arc<dyn MarketDataReader>] {
        &self.readers
    }

    pub fn reader(&self, source: SourceId) -> Option<&Arc<dyn MarketDataReader>> {
        self.readers.iter().find(|reader| reader.source() == source)
    }

    pub fn sources(&self) -> Vec<SourceId> {
        self.readers.iter().map(|reader| reader.source()).collect()
    }

    fn plan(&self, strategy: &SourceStrategy) -> Vec<SourceId> {
        match strategy {
            SourceStrategy::Auto => self.sources(),
            SourceStrategy::Strict(source) => vec![*source],
            SourceStrategy::Priority(preferred) => {
                let mut plan = Vec::with_capacity(self.readers.len());
                for source in preferred.iter().copied().chain(self.sources()) {
                    if !plan.contains(&source) {
                        plan.push(source);
                    }
                }
                plan
            }
        }
    }

    pub async fn price(
        &self,
        context: &MarketContext,
        strategy: SourceStrategy,
    ) -> RouteResult<Price> {
        self.route(ReadOperation::Price, context, strategy, |reader, context| {
            Box::pin(async move { reader.read_price(&context).await })
        })
        .await
    }

    pub async fn ohlcv(
        &self,
        context: &MarketContext,
        strategy: SourceStrategy,
    ) -> RouteResult<Ohlcv> {
        self.route(ReadOperation::Ohlcv, context, strategy, |reader, context| {
            Box::pin(async move { reader.read_ohlcv(&context).await })
        })
        .await
    }

    pub async fn level1(
        &self,
        context: &MarketContext,
        strategy: SourceStrategy,
    ) -> RouteResult<Level1> {
        self.route(ReadOperation::Level1, context, strategy, |reader, context| {
            Box::pin(async move { reader.read_level1(&context).await })
        })
        .await
    }

    pub async fn historical_prices(
        &self,
        context: &MarketContext,
        range: TimeInterval,
        strategy: SourceStrategy,
    ) -> RouteResult<Vec<Price>> {
        self.route(
            ReadOperation::HistoricalPrices,
            context,
            strategy,
            move |reader, context| {
                Box::pin(async move { reader.read_historical_prices(&context, range).await })
            },
        )
        .await
    }

    pub async fn historical_ohlcv(
        &self,
        context: &MarketContext,
        range: TimeInterval,
        timeframe: Timeframe,
        strategy: SourceStrategy,
    ) -> RouteResult<Vec<Ohlcv>> {
        self.route(
            ReadOperation::HistoricalOhlcv,
            context,
            strategy,
            move |reader, context| {
                Box::pin(async move {
                    reader
                        .read_historical_ohlcv(&context, range, timeframe)
                        .await
                })
            },
        )
        .await
    }

    pub async fn historical_level1(
        &self,
        context: &MarketContext,
        range: TimeInterval,
        strategy: SourceStrategy,
    ) -> RouteResult<Vec<Level1>> {
        self.route(
            ReadOperation::HistoricalLevel1,
            context,
            strategy,
            move |reader, context| {
                Box::pin(async move { reader.read_historical_level1(&context, range).await })
            },
        )
        .await
    }

    /// Tries each planned reader until one succeeds. `invoke` receives an
    /// owned copy of `context` per attempt.
    pub async fn route<T, F>(
        &self,
        operation: ReadOperation,
        context: &MarketContext,
        strategy: SourceStrategy,
        mut invoke: F,
    ) -> RouteResult<T>
    where
        F: for<'a> FnMut(&'a dyn MarketDataReader, MarketContext) -> ActorFuture<'a, T>,
    {
        let started = Instant::now();
        let asset_class = context.symbol().asset_class();
        let mut source_chain = Vec::new();
        let mut errors = Vec::new();

        for source in self.plan(&strategy) {
            source_chain.push(source);

            let Some(reader) = self.reader(source) else {
                errors.push(route_error(
                    source,
                    "route.source_not_registered",
                    format!("source '{source}' is not registered"),
                ));
                if strategy.is_strict() {
                    break;
                }
                continue;
            };

            let capabilities = reader.capabilities();
            let skipped = if !capabilities.supports(operation) {
                Some(DslError::unsupported(operation, reader.name()))
            } else if !capabilities.accepts(asset_class) {
                Some(DslError::invalid_symbol(format!(
                    "{}: asset class '{asset_class}' is not served",
                    reader.name()
                )))
            } else {
                None
            };
            if let Some(error) = skipped {
                debug!(
                    source = %source,
                    operation = %operation,
                    "skipping source: {}",
                    error.message()
                );
                errors.push(EnvelopeError::from_dsl(Some(source), &error));
                if strategy.is_strict() {
                    break;
                }
                continue;
            }

            let reader = reader.as_ref();
            let outcome = self
                .retry
                .run(|| invoke(reader, context.clone()))
                .await;
            match outcome {
                Ok(data) => {
                    let mut warnings = Vec::new();
                    if !errors.is_empty() {
                        warnings.push(format!(
                            "source fallback succeeded with '{source}' after {} failed attempt(s)",
                            errors.len()
                        ));
                    }

                    return Ok(RouteSuccess {
                        data,
                        selected_source: source,
                        source_chain,
                        warnings,
                        errors,
                        latency_ms: elapsed_ms(started),
                    });
                }
                Err(error) => {
                    warn!(
                        source = %source,
                        operation = %operation,
                        code = error.code(),
                        "source failed: {}",
                        error.message()
                    );
                    errors.push(EnvelopeError::from_dsl(Some(source), &error));
                    if strategy.is_strict() {
                        break;
                    }
                }
            }
        }

        if source_chain.is_empty() {
            errors.push(EnvelopeError {
                code: String::from("route.no_candidate"),
                message: format!("no source registered for operation '{operation}'"),
                retryable: Some(false),
                source: None,
            });
        }

        Err(RouteFailure {
            source_chain,
            warnings: vec![format!("all sources failed for operation '{operation}'")],
            errors,
            latency_ms: elapsed_ms(started),
        })
    }
}

fn route_error(source: SourceId, code: &str, message: String) -> EnvelopeError {
    EnvelopeError {
        code: code.to_owned(),
        message,
        retryable: Some(false),
        source: Some(source),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

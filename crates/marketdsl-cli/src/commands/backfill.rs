//! Reads one historical window and publishes it to a sink.
//!
//! The read goes through the router like `history`; the write is a single
//! batch whose per-item failures are reported as envelope errors.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use marketdsl_core::http_client::HttpClient;
use marketdsl_core::targets::{StreamWriter, TimeSeriesWriter};
use marketdsl_core::{
    Actor, EnvelopeError, MarketContext, MarketDataWriter, Ohlcv, Price, RouteResult,
    RouteSuccess, SinkId, SourceId, ValidationError,
};

use crate::cli::{BackfillArgs, BackfillSeries, Cli};
use crate::error::CliError;
use crate::settings::Settings;

use super::history::parse_window;
use super::readers::{http_client, OpenReaders};
use super::{market_context, source_strategy, CommandResult};

#[derive(Debug, Serialize)]
struct FailedItem {
    index: usize,
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct BackfillReport {
    source: SourceId,
    sink: SinkId,
    read: usize,
    written: usize,
    failed: Vec<FailedItem>,
}

enum Series {
    Prices(Vec<Price>),
    Ohlcv(Vec<Ohlcv>),
}

impl Series {
    fn len(&self) -> usize {
        match self {
            Self::Prices(prices) => prices.len(),
            Self::Ohlcv(candles) => candles.len(),
        }
    }
}

pub async fn run(
    args: &BackfillArgs,
    cli: &Cli,
    settings: &Settings,
) -> Result<CommandResult, CliError> {
    let context = market_context(cli, &args.pair)?;
    let (range, timeframe) = parse_window(&args.window)?;
    let sink = args.sink.sink_id();
    let http = http_client();
    let writer = build_writer(sink, settings, &http)?;

    let readers = OpenReaders::open(cli, settings, Arc::clone(&http)).await;
    let router = &readers.router;
    let strategy = source_strategy(cli);
    let route = match args.series {
        BackfillSeries::Prices => series(
            router.historical_prices(&context, range, strategy).await,
            Series::Prices,
        ),
        BackfillSeries::Ohlcv => series(
            router
                .historical_ohlcv(&context, range, timeframe, strategy)
                .await,
            Series::Ohlcv,
        ),
    };
    readers.close().await;

    let result = publish(route, writer.as_ref(), &context, sink).await;
    writer.cleanup().await;

    Ok(result?.with_warnings(readers.warnings))
}

fn series<T>(route: RouteResult<Vec<T>>, wrap: fn(Vec<T>) -> Series) -> RouteResult<Series> {
    route.map(|success| RouteSuccess {
        data: wrap(success.data),
        selected_source: success.selected_source,
        source_chain: success.source_chain,
        warnings: success.warnings,
        errors: success.errors,
        latency_ms: success.latency_ms,
    })
}

fn build_writer(
    sink: SinkId,
    settings: &Settings,
    http: &Arc<dyn HttpClient>,
) -> Result<Box<dyn MarketDataWriter>, ValidationError> {
    let config = settings.sink_config(sink);
    let writer: Box<dyn MarketDataWriter> = match sink {
        SinkId::TimeSeries => Box::new(TimeSeriesWriter::duckdb(config)?),
        SinkId::Stream => Box::new(StreamWriter::new(config, Arc::clone(http))?),
    };
    Ok(writer)
}

async fn publish(
    route: RouteResult<Series>,
    writer: &dyn MarketDataWriter,
    context: &MarketContext,
    sink: SinkId,
) -> Result<CommandResult, CliError> {
    let success = match route {
        Ok(success) => success,
        Err(failure) => {
            return Ok(CommandResult::failure(json!({ "backfill": Value::Null }), failure));
        }
    };

    let mut errors = success.errors;
    let read = success.data.len();
    let mut report = BackfillReport {
        source: success.selected_source,
        sink,
        read,
        written: 0,
        failed: Vec::new(),
    };

    let published = match writer.initialize().await {
        Ok(()) => match &success.data {
            Series::Prices(prices) => writer.publish_prices(context, prices).await,
            Series::Ohlcv(candles) => writer.publish_ohlcvs(context, candles).await,
        },
        Err(error) => Err(error),
    };
    match published {
        Ok(outcome) => {
            report.written = outcome.written();
            for item in outcome.failures() {
                if let Some(error) = &item.error {
                    report.failed.push(FailedItem {
                        index: item.index,
                        code: error.code(),
                        message: error.message().to_owned(),
                    });
                    errors.push(EnvelopeError::from_dsl(None, error));
                }
            }
            info!(sink = %sink, read, written = report.written, "backfill published");
        }
        Err(error) => errors.push(EnvelopeError::from_dsl(None, &error)),
    }

    let failed = report.written < read;
    let data = json!({ "backfill": serde_json::to_value(&report)? });
    let mut result = CommandResult::ok(data, success.source_chain)
        .with_errors(errors)
        .with_warnings(success.warnings)
        .with_latency(success.latency_ms);
    result.failed = failed;
    Ok(result)
}

mod backfill;
mod history;
mod readers;
mod snapshot;
mod sources;

use std::str::FromStr;

use serde::Serialize;
use serde_json::{json, Value};

use marketdsl_core::{
    AssetClass, Envelope, EnvelopeError, EnvelopeMeta, Exchange, InstrumentType, MarketContext,
    MarketSymbol, RouteFailure, RouteResult, SourceId, SourceStrategy, ValidationError, VenueType,
};

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::settings::Settings;

pub struct CommandResult {
    pub data: Value,
    /// The requested read or write did not happen.
    pub failed: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<EnvelopeError>,
    pub latency_ms: u64,
    pub source_chain: Vec<SourceId>,
}

impl CommandResult {
    pub fn ok(data: Value, source_chain: Vec<SourceId>) -> Self {
        Self {
            data,
            failed: false,
            warnings: Vec::new(),
            errors: Vec::new(),
            latency_ms: 0,
            source_chain,
        }
    }

    /// Successful routes carry the chosen source next to `key`; failed ones
    /// leave `key` null and report every attempt as an error.
    pub fn from_route<T: Serialize>(route: RouteResult<T>, key: &str) -> Result<Self, CliError> {
        match route {
            Ok(success) => {
                let data = json!({
                    "source": success.selected_source,
                    key: serde_json::to_value(&success.data)?,
                });
                Ok(Self::ok(data, success.source_chain)
                    .with_errors(success.errors)
                    .with_warnings(success.warnings)
                    .with_latency(success.latency_ms))
            }
            Err(failure) => Ok(Self::failure(json!({ key: Value::Null }), failure)),
        }
    }

    pub fn failure(data: Value, failure: RouteFailure) -> Self {
        let mut result = Self::ok(data, failure.source_chain)
            .with_errors(failure.errors)
            .with_warnings(failure.warnings)
            .with_latency(failure.latency_ms);
        result.failed = true;
        result
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn with_errors(mut self, errors: Vec<EnvelopeError>) -> Self {
        self.errors.extend(errors);
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

pub struct CommandOutcome {
    pub envelope: Envelope<Value>,
    pub failed: bool,
}

pub async fn run(cli: &Cli, request_id: &str) -> Result<CommandOutcome, CliError> {
    let settings = Settings::from_env(cli.timeout_ms, cli.debug);

    let command_result = match &cli.command {
        Command::Sources => sources::run(cli, &settings)?,
        Command::Price(args) => {
            let context = market_context(cli, &args.pair)?;
            snapshot::run(snapshot::Snapshot::Price, cli, &settings, &context).await?
        }
        Command::Ohlcv(args) => {
            let context = market_context(cli, &args.pair)?;
            snapshot::run(snapshot::Snapshot::Ohlcv, cli, &settings, &context).await?
        }
        Command::Level1(args) => {
            let context = market_context(cli, &args.pair)?;
            snapshot::run(snapshot::Snapshot::Level1, cli, &settings, &context).await?
        }
        Command::History(args) => history::run(args, cli, &settings).await?,
        Command::Backfill(args) => backfill::run(args, cli, &settings).await?,
    };

    let CommandResult {
        data,
        failed,
        warnings,
        errors,
        latency_ms,
        source_chain,
    } = command_result;

    let meta = EnvelopeMeta::new(request_id, source_chain, latency_ms)?.with_warnings(warnings);
    let envelope = Envelope::with_errors(meta, data, errors)?;
    Ok(CommandOutcome { envelope, failed })
}

pub fn source_strategy(cli: &Cli) -> SourceStrategy {
    match cli.source.source_id() {
        Some(source) => SourceStrategy::Strict(source),
        None => SourceStrategy::Auto,
    }
}

/// Builds the addressed market from the pair argument and global flags.
pub fn market_context(cli: &Cli, pair: &str) -> Result<MarketContext, ValidationError> {
    let asset_class = AssetClass::from_str(&cli.asset_class)?;
    let spot = MarketSymbol::parse_pair(pair, asset_class)?;
    let symbol = if cli.derivative {
        MarketSymbol::new(
            spot.ticker(),
            spot.name(),
            asset_class,
            spot.quote_currency(),
            InstrumentType::Derivative,
        )?
    } else {
        spot
    };

    let exchange = Exchange::new(&cli.exchange, &cli.exchange, "", VenueType::Centralized)?;
    Ok(MarketContext::new(exchange, symbol))
}

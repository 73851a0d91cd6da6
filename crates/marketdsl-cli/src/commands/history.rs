use std::str::FromStr;

use marketdsl_core::{TimeInterval, Timeframe};

use crate::cli::{Cli, HistoryArgs, SeriesKind, WindowArgs};
use crate::error::CliError;
use crate::settings::Settings;

use super::readers::{http_client, OpenReaders};
use super::{market_context, source_strategy, CommandResult};

pub async fn run(
    args: &HistoryArgs,
    cli: &Cli,
    settings: &Settings,
) -> Result<CommandResult, CliError> {
    let context = market_context(cli, &args.pair)?;
    let (range, timeframe) = parse_window(&args.window)?;

    let readers = OpenReaders::open(cli, settings, http_client()).await;
    let router = &readers.router;
    let strategy = source_strategy(cli);

    let result = match args.series {
        SeriesKind::Prices => CommandResult::from_route(
            router.historical_prices(&context, range, strategy).await,
            "prices",
        ),
        SeriesKind::Ohlcv => CommandResult::from_route(
            router
                .historical_ohlcv(&context, range, timeframe, strategy)
                .await,
            "ohlcv",
        ),
        SeriesKind::Level1 => CommandResult::from_route(
            router.historical_level1(&context, range, strategy).await,
            "level1",
        ),
    };
    readers.close().await;

    Ok(result?.with_warnings(readers.warnings))
}

/// Validates the window before any source is contacted.
pub fn parse_window(window: &WindowArgs) -> Result<(TimeInterval, Timeframe), CliError> {
    let range = TimeInterval::parse(&window.start, &window.end)?;
    let timeframe = Timeframe::from_str(&window.timeframe)?;
    Ok((range, timeframe))
}

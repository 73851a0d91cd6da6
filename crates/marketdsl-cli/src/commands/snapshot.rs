use marketdsl_core::MarketContext;

use crate::cli::Cli;
use crate::error::CliError;
use crate::settings::Settings;

use super::readers::{http_client, OpenReaders};
use super::{source_strategy, CommandResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Snapshot {
    Price,
    Ohlcv,
    Level1,
}

pub async fn run(
    snapshot: Snapshot,
    cli: &Cli,
    settings: &Settings,
    context: &MarketContext,
) -> Result<CommandResult, CliError> {
    let readers = OpenReaders::open(cli, settings, http_client()).await;
    let strategy = source_strategy(cli);

    let result = match snapshot {
        Snapshot::Price => {
            CommandResult::from_route(readers.router.price(context, strategy).await, "price")
        }
        Snapshot::Ohlcv => {
            CommandResult::from_route(readers.router.ohlcv(context, strategy).await, "ohlcv")
        }
        Snapshot::Level1 => {
            CommandResult::from_route(readers.router.level1(context, strategy).await, "level1")
        }
    };
    readers.close().await;

    Ok(result?.with_warnings(readers.warnings))
}

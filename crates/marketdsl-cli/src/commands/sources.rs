use serde::Serialize;

use marketdsl_core::sources::declared_capabilities;
use marketdsl_core::{AssetClass, ReadOperation, SourceId};

use crate::cli::Cli;
use crate::error::CliError;
use crate::settings::Settings;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct SourceStatus {
    id: SourceId,
    configured: bool,
    selected: bool,
    operations: &'static [ReadOperation],
    asset_classes: &'static [AssetClass],
}

#[derive(Debug, Serialize)]
struct SourcesResponseData {
    sources: Vec<SourceStatus>,
}

/// Declared capabilities only; no source is contacted.
pub fn run(cli: &Cli, settings: &Settings) -> Result<CommandResult, CliError> {
    let selected = cli.source.source_id();
    let sources = SourceId::ALL
        .into_iter()
        .map(|id| {
            let capabilities = declared_capabilities(id);
            SourceStatus {
                id,
                configured: settings.is_configured(id),
                selected: selected.is_none_or(|source| source == id),
                operations: capabilities.operations(),
                asset_classes: capabilities.asset_classes(),
            }
        })
        .collect::<Vec<_>>();

    let warnings = sources
        .iter()
        .filter(|status| status.selected && !status.configured)
        .map(|status| format!("source '{}' is missing its credentials", status.id))
        .collect();

    let data = serde_json::to_value(SourcesResponseData { sources })?;
    Ok(CommandResult::ok(data, SourceId::ALL.to_vec()).with_warnings(warnings))
}

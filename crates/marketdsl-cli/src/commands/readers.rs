use std::sync::Arc;

use tracing::{debug, warn};

use marketdsl_core::http_client::{HttpClient, ReqwestHttpClient};
use marketdsl_core::mcp::HttpMcpConnector;
use marketdsl_core::sources::{AlphaVantageSource, CcxtSource, CoinGeckoSource, TwelveDataSource};
use marketdsl_core::{
    Actor, ActorConfig, MarketDataReader, ReaderRouter, RetryPolicy, SourceId, ValidationError,
};

use crate::cli::Cli;
use crate::settings::Settings;

/// Initialized readers for one command, plus the reasons any were left out.
pub struct OpenReaders {
    pub router: ReaderRouter,
    pub warnings: Vec<String>,
}

impl OpenReaders {
    /// Builds and initializes the selected sources. With `--source auto`,
    /// sources missing their credentials are skipped quietly.
    pub async fn open(cli: &Cli, settings: &Settings, http: Arc<dyn HttpClient>) -> Self {
        let selected = cli.source.source_id();
        let candidates = match selected {
            Some(source) => vec![source],
            None => SourceId::ALL
                .into_iter()
                .filter(|source| settings.is_configured(*source))
                .collect(),
        };

        let mut readers = Vec::with_capacity(candidates.len());
        let mut warnings = Vec::new();
        for source in candidates {
            let reader = match build_reader(source, settings.source_config(source), &http) {
                Ok(reader) => reader,
                Err(error) => {
                    warnings.push(format!("source '{source}' is not configured: {error}"));
                    continue;
                }
            };

            match reader.initialize().await {
                Ok(()) => {
                    debug!(source = %source, "source ready");
                    readers.push(reader);
                }
                Err(error) => {
                    warn!(
                        source = %source,
                        code = error.code(),
                        "source unavailable: {}",
                        error.message()
                    );
                    warnings.push(format!("source '{source}' is unavailable: {error}"));
                }
            }
        }

        let retry = match cli.retries {
            0 => RetryPolicy::no_retry(),
            retries => RetryPolicy::exponential(retries),
        };

        Self {
            router: ReaderRouter::new(readers).with_retry(retry),
            warnings,
        }
    }

    pub async fn close(&self) {
        for reader in self.router.readers() {
            reader.cleanup().await;
        }
    }
}

fn build_reader(
    source: SourceId,
    config: ActorConfig,
    http: &Arc<dyn HttpClient>,
) -> Result<Arc<dyn MarketDataReader>, ValidationError> {
    let http = Arc::clone(http);
    let reader: Arc<dyn MarketDataReader> = match source {
        SourceId::CoinGecko => Arc::new(CoinGeckoSource::new(config, http)?),
        SourceId::TwelveData => Arc::new(TwelveDataSource::new(config, http)?),
        SourceId::AlphaVantage => Arc::new(AlphaVantageSource::new(config, http)?),
        SourceId::Ccxt => {
            let connector = HttpMcpConnector::new(http, config.timeout_ms);
            Arc::new(CcxtSource::new(config, Arc::new(connector))?)
        }
    };
    Ok(reader)
}

pub fn http_client() -> Arc<dyn HttpClient> {
    Arc::new(ReqwestHttpClient::new())
}

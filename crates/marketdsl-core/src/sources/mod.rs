//! Source actors: one [`MarketDataReader`](crate::MarketDataReader) per provider.
//!
//! Every call follows the same order: reject unless `Ready`, validate the
//! context against the declared asset classes, translate it through the
//! provider's symbol table, reject undeclared operations, then run a single
//! bounded transport call and parse the payload through the validating
//! factories. Steps before the transport call never touch the network.

pub mod alphavantage;
pub mod ccxt;
pub mod coingecko;
pub mod twelvedata;

pub use alphavantage::AlphaVantageSource;
pub use ccxt::CcxtSource;
pub use coingecko::CoinGeckoSource;
pub use twelvedata::TwelveDataSource;

use std::sync::Arc;

use serde_json::Value;
use time::macros::format_description;
use time::{Date, PrimitiveDateTime};

use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::{
    ActorBase, DslError, DslResult, MarketContext, ReadCapabilities, ReadOperation, SourceId,
    TimeInterval, UtcDateTime,
};

/// Operations and asset classes each source declares, without constructing it.
pub const fn declared_capabilities(source: SourceId) -> ReadCapabilities {
    match source {
        SourceId::CoinGecko => coingecko::CAPABILITIES,
        SourceId::TwelveData => twelvedata::CAPABILITIES,
        SourceId::Ccxt => ccxt::CAPABILITIES,
        SourceId::AlphaVantage => alphavantage::CAPABILITIES,
    }
}

/// Bound HTTP client + provider root, the connection handle of REST sources.
pub(crate) struct RestSession {
    http: Arc<dyn HttpClient>,
    base_url: String,
    auth: HttpAuth,
}

impl RestSession {
    pub(crate) fn new(http: Arc<dyn HttpClient>, base_url: String, auth: HttpAuth) -> Self {
        Self {
            http,
            base_url,
            auth,
        }
    }

    /// GET `path` and decode the JSON body; non-2xx statuses are mapped first.
    pub(crate) async fn get_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
        timeout_ms: u64,
    ) -> DslResult<Value> {
        let request = HttpRequest::get(format!("{}{path}", self.base_url))
            .with_query(query)
            .with_auth(&self.auth)
            .with_header("accept", "application/json")
            .with_timeout_ms(timeout_ms);

        let response = self.http.execute(request).await?;
        response.error_for_status()?;
        parse_json(&response.body)
    }
}

/// Preconditions shared by every read: ready handle, accepted asset class,
/// provider-native translation, declared operation.
pub(crate) fn admit<H, N>(
    base: &ActorBase<H>,
    capabilities: ReadCapabilities,
    operation: ReadOperation,
    context: &MarketContext,
    translate: impl FnOnce(&MarketContext) -> DslResult<N>,
) -> DslResult<(Arc<H>, N)> {
    let handle = base.ready()?;

    let asset_class = context.symbol().asset_class();
    if !capabilities.accepts(asset_class) {
        return Err(DslError::invalid_symbol(format!(
            "{}: {asset_class} symbol {} is not served by this source",
            base.name(),
            context.symbol().pair()
        )));
    }

    let native = translate(context)?;

    if !capabilities.supports(operation) {
        return Err(DslError::unsupported(operation, base.name()));
    }

    Ok((handle, native))
}

/// Validates an operation the source never declares, then rejects it.
pub(crate) fn undeclared<H, N, T>(
    base: &ActorBase<H>,
    capabilities: ReadCapabilities,
    operation: ReadOperation,
    context: &MarketContext,
    translate: impl FnOnce(&MarketContext) -> DslResult<N>,
) -> DslResult<T> {
    admit(base, capabilities, operation, context, translate)?;
    Err(DslError::unsupported(operation, base.name()))
}

/// Ascending, deduplicated by timestamp, restricted to `range`.
pub(crate) fn finish_series<T>(
    mut items: Vec<T>,
    range: &TimeInterval,
    timestamp: impl Fn(&T) -> UtcDateTime,
) -> Vec<T> {
    items.retain(|item| range.contains(timestamp(item)));
    items.sort_by_key(|item| timestamp(item));
    items.dedup_by_key(|item| timestamp(item));
    items
}

pub(crate) fn parse_json(body: &str) -> DslResult<Value> {
    serde_json::from_str(body)
        .map_err(|e| DslError::invalid_response(format!("response is not valid json: {e}")))
}

/// Providers send numbers both as JSON numbers and as strings.
pub(crate) fn number_field(value: &Value, field: &str) -> DslResult<f64> {
    optional_number_field(value, field)?
        .ok_or_else(|| DslError::invalid_response(format!("missing numeric field '{field}'")))
}

pub(crate) fn optional_number_field(value: &Value, field: &str) -> DslResult<Option<f64>> {
    match value.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => as_number(raw)
            .map(Some)
            .ok_or_else(|| DslError::invalid_response(format!("field '{field}' is not a number"))),
    }
}

pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Parses `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD` or RFC3339, all read as UTC.
pub(crate) fn parse_provider_datetime(input: &str) -> DslResult<UtcDateTime> {
    let input = input.trim();
    if let Ok(parsed) = UtcDateTime::parse(input) {
        return Ok(parsed);
    }

    let with_time = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    if let Ok(parsed) = PrimitiveDateTime::parse(input, with_time) {
        return UtcDateTime::from_offset_datetime(parsed.assume_utc()).map_err(DslError::from);
    }

    let date_only = format_description!("[year]-[month]-[day]");
    if let Ok(date) = Date::parse(input, date_only) {
        return UtcDateTime::from_offset_datetime(date.midnight().assume_utc())
            .map_err(DslError::from);
    }

    Err(DslError::invalid_response(format!(
        "unrecognized timestamp '{input}'"
    )))
}

pub(crate) fn format_date(ts: UtcDateTime) -> String {
    let value = ts.into_inner();
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        value.year(),
        u8::from(value.month()),
        value.day(),
        value.hour(),
        value.minute(),
        value.second()
    )
}

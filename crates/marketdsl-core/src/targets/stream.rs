//! Stream target publishing through a Kafka REST proxy (v2 JSON embedded format).
//!
//! Each batch is one `POST /topics/{topic}` whose records are keyed by
//! `exchange:BASE/QUOTE` (`:SETTLE` appended for derivatives), keeping one market's records on one partition in
//! order. The proxy answers with one offset entry per record; entries with
//! an `error_code` are reported as failed items.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::contract::{ActorFuture, BoxFuture};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::{
    Actor, ActorBase, ActorConfig, ActorState, AssetClass, DslError, DslResult, InstrumentType,
    MarketContext, MarketDataWriter, Ohlcv, Price, PublishResult, SinkId, ValidationError,
};

pub const DEFAULT_PRICE_TOPIC: &str = "market.prices";
pub const DEFAULT_OHLCV_TOPIC: &str = "market.ohlcv";

const CONTENT_TYPE: &str = "application/vnd.kafka.json.v2+json";
const ACCEPT: &str = "application/vnd.kafka.v2+json, application/json";

/// Kafka REST proxy error code for a retriable produce failure.
const RETRIABLE_ERROR_CODE: i64 = 2;

struct StreamSession {
    http: Arc<dyn HttpClient>,
    endpoint: String,
    auth: HttpAuth,
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    exchange: &'a str,
    symbol: String,
    asset_class: AssetClass,
    instrument_type: InstrumentType,
    #[serde(flatten)]
    data: &'a T,
}

/// Writer publishing prices and candles to stream topics.
pub struct StreamWriter {
    base: ActorBase<StreamSession>,
    http: Arc<dyn HttpClient>,
    price_topic: String,
    ohlcv_topic: String,
}

impl StreamWriter {
    /// `connection_string` is the proxy's http(s) root; an API key, when set,
    /// is sent as a bearer token.
    pub fn new(config: ActorConfig, http: Arc<dyn HttpClient>) -> Result<Self, ValidationError> {
        config.require_http_endpoint()?;
        Ok(Self {
            base: ActorBase::new(config)?,
            http,
            price_topic: String::from(DEFAULT_PRICE_TOPIC),
            ohlcv_topic: String::from(DEFAULT_OHLCV_TOPIC),
        })
    }

    pub fn with_topics(
        mut self,
        price_topic: impl Into<String>,
        ohlcv_topic: impl Into<String>,
    ) -> Self {
        self.price_topic = price_topic.into();
        self.ohlcv_topic = ohlcv_topic.into();
        self
    }

    pub fn price_topic(&self) -> &str {
        &self.price_topic
    }

    pub fn ohlcv_topic(&self) -> &str {
        &self.ohlcv_topic
    }

    /// Binds the proxy and probes it with `GET /topics`.
    async fn connect(&self) -> DslResult<StreamSession> {
        let config = self.base.config();
        let endpoint = config.require_http_endpoint()?;
        let auth = match config.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => HttpAuth::BearerToken(key.to_owned()),
            _ => HttpAuth::None,
        };

        let probe = HttpRequest::get(format!("{endpoint}/topics"))
            .with_header("accept", ACCEPT)
            .with_auth(&auth)
            .with_timeout_ms(config.timeout_ms);
        self.http.execute(probe).await?.error_for_status()?;
        debug!(actor = %self.base.name(), endpoint = %endpoint, "stream proxy reachable");

        Ok(StreamSession {
            http: Arc::clone(&self.http),
            endpoint,
            auth,
        })
    }

    async fn produce<T: Serialize>(
        &self,
        topic: &str,
        context: &MarketContext,
        items: &[T],
    ) -> DslResult<PublishResult> {
        let session = self.base.ready()?;
        if items.is_empty() {
            return Ok(PublishResult::default());
        }

        let key = context.key();
        let records = items
            .iter()
            .map(|item| {
                let value = serde_json::to_value(Envelope {
                    exchange: context.exchange().id(),
                    symbol: context.symbol().series_symbol(),
                    asset_class: context.symbol().asset_class(),
                    instrument_type: context.symbol().instrument_type(),
                    data: item,
                })
                .map_err(|e| DslError::invalid_response(format!("record encoding failed: {e}")))?;
                Ok(json!({ "key": key, "value": value }))
            })
            .collect::<DslResult<Vec<_>>>()?;

        let request = HttpRequest::post(format!(
            "{}/topics/{}",
            session.endpoint,
            urlencoding::encode(topic)
        ))
        .with_header("accept", ACCEPT)
        .with_header("content-type", CONTENT_TYPE)
        .with_body(json!({ "records": records }).to_string())
        .with_auth(&session.auth)
        .with_timeout_ms(self.base.config().timeout_ms);

        let response = self
            .base
            .bounded(topic, async {
                let response = session.http.execute(request).await.map_err(DslError::from)?;
                response.error_for_status()?;
                Ok::<_, DslError>(response)
            })
            .await?;

        let payload: Value = serde_json::from_str(&response.body).map_err(|e| {
            DslError::invalid_response(format!("produce response is not valid json: {e}"))
        })?;
        let result = PublishResult::from_results(parse_offsets(&payload, items.len())?);
        debug!(
            actor = %self.base.name(),
            topic,
            written = result.written(),
            records = items.len(),
            "batch produced"
        );
        Ok(result)
    }
}

/// Maps `{"offsets":[{"partition":0,"offset":1,"error_code":null,"error":null}, ...]}`
/// onto one result per record.
pub fn parse_offsets(payload: &Value, records: usize) -> DslResult<Vec<DslResult<()>>> {
    let offsets = payload
        .get("offsets")
        .and_then(Value::as_array)
        .ok_or_else(|| DslError::invalid_response("produce response has no 'offsets' array"))?;

    Ok((0..records)
        .map(|index| {
            let Some(entry) = offsets.get(index) else {
                return Err(DslError::invalid_response(format!(
                    "no offset reported for record {index}"
                )));
            };

            let Some(code) = entry.get("error_code").and_then(Value::as_i64) else {
                return Ok(());
            };
            let message = entry
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("record rejected by stream");
            if code == RETRIABLE_ERROR_CODE {
                Err(DslError::network(format!("{message} (error_code {code})")))
            } else {
                Err(DslError::rejected(format!("{message} (error_code {code})")))
            }
        })
        .collect())
}

impl Actor for StreamWriter {
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

impl MarketDataWriter for StreamWriter {
    fn sink(&self) -> SinkId {
        SinkId::Stream
    }

    fn publish_prices<'a>(
        &'a self,
        context: &'a MarketContext,
        prices: &'a [Price],
    ) -> ActorFuture<'a, PublishResult> {
        Box::pin(self.produce(&self.price_topic, context, prices))
    }

    fn publish_ohlcvs<'a>(
        &'a self,
        context: &'a MarketContext,
        candles: &'a [Ohlcv],
    ) -> ActorFuture<'a, PublishResult> {
        Box::pin(self.produce(&self.ohlcv_topic, context, candles))
    }
}

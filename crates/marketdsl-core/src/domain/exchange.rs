use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{MarketSymbol, ValidationError};

/// How a venue matches orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueType {
    Centralized,
    Decentralized,
    /// Price aggregators such as CoinGecko.
    Aggregated,
}

/// Trading venue identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawExchange")]
pub struct Exchange {
    id: String,
    name: String,
    region: String,
    venue_type: VenueType,
}

impl Exchange {
    pub fn new(
        id: &str,
        name: &str,
        region: &str,
        venue_type: VenueType,
    ) -> Result<Self, ValidationError> {
        let id = id.trim().to_ascii_lowercase();
        let valid_id = !id.is_empty()
            && id
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
        if !valid_id {
            return Err(ValidationError::InvalidExchangeId { value: id });
        }

        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyField {
                field: "exchange.name",
            });
        }

        let region = match region.trim() {
            "" => String::from("global"),
            trimmed => trimmed.to_owned(),
        };

        Ok(Self {
            id,
            name: name.to_owned(),
            region,
            venue_type,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub const fn venue_type(&self) -> VenueType {
        self.venue_type
    }
}

impl Display for Exchange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

#[derive(Deserialize)]
struct RawExchange {
    id: String,
    name: String,
    #[serde(default)]
    region: String,
    venue_type: VenueType,
}

impl TryFrom<RawExchange> for Exchange {
    type Error = ValidationError;

    fn try_from(raw: RawExchange) -> Result<Self, Self::Error> {
        Self::new(&raw.id, &raw.name, &raw.region, raw.venue_type)
    }
}

/// Exchange + symbol addressed by every read and write call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketContext {
    exchange: Exchange,
    symbol: MarketSymbol,
}

impl MarketContext {
    pub fn new(exchange: Exchange, symbol: MarketSymbol) -> Self {
        Self { exchange, symbol }
    }

    pub const fn exchange(&self) -> &Exchange {
        &self.exchange
    }

    pub const fn symbol(&self) -> &MarketSymbol {
        &self.symbol
    }

    /// Stable key used for stream partitioning and storage rows.
    pub fn key(&self) -> String {
        format!("{}:{}", self.exchange.id(), self.symbol.series_symbol())
    }
}

impl Display for MarketContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.exchange)
    }
}

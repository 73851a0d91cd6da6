use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical source identifiers used in routing and envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    CoinGecko,
    TwelveData,
    Ccxt,
    AlphaVantage,
}

impl SourceId {
    pub const ALL: [Self; 4] = [
        Self::CoinGecko,
        Self::TwelveData,
        Self::Ccxt,
        Self::AlphaVantage,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CoinGecko => "coingecko",
            Self::TwelveData => "twelvedata",
            Self::Ccxt => "ccxt",
            Self::AlphaVantage => "alphavantage",
        }
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "coingecko" => Ok(Self::CoinGecko),
            "twelvedata" => Ok(Self::TwelveData),
            "ccxt" => Ok(Self::Ccxt),
            "alphavantage" => Ok(Self::AlphaVantage),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}

/// Canonical sink identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkId {
    TimeSeries,
    Stream,
}

impl SinkId {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TimeSeries => "timeseries",
            Self::Stream => "stream",
        }
    }
}

impl Display for SinkId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SinkId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "timeseries" => Ok(Self::TimeSeries),
            "stream" => Ok(Self::Stream),
            other => Err(ValidationError::InvalidSink {
                value: other.to_owned(),
            }),
        }
    }
}

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MAX_TICKER_LEN: usize = 20;

/// Canonical instrument class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Crypto,
    Equity,
    Forex,
    Commodity,
}

impl AssetClass {
    pub const ALL: [Self; 4] = [Self::Crypto, Self::Equity, Self::Forex, Self::Commodity];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Crypto => "crypto",
            Self::Equity => "equity",
            Self::Forex => "forex",
            Self::Commodity => "commodity",
        }
    }
}

impl Display for AssetClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetClass {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "crypto" => Ok(Self::Crypto),
            "equity" => Ok(Self::Equity),
            "forex" | "fx" => Ok(Self::Forex),
            "commodity" => Ok(Self::Commodity),
            other => Err(ValidationError::InvalidAssetClass {
                value: other.to_owned(),
            }),
        }
    }
}

/// Spot instrument or derivative contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentType {
    Cash,
    Derivative,
}

/// Validated, immutable market symbol.
///
/// Equality and hashing are by value over every field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawMarketSymbol")]
pub struct MarketSymbol {
    ticker: String,
    name: String,
    asset_class: AssetClass,
    quote_currency: String,
    instrument_type: InstrumentType,
}

impl MarketSymbol {
    pub fn new(
        ticker: &str,
        name: &str,
        asset_class: AssetClass,
        quote_currency: &str,
        instrument_type: InstrumentType,
    ) -> Result<Self, ValidationError> {
        let ticker = normalize_ticker(ticker)?;
        let quote_currency = validate_currency_code(quote_currency)?;
        let name = match name.trim() {
            "" => ticker.clone(),
            trimmed => trimmed.to_owned(),
        };

        Ok(Self {
            ticker,
            name,
            asset_class,
            quote_currency,
            instrument_type,
        })
    }

    /// Spot instrument with the ticker as display name.
    pub fn cash(
        ticker: &str,
        asset_class: AssetClass,
        quote_currency: &str,
    ) -> Result<Self, ValidationError> {
        Self::new(ticker, "", asset_class, quote_currency, InstrumentType::Cash)
    }

    /// Parses `BASE/QUOTE` (e.g. `BTC/USD`) into a spot symbol.
    pub fn parse_pair(pair: &str, asset_class: AssetClass) -> Result<Self, ValidationError> {
        let Some((base, quote)) = pair.trim().split_once('/') else {
            return Err(ValidationError::InvalidPair {
                value: pair.to_owned(),
            });
        };

        Self::cash(base, asset_class, quote)
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn asset_class(&self) -> AssetClass {
        self.asset_class
    }

    pub fn quote_currency(&self) -> &str {
        &self.quote_currency
    }

    pub const fn instrument_type(&self) -> InstrumentType {
        self.instrument_type
    }

    pub fn pair(&self) -> String {
        format!("{}/{}", self.ticker, self.quote_currency)
    }

    /// `BASE/QUOTE` for cash, `BASE/QUOTE:SETTLE` for derivatives, so spot and
    /// perpetual series never share a name.
    pub fn series_symbol(&self) -> String {
        match self.instrument_type {
            InstrumentType::Cash => self.pair(),
            InstrumentType::Derivative => format!("{}:{}", self.pair(), self.quote_currency),
        }
    }
}

impl Display for MarketSymbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.ticker, self.quote_currency)
    }
}

#[derive(Deserialize)]
struct RawMarketSymbol {
    ticker: String,
    #[serde(default)]
    name: String,
    asset_class: AssetClass,
    quote_currency: String,
    instrument_type: InstrumentType,
}

impl TryFrom<RawMarketSymbol> for MarketSymbol {
    type Error = ValidationError;

    fn try_from(raw: RawMarketSymbol) -> Result<Self, Self::Error> {
        Self::new(
            &raw.ticker,
            &raw.name,
            raw.asset_class,
            &raw.quote_currency,
            raw.instrument_type,
        )
    }
}

fn normalize_ticker(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptySymbol);
    }

    let normalized = trimmed.to_ascii_uppercase();
    let len = normalized.chars().count();
    if len > MAX_TICKER_LEN {
        return Err(ValidationError::SymbolTooLong {
            len,
            max: MAX_TICKER_LEN,
        });
    }

    if let Some(first) = normalized.chars().next() {
        if !first.is_ascii_alphanumeric() {
            return Err(ValidationError::SymbolInvalidStart { ch: first });
        }
    }

    for (index, ch) in normalized.chars().enumerate() {
        let valid = ch.is_ascii_alphanumeric() || ch == '.' || ch == '-' || ch == '_';
        if !valid {
            return Err(ValidationError::SymbolInvalidChar { ch, index });
        }
    }

    Ok(normalized)
}

/// Validates an ISO-like currency code; stablecoins such as `USDT` are accepted.
pub fn validate_currency_code(input: &str) -> Result<String, ValidationError> {
    let normalized = input.trim().to_ascii_uppercase();
    let valid = (3..=5).contains(&normalized.len())
        && normalized.chars().all(|ch| ch.is_ascii_alphanumeric());
    if !valid {
        return Err(ValidationError::InvalidCurrency {
            value: input.to_owned(),
        });
    }

    Ok(normalized)
}

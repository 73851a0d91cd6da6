use serde::{Deserialize, Serialize};

use crate::{UtcDateTime, ValidationError};

/// Last-trade or spot price snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPrice")]
pub struct Price {
    timestamp: UtcDateTime,
    price: f64,
    size: f64,
}

impl Price {
    /// `size` is zero when the source has no trade size.
    pub fn new(timestamp: UtcDateTime, price: f64, size: f64) -> Result<Self, ValidationError> {
        validate_positive("price", price)?;
        validate_non_negative("size", size)?;

        Ok(Self {
            timestamp,
            price,
            size,
        })
    }

    pub const fn timestamp(&self) -> UtcDateTime {
        self.timestamp
    }

    pub const fn price(&self) -> f64 {
        self.price
    }

    pub const fn size(&self) -> f64 {
        self.size
    }
}

/// Open-high-low-close-volume candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawOhlcv")]
pub struct Ohlcv {
    timestamp: UtcDateTime,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl Ohlcv {
    pub fn new(
        timestamp: UtcDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, ValidationError> {
        validate_positive("open", open)?;
        validate_positive("high", high)?;
        validate_positive("low", low)?;
        validate_positive("close", close)?;
        validate_non_negative("volume", volume)?;

        if high < low {
            return Err(ValidationError::InvalidBarRange);
        }

        if open < low || open > high || close < low || close > high {
            return Err(ValidationError::InvalidBarBounds);
        }

        Ok(Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        })
    }

    pub const fn timestamp(&self) -> UtcDateTime {
        self.timestamp
    }

    pub const fn open(&self) -> f64 {
        self.open
    }

    pub const fn high(&self) -> f64 {
        self.high
    }

    pub const fn low(&self) -> f64 {
        self.low
    }

    pub const fn close(&self) -> f64 {
        self.close
    }

    pub const fn volume(&self) -> f64 {
        self.volume
    }
}

/// One side of the top of book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBookLevel")]
pub struct BookLevel {
    price: f64,
    size: f64,
}

impl BookLevel {
    pub fn new(price: f64, size: f64) -> Result<Self, ValidationError> {
        validate_positive("level.price", price)?;
        validate_non_negative("level.size", size)?;
        Ok(Self { price, size })
    }

    pub const fn price(&self) -> f64 {
        self.price
    }

    pub const fn size(&self) -> f64 {
        self.size
    }
}

/// Top-of-book bid and ask.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLevel1")]
pub struct Level1 {
    timestamp: UtcDateTime,
    bid: Option<BookLevel>,
    ask: Option<BookLevel>,
}

impl Level1 {
    pub fn new(
        timestamp: UtcDateTime,
        bid: Option<BookLevel>,
        ask: Option<BookLevel>,
    ) -> Result<Self, ValidationError> {
        match (bid, ask) {
            (None, None) => return Err(ValidationError::EmptyBook),
            (Some(bid), Some(ask)) if bid.price > ask.price => {
                return Err(ValidationError::CrossedBook)
            }
            _ => {}
        }

        Ok(Self {
            timestamp,
            bid,
            ask,
        })
    }

    /// Both sides present.
    pub fn two_sided(
        timestamp: UtcDateTime,
        bid_price: f64,
        bid_size: f64,
        ask_price: f64,
        ask_size: f64,
    ) -> Result<Self, ValidationError> {
        Self::new(
            timestamp,
            Some(BookLevel::new(bid_price, bid_size)?),
            Some(BookLevel::new(ask_price, ask_size)?),
        )
    }

    pub const fn timestamp(&self) -> UtcDateTime {
        self.timestamp
    }

    pub const fn bid(&self) -> Option<BookLevel> {
        self.bid
    }

    pub const fn ask(&self) -> Option<BookLevel> {
        self.ask
    }

    pub fn mid(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / 2.0),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct RawPrice {
    timestamp: UtcDateTime,
    price: f64,
    #[serde(default)]
    size: f64,
}

impl TryFrom<RawPrice> for Price {
    type Error = ValidationError;

    fn try_from(raw: RawPrice) -> Result<Self, Self::Error> {
        Self::new(raw.timestamp, raw.price, raw.size)
    }
}

#[derive(Deserialize)]
struct RawOhlcv {
    timestamp: UtcDateTime,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

impl TryFrom<RawOhlcv> for Ohlcv {
    type Error = ValidationError;

    fn try_from(raw: RawOhlcv) -> Result<Self, Self::Error> {
        Self::new(
            raw.timestamp,
            raw.open,
            raw.high,
            raw.low,
            raw.close,
            raw.volume,
        )
    }
}

#[derive(Deserialize)]
struct RawBookLevel {
    price: f64,
    #[serde(default)]
    size: f64,
}

impl TryFrom<RawBookLevel> for BookLevel {
    type Error = ValidationError;

    fn try_from(raw: RawBookLevel) -> Result<Self, Self::Error> {
        Self::new(raw.price, raw.size)
    }
}

#[derive(Deserialize)]
struct RawLevel1 {
    timestamp: UtcDateTime,
    bid: Option<BookLevel>,
    ask: Option<BookLevel>,
}

impl TryFrom<RawLevel1> for Level1 {
    type Error = ValidationError;

    fn try_from(raw: RawLevel1) -> Result<Self, Self::Error> {
        Self::new(raw.timestamp, raw.bid, raw.ask)
    }
}

fn validate_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    Ok(())
}

fn validate_positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    validate_finite(field, value)?;
    if value <= 0.0 {
        return Err(ValidationError::NonPositiveValue { field });
    }
    Ok(())
}

fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    validate_finite(field, value)?;
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}

use serde::{Deserialize, Serialize};
use time::Duration;

use crate::{UtcDateTime, ValidationError};

/// Half-open historical query window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTimeInterval")]
pub struct TimeInterval {
    start: UtcDateTime,
    end: UtcDateTime,
}

impl TimeInterval {
    pub fn new(start: UtcDateTime, end: UtcDateTime) -> Result<Self, ValidationError> {
        if start >= end {
            return Err(ValidationError::InvalidTimeRange {
                start: start.format_rfc3339(),
                end: end.format_rfc3339(),
            });
        }

        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, ValidationError> {
        Self::new(UtcDateTime::parse(start)?, UtcDateTime::parse(end)?)
    }

    /// Window of `length` ending now.
    pub fn trailing(length: Duration) -> Result<Self, ValidationError> {
        let end = UtcDateTime::now();
        Self::new(end.saturating_sub(length), end)
    }

    pub const fn start(&self) -> UtcDateTime {
        self.start
    }

    pub const fn end(&self) -> UtcDateTime {
        self.end
    }

    pub fn contains(&self, ts: UtcDateTime) -> bool {
        ts >= self.start && ts < self.end
    }

    pub fn duration(&self) -> Duration {
        self.end.into_inner() - self.start.into_inner()
    }
}

#[derive(Deserialize)]
struct RawTimeInterval {
    start: UtcDateTime,
    end: UtcDateTime,
}

impl TryFrom<RawTimeInterval> for TimeInterval {
    type Error = ValidationError;

    fn try_from(raw: RawTimeInterval) -> Result<Self, Self::Error> {
        Self::new(raw.start, raw.end)
    }
}

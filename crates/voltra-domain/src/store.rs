use crate::error::{DomainError, DomainResult};
use crate::reading::Reading;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// One measurement group of a reading, ready for time-series storage.
///
/// `device_id` and `country_code` become indexed tags; `fields` carries the
/// group's scalar values.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementPoint {
    pub measurement: String,
    pub device_id: String,
    pub country_code: String,
    pub fields: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// Input for a historical range query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeQuery {
    pub measurement: String,
    pub device_id: String,
    pub range: TimeRange,
}

/// A relative look-back window such as `24h` or `7d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub amount: u32,
    pub unit: RangeUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl RangeUnit {
    fn suffix(self) -> char {
        match self {
            RangeUnit::Seconds => 's',
            RangeUnit::Minutes => 'm',
            RangeUnit::Hours => 'h',
            RangeUnit::Days => 'd',
            RangeUnit::Weeks => 'w',
        }
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self {
            amount: 24,
            unit: RangeUnit::Hours,
        }
    }
}

impl FromStr for TimeRange {
    type Err = DomainError;

    /// Parse a `<amount><unit>` token, e.g. `24h`, `30m`, `7d`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let mut chars = trimmed.chars();
        let unit = match chars.next_back() {
            Some('s') => RangeUnit::Seconds,
            Some('m') => RangeUnit::Minutes,
            Some('h') => RangeUnit::Hours,
            Some('d') => RangeUnit::Days,
            Some('w') => RangeUnit::Weeks,
            _ => return Err(DomainError::InvalidTimeRange(value.to_string())),
        };
        let amount = chars
            .as_str()
            .parse::<u32>()
            .map_err(|_| DomainError::InvalidTimeRange(value.to_string()))?;
        if amount == 0 {
            return Err(DomainError::InvalidTimeRange(value.to_string()));
        }
        Ok(Self { amount, unit })
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.suffix())
    }
}

/// Time-series sink and query backend for telemetry readings.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Persist a batch of measurement points.
    async fn write_points(&self, points: Vec<MeasurementPoint>) -> DomainResult<()>;

    /// Raw rows for one device and measurement over a look-back window.
    async fn query_range(&self, query: RangeQuery) -> DomainResult<serde_json::Value>;
}

/// Expand a reading into one point per measurement group.
pub fn points_for_reading(reading: &Reading) -> Vec<MeasurementPoint> {
    reading
        .groups
        .iter()
        .map(|(name, fields)| MeasurementPoint {
            measurement: name.clone(),
            device_id: reading.device_id.clone(),
            country_code: reading.country_code.clone(),
            fields: fields.clone(),
            timestamp: reading.received_at,
        })
        .collect()
}

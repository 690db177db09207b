//! Tick granularities supported by the simulation feed.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Time between consecutive simulated ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Interval {
    /// 15 seconds (default granularity)
    #[default]
    FifteenSeconds,
    /// 1 minute
    OneMinute,
    /// 15 minutes
    FifteenMinutes,
    /// 30 minutes
    ThirtyMinutes,
    /// 1 hour
    OneHour,
    /// 6 hours
    SixHours,
    /// 1 day
    OneDay,
}

impl Interval {
    /// Get the interval as a chrono Duration.
    pub fn to_duration(&self) -> Duration {
        match self {
            Interval::FifteenSeconds => Duration::seconds(15),
            Interval::OneMinute => Duration::minutes(1),
            Interval::FifteenMinutes => Duration::minutes(15),
            Interval::ThirtyMinutes => Duration::minutes(30),
            Interval::OneHour => Duration::hours(1),
            Interval::SixHours => Duration::hours(6),
            Interval::OneDay => Duration::days(1),
        }
    }

    /// Stable identifier used in projections and on the wire.
    pub fn id(&self) -> &'static str {
        match self {
            Interval::FifteenSeconds => "fifteen_seconds",
            Interval::OneMinute => "one_minute",
            Interval::FifteenMinutes => "fifteen_minutes",
            Interval::ThirtyMinutes => "thirty_minutes",
            Interval::OneHour => "one_hour",
            Interval::SixHours => "six_hours",
            Interval::OneDay => "one_day",
        }
    }

    /// Parse a stable identifier back into an interval.
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "fifteen_seconds" => Some(Interval::FifteenSeconds),
            "one_minute" => Some(Interval::OneMinute),
            "fifteen_minutes" => Some(Interval::FifteenMinutes),
            "thirty_minutes" => Some(Interval::ThirtyMinutes),
            "one_hour" => Some(Interval::OneHour),
            "six_hours" => Some(Interval::SixHours),
            "one_day" => Some(Interval::OneDay),
            _ => None,
        }
    }
}

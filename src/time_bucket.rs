//! Time-of-day buckets for traffic-aware caching.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeZone, Timelike};
use serde::Serialize;

/// Coarse traffic period derived from local time of day.
///
/// - `PeakMorning`: 07:00–09:00
/// - `Business`: 09:00–17:00
/// - `PeakEvening`: 17:00–19:00
/// - `Offpeak`: 19:00–07:00
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    PeakMorning,
    Business,
    PeakEvening,
    Offpeak,
}

impl TimeBucket {
    pub fn of(time: NaiveTime) -> Self {
        match time.hour() {
            7 | 8 => TimeBucket::PeakMorning,
            9..=16 => TimeBucket::Business,
            17 | 18 => TimeBucket::PeakEvening,
            _ => TimeBucket::Offpeak,
        }
    }

    pub fn at<Tz: TimeZone>(timestamp: &DateTime<Tz>) -> Self {
        Self::of(timestamp.time())
    }

    /// Staleness allowed for traffic durations written in this bucket.
    pub const fn ttl(self) -> Duration {
        match self {
            TimeBucket::PeakMorning | TimeBucket::PeakEvening => Duration::from_secs(900),
            TimeBucket::Business => Duration::from_secs(1800),
            TimeBucket::Offpeak => Duration::from_secs(3600),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            TimeBucket::PeakMorning => "peak_morning",
            TimeBucket::Business => "business",
            TimeBucket::PeakEvening => "peak_evening",
            TimeBucket::Offpeak => "offpeak",
        }
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

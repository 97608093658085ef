use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Duration, DurationRound, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// A UTC instant with microsecond precision.
///
/// The wire form is fixed: `YYYY-MM-DDTHH:MM:SS.ffffffZ`. Sub-microsecond
/// precision is truncated on construction so that a timestamp always
/// round-trips to the exact same bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Wrap a `DateTime<Utc>`, truncating to microseconds.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        let truncated = dt
            .duration_trunc(Duration::microseconds(1))
            .unwrap_or(dt);
        Self(truncated)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Build from a UNIX timestamp in seconds.
    pub fn from_unix_secs(secs: i64) -> Result<Self, TypeError> {
        Utc.timestamp_opt(secs, 0)
            .single()
            .map(Self)
            .ok_or_else(|| TypeError::InvalidTimestamp(secs.to_string()))
    }

    /// Parse an RFC 3339 string, normalizing to UTC.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Self::from_datetime(dt.with_timezone(&Utc)))
            .map_err(|e| TypeError::InvalidTimestamp(format!("{s}: {e}")))
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// The canonical wire string.
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    /// Calendar date (`YYYY-MM-DD`).
    pub fn date_string(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    pub fn plus(&self, duration: Duration) -> Self {
        Self(self.0 + duration)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.to_rfc3339())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl FromStr for Timestamp {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Half-open reporting period `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Period {
    /// Create a period, rejecting empty or inverted ranges.
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self, TypeError> {
        if start >= end {
            return Err(TypeError::InvalidPeriod {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    /// Returns `true` if `start <= ts < end`.
    pub fn contains(&self, ts: &Timestamp) -> bool {
        self.start <= *ts && *ts < self.end
    }

    /// Returns `true` if the two periods share any instant.
    pub fn overlaps(&self, other: &Period) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.start, self.end)
    }
}

/// Source of the current time. Injected so tests can control expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A manually advanced clock for tests and deterministic replays.
#[derive(Debug)]
pub struct FixedClock {
    current: Mutex<Timestamp>,
}

impl FixedClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut guard = self.current.lock().unwrap_or_else(|p| p.into_inner());
        *guard = guard.plus(by);
    }

    pub fn set(&self, to: Timestamp) {
        let mut guard = self.current.lock().unwrap_or_else(|p| p.into_inner());
        *guard = to;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        *self.current.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    #[test]
    fn wire_format_is_fixed_width_utc() {
        let t = ts("2025-03-01T08:30:00+02:00");
        assert_eq!(t.to_rfc3339(), "2025-03-01T06:30:00.000000Z");
    }

    #[test]
    fn truncates_to_microseconds() {
        let t = ts("2025-03-01T00:00:00.123456789Z");
        assert_eq!(t.to_rfc3339(), "2025-03-01T00:00:00.123456Z");
    }

    #[test]
    fn serde_roundtrip_is_byte_stable() {
        let t = ts("2025-01-15T12:00:00Z");
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, "\"2025-01-15T12:00:00.000000Z\"");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(serde_json::to_string(&back).unwrap(), json);
    }

    #[test]
    fn period_rejects_inverted_range() {
        let a = ts("2025-01-02T00:00:00Z");
        let b = ts("2025-01-01T00:00:00Z");
        assert!(Period::new(a, b).is_err());
        assert!(Period::new(a, a).is_err());
    }

    #[test]
    fn period_is_half_open() {
        let p = Period::new(ts("2025-01-01T00:00:00Z"), ts("2025-01-02T00:00:00Z")).unwrap();
        assert!(p.contains(&ts("2025-01-01T00:00:00Z")));
        assert!(p.contains(&ts("2025-01-01T23:59:59Z")));
        assert!(!p.contains(&ts("2025-01-02T00:00:00Z")));
    }

    #[test]
    fn period_overlap() {
        let jan = Period::new(ts("2025-01-01T00:00:00Z"), ts("2025-02-01T00:00:00Z")).unwrap();
        let feb = Period::new(ts("2025-02-01T00:00:00Z"), ts("2025-03-01T00:00:00Z")).unwrap();
        let mid = Period::new(ts("2025-01-15T00:00:00Z"), ts("2025-02-15T00:00:00Z")).unwrap();
        assert!(!jan.overlaps(&feb));
        assert!(jan.overlaps(&mid));
        assert!(feb.overlaps(&mid));
    }

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::new(ts("2025-01-01T00:00:00Z"));
        clock.advance(Duration::seconds(90));
        assert_eq!(clock.now(), ts("2025-01-01T00:01:30Z"));
    }
}

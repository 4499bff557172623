//! Time window resolution
//!
//! Turns the user's `--until` / `--since` / `--delta` inputs into the
//! half-open interval `[since, until)` used for a single pull.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};

use crate::error::WindowError;

/// Unit of a relative `--delta`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaUnit {
    Days,
    Weeks,
}

impl FromStr for DeltaUnit {
    type Err = WindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "days" => Ok(Self::Days),
            "weeks" => Ok(Self::Weeks),
            other => Err(WindowError(format!(
                "unknown delta unit {other:?} (expected 'days' or 'weeks')"
            ))),
        }
    }
}

impl fmt::Display for DeltaUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Days => f.write_str("days"),
            Self::Weeks => f.write_str("weeks"),
        }
    }
}

/// A relative look-back such as "2 weeks"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delta {
    pub count: i64,
    pub unit: DeltaUnit,
}

impl Delta {
    pub fn new(count: i64, unit: DeltaUnit) -> Self {
        Self { count, unit }
    }

    /// Build a delta from a count and an unparsed unit name
    pub fn from_parts(count: i64, unit: &str) -> Result<Self, WindowError> {
        Ok(Self::new(count, unit.parse()?))
    }

    /// Parse `"<count> <unit>"`, e.g. `"3 days"`
    pub fn parse(s: &str) -> Result<Self, WindowError> {
        let mut parts = s.split_whitespace();
        let (Some(count), Some(unit), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(WindowError(format!(
                "delta {s:?} must look like '<count> <days|weeks>'"
            )));
        };
        let count = count
            .parse::<i64>()
            .map_err(|_| WindowError(format!("delta count {count:?} is not an integer")))?;
        Self::from_parts(count, unit)
    }

    fn to_duration(self) -> Result<TimeDelta, WindowError> {
        if self.count <= 0 {
            return Err(WindowError(format!(
                "delta must be positive, got {} {}",
                self.count, self.unit
            )));
        }
        let duration = match self.unit {
            DeltaUnit::Days => TimeDelta::try_days(self.count),
            DeltaUnit::Weeks => TimeDelta::try_weeks(self.count),
        };
        duration.ok_or_else(|| WindowError(format!("delta {} {} is too large", self.count, self.unit)))
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.count, self.unit)
    }
}

/// Raw window inputs before resolution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowRequest {
    pub until: Option<DateTime<Utc>>,
    pub since: Option<DateTime<Utc>>,
    pub delta: Option<Delta>,
}

/// The half-open interval `[since, until)` a pull covers
///
/// `since == None` means "everything up to `until`".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    since: Option<DateTime<Utc>>,
    until: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(since: Option<DateTime<Utc>>, until: DateTime<Utc>) -> Result<Self, WindowError> {
        if let Some(since) = since
            && since >= until
        {
            return Err(WindowError(format!(
                "since ({since}) must be earlier than until ({until})"
            )));
        }
        Ok(Self { since, until })
    }

    /// Everything up to `until`
    pub fn up_to(until: DateTime<Utc>) -> Self {
        Self { since: None, until }
    }

    /// Resolve user inputs against the given current time.
    pub fn resolve(request: &WindowRequest, now: DateTime<Utc>) -> Result<Self, WindowError> {
        let until = request.until.unwrap_or(now);
        let since = match (request.since, request.delta) {
            (Some(_), Some(delta)) => {
                return Err(WindowError(format!(
                    "an explicit since date cannot be combined with a delta ({delta})"
                )));
            }
            (Some(since), None) => Some(since),
            (None, Some(delta)) => {
                let duration = delta.to_duration()?;
                let since = until.checked_sub_signed(duration).ok_or_else(|| {
                    WindowError(format!("going back {delta} from {until} is out of range"))
                })?;
                Some(since)
            }
            (None, None) => None,
        };
        Self::new(since, until)
    }

    pub fn since(&self) -> Option<DateTime<Utc>> {
        self.since
    }

    pub fn until(&self) -> DateTime<Utc> {
        self.until
    }

    /// Whether a unix timestamp (seconds) falls before the window starts
    pub fn starts_after(&self, timestamp: f64) -> bool {
        self.since
            .is_some_and(|since| timestamp < unix_seconds(since))
    }

    /// Whether a unix timestamp (seconds) is at or past the window's end
    pub fn ends_by(&self, timestamp: f64) -> bool {
        timestamp >= unix_seconds(self.until)
    }
}

/// Fractional unix seconds, keeping microsecond precision
fn unix_seconds(instant: DateTime<Utc>) -> f64 {
    instant.timestamp_micros() as f64 / 1e6
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.since {
            Some(since) => write!(f, "[{}, {})", since.to_rfc3339(), self.until.to_rfc3339()),
            None => write!(f, "[-, {})", self.until.to_rfc3339()),
        }
    }
}

/// Parse a user-supplied instant.
///
/// Accepts RFC 3339 and the date / date-time layouts the CLI has always
/// taken. Values without an offset are read as UTC.
pub fn parse_instant(s: &str) -> Result<DateTime<Utc>, WindowError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for layout in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, layout) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        && let Some(naive) = date.and_hms_opt(0, 0, 0)
    {
        return Ok(naive.and_utc());
    }
    Err(WindowError(format!(
        "cannot parse {s:?} as a timestamp (try YYYY-MM-DD or RFC 3339)"
    )))
}

//! Bucket keys and the calendar-day predicates behind "due" and "visible".
//!
//! Reminders that should surface together share a bucket key: all-day
//! reminders key on their local calendar day, timed reminders on the local
//! minute. The formats are chosen so that plain lexicographic ordering of
//! keys is chronological, and the day-granularity key (`2026-03-10`) is a
//! strict prefix of, and therefore sorts before, every minute-granularity
//! key of the same day (`2026-03-10 09:30`).

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Grouping and sorting key for a reminder.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BucketKey(String);

impl BucketKey {
    /// Derive the key for a reminder instant.
    ///
    /// Day granularity for all-day reminders, minute granularity otherwise,
    /// both in local wall-clock time.
    pub fn derive(at: DateTime<Utc>, all_day: bool) -> Self {
        let local = at.with_timezone(&Local);
        if all_day {
            Self(local.format("%Y-%m-%d").to_string())
        } else {
            Self(local.format("%Y-%m-%d %H:%M").to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Local calendar day of an instant.
pub fn local_day(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&Local).date_naive()
}

/// The instant a reminder actually fires: local midnight of its day for
/// all-day reminders, the raw timestamp otherwise.
pub fn effective_fire_time(at: DateTime<Utc>, all_day: bool) -> DateTime<Utc> {
    if !all_day {
        return at;
    }
    let midnight = local_day(at).and_time(NaiveTime::MIN);
    match Local.from_local_datetime(&midnight).earliest() {
        Some(dt) => dt.with_timezone(&Utc),
        // Midnight does not exist in this zone (DST gap); keep the raw instant.
        None => at,
    }
}

/// A reminder may be registered while its local calendar day is today or
/// later. Earlier days are expired and filtered out, not errors.
pub fn is_valid_at(at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    local_day(at) >= local_day(now)
}

/// A reminder is visible once its day is today and, for timed reminders,
/// its instant has arrived. All-day reminders are visible for the whole of
/// their day.
pub fn is_visible_at(at: DateTime<Utc>, all_day: bool, now: DateTime<Utc>) -> bool {
    local_day(at) == local_day(now) && (all_day || at <= now)
}

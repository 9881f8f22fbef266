//! UTC day bucketing and the backfill cutoff

use chrono::{DateTime, Duration, NaiveTime, Utc};

/// Source of "now" for cutoff computation
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// UTC midnight starting the day containing `t`
pub fn bucketize(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Exclusive upper bound of materialization: UTC midnight of today
pub fn cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    bucketize(now)
}

/// Midnight following `day`
pub fn next_day(day: DateTime<Utc>) -> DateTime<Utc> {
    bucketize(day) + Duration::days(1)
}

/// Half-open `[start, end)` range of instants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Backfill window `[bucketize(start), cutoff(now))`
    pub fn backfill(start: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self::new(bucketize(start), cutoff(now))
    }

    /// The single UTC day containing `t`
    pub fn day_of(t: DateTime<Utc>) -> Self {
        let day = bucketize(t);
        Self::new(day, next_day(day))
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

//! Scheduler job record
//!
//! A scheduled job is the unit the dispatcher fires. The billing collector
//! keys one job per supervised listing and keeps its retry state in the
//! opaque `payload`.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How often a recurring job fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "every", rename_all = "snake_case")]
pub enum RepeatInterval {
    /// Calendar months; day-of-month is clamped to the end of shorter months
    Months(u32),
    /// Fixed number of seconds
    Seconds(i64),
}

impl RepeatInterval {
    /// `from` moved forward by `periods` whole intervals
    pub fn add_periods(&self, from: DateTime<Utc>, periods: u32) -> Option<DateTime<Utc>> {
        match *self {
            RepeatInterval::Months(months) => {
                from.checked_add_months(Months::new(months.checked_mul(periods)?))
            }
            RepeatInterval::Seconds(secs) => {
                from.checked_add_signed(Duration::seconds(secs.checked_mul(i64::from(periods))?))
            }
        }
    }

    /// `from` moved forward by one interval
    pub fn step(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.add_periods(from, 1)
    }

    /// First anniversary of `anchor` that falls strictly after `now`
    ///
    /// Anniversaries are counted from `anchor` itself so month-end clamping
    /// does not drift (Jan 31 -> Feb 28 -> Mar 31).
    pub fn first_after(&self, anchor: DateTime<Utc>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.is_positive() {
            return None;
        }

        let mut periods: u32 = match *self {
            // Jump close to the target instead of walking second by second
            RepeatInterval::Seconds(secs) if now > anchor => {
                u32::try_from((now - anchor).num_seconds() / secs).ok()?.max(1)
            }
            _ => 1,
        };

        loop {
            let candidate = self.add_periods(anchor, periods)?;
            if candidate > now {
                return Some(candidate);
            }
            periods = periods.checked_add(1)?;
        }
    }

    fn is_positive(&self) -> bool {
        match *self {
            RepeatInterval::Months(months) => months > 0,
            RepeatInterval::Seconds(secs) => secs > 0,
        }
    }
}

impl fmt::Display for RepeatInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepeatInterval::Months(m) => write!(f, "{} month(s)", m),
            RepeatInterval::Seconds(s) => write!(f, "{}s", s),
        }
    }
}

/// A job stored in the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    /// Job key; at most one stored job per key
    pub id: String,

    /// Kind tag used to route the job to its handler
    pub kind: String,

    /// Handler-owned payload
    pub payload: serde_json::Value,

    /// Next time the job is due
    pub next_fire_at: DateTime<Utc>,

    /// Repeat interval; `None` means fire once and discard
    pub repeat: Option<RepeatInterval>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ScheduledJob {
    /// Create a recurring job
    pub fn recurring(
        id: impl Into<String>,
        kind: impl Into<String>,
        payload: serde_json::Value,
        first_fire_at: DateTime<Utc>,
        repeat: RepeatInterval,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind: kind.into(),
            payload,
            next_fire_at: first_fire_at,
            repeat: Some(repeat),
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the job should fire at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_fire_at <= now
    }

    /// Move `next_fire_at` past `fired_at` by the repeat interval
    ///
    /// Returns `false` when the job does not repeat (or the interval cannot
    /// produce a later date) and should be discarded after firing.
    pub fn advance(&mut self, fired_at: DateTime<Utc>) -> bool {
        let next = self
            .repeat
            .and_then(|repeat| repeat.first_after(self.next_fire_at, fired_at));

        match next {
            Some(next) => {
                self.next_fire_at = next;
                self.updated_at = fired_at;
                true
            }
            None => false,
        }
    }
}

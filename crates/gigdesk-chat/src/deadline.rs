use std::fmt;

use chrono::{DateTime, Utc};

/// Remaining time until an order deadline, at minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeLeft {
    NotSet,
    Expired,
    Remaining { days: i64, hours: i64, minutes: i64 },
}

impl TimeLeft {
    pub fn until(deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let Some(deadline) = deadline else {
            return Self::NotSet;
        };
        let left = deadline - now;
        if left <= chrono::Duration::zero() {
            return Self::Expired;
        }
        Self::Remaining {
            days: left.num_days(),
            hours: left.num_hours() % 24,
            minutes: left.num_minutes() % 60,
        }
    }
}

impl fmt::Display for TimeLeft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSet => write!(f, "Не указан"),
            Self::Expired => write!(f, "Истёк"),
            Self::Remaining {
                days,
                hours,
                minutes,
            } => write!(f, "{}д {}ч {}м", days, hours, minutes),
        }
    }
}

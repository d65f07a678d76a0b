use chrono::{DateTime, Duration, FixedOffset, NaiveTime, TimeZone, Utc};

use common::{Error, Result};
use strategy::ScheduleConfig;

/// Daily scan times on a fixed-offset wall clock.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    offset: FixedOffset,
    times: Vec<NaiveTime>,
}

impl Schedule {
    pub fn from_config(cfg: &ScheduleConfig) -> Result<Self> {
        let offset = FixedOffset::east_opt(cfg.utc_offset_minutes * 60).ok_or_else(|| {
            Error::Config(format!(
                "schedule.utc_offset_minutes {} is out of range",
                cfg.utc_offset_minutes
            ))
        })?;
        Ok(Self {
            offset,
            times: cfg.parsed_times()?,
        })
    }

    pub fn times(&self) -> &[NaiveTime] {
        &self.times
    }

    /// First scheduled instant strictly after `now`, rolling over to the
    /// next day after the last slot.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.with_timezone(&self.offset).date_naive();
        (0..=1)
            .filter_map(|d| today.checked_add_signed(Duration::days(d)))
            .flat_map(|day| self.times.iter().map(move |t| day.and_time(*t)))
            .filter_map(|local| self.offset.from_local_datetime(&local).single())
            .map(|dt| dt.with_timezone(&Utc))
            .find(|dt| *dt > now)
            // only reachable with an empty slot list, which from_config rejects
            .unwrap_or(now + Duration::days(1))
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, DurationRound, NaiveDateTime, TimeDelta, Timelike};

use crate::error::StrikeError;

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// One archive bucket. Names both the remote resource and the local cache file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeSlice(NaiveDateTime);

impl TimeSlice {
    pub fn timestamp(&self) -> NaiveDateTime {
        self.0
    }

    /// `{base}/{year}/{month}/{day}/{hour}/{minute}.json`, plus `.gz` for the compressed variant.
    pub fn resource_url(&self, base_url: &str, compressed: bool) -> String {
        let at = self.0;
        let suffix = if compressed { ".gz" } else { "" };
        format!(
            "{}/{}/{:02}/{:02}/{:02}/{:02}.json{suffix}",
            base_url.trim_end_matches('/'),
            at.year(),
            at.month(),
            at.day(),
            at.hour(),
            at.minute()
        )
    }

    pub fn cache_name(&self) -> String {
        format!("{}.json.gz", self.to_string().replace(':', "-"))
    }
}

impl fmt::Display for TimeSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%M:%S"))
    }
}

impl FromStr for TimeSlice {
    type Err = StrikeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        parse_timestamp(value).map(Self)
    }
}

pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, StrikeError> {
    let trimmed = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| StrikeError::InvalidTimestamp(value.to_string()))
}

/// Inclusive window walked at a fixed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: NaiveDateTime,
    end: NaiveDateTime,
    step: TimeDelta,
}

impl TimeRange {
    pub fn new(
        start: NaiveDateTime,
        end: NaiveDateTime,
        step: TimeDelta,
    ) -> Result<Self, StrikeError> {
        if step <= TimeDelta::zero() {
            return Err(StrikeError::InvalidStep(format!(
                "{} seconds",
                step.num_seconds()
            )));
        }
        Ok(Self { start, end, step })
    }

    pub fn with_step_minutes(
        start: NaiveDateTime,
        end: NaiveDateTime,
        step_minutes: u32,
    ) -> Result<Self, StrikeError> {
        if step_minutes == 0 {
            return Err(StrikeError::InvalidStep("0 minutes".to_string()));
        }
        Self::new(start, end, TimeDelta::minutes(i64::from(step_minutes)))
    }

    /// Rounds `start` down onto the step grid so every slice names a real archive bucket.
    pub fn aligned(self) -> Result<Self, StrikeError> {
        let start = self
            .start
            .duration_trunc(self.step)
            .map_err(|err| StrikeError::InvalidTimestamp(format!("{}: {err}", self.start)))?;
        Ok(Self { start, ..self })
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// Fresh iterator over `start, start + step, ...` while `<= end`. Empty when `start > end`.
    pub fn slices(&self) -> Slices {
        Slices {
            next: Some(self.start),
            end: self.end,
            step: self.step,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Slices {
    next: Option<NaiveDateTime>,
    end: NaiveDateTime,
    step: TimeDelta,
}

impl Iterator for Slices {
    type Item = TimeSlice;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        if current > self.end {
            self.next = None;
            return None;
        }
        self.next = current.checked_add_signed(self.step);
        Some(TimeSlice(current))
    }
}

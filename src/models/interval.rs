use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Half-open time range `[start, end)` in minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval {
    pub start: u32,
    pub end: u32,
}

impl Interval {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn from_start(start: u32, duration_minutes: u32) -> Self {
        Self {
            start,
            end: start.saturating_add(duration_minutes),
        }
    }

    pub fn width(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Back-to-back intervals do not overlap: `end` is exclusive.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl Serialize for Interval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Interval", 2)?;
        s.serialize_field("startTime", &format_time(self.start))?;
        s.serialize_field("endTime", &format_time(self.end))?;
        s.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time of day: {0}")]
pub struct InvalidTime(pub String);

/// Parse `HH:MM` (or `H:MM`) into minutes since midnight.
pub fn parse_time(s: &str) -> Result<u32, InvalidTime> {
    let (hour, minute) = split_time(s)?;
    if hour > 23 || minute > 59 {
        return Err(InvalidTime(s.to_string()));
    }
    Ok(hour * 60 + minute)
}

/// Like [`parse_time`] but also accepts `24:00`, which is only meaningful as a closing bound.
pub fn parse_window_bound(s: &str) -> Result<u32, InvalidTime> {
    let (hour, minute) = split_time(s)?;
    if (hour, minute) == (24, 0) {
        return Ok(MINUTES_PER_DAY);
    }
    parse_time(s)
}

fn split_time(s: &str) -> Result<(u32, u32), InvalidTime> {
    let invalid = || InvalidTime(s.to_string());
    let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return Err(invalid());
    }
    let hour: u32 = h.parse().map_err(|_| invalid())?;
    let minute: u32 = m.parse().map_err(|_| invalid())?;
    Ok((hour, minute))
}

pub fn format_time(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

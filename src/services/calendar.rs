use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, Utc};

use crate::models::{format_time, Interval, MINUTES_PER_DAY};

pub const DEFAULT_OPEN_MINUTES: u32 = 9 * 60;
pub const DEFAULT_CLOSE_MINUTES: u32 = 17 * 60;
pub const DEFAULT_SLOT_GRANULARITY_MINUTES: u32 = 30;
pub const DEFAULT_DURATION_MINUTES: u32 = 120;

/// Source of "now". Injected so date validation is testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("operating window {open}-{close} is empty or inverted")]
    EmptyWindow { open: String, close: String },
    #[error("operating window closes after midnight: {0}")]
    PastMidnight(String),
    #[error("slot granularity must be positive")]
    ZeroGranularity,
    #[error("default duration must be positive")]
    ZeroDuration,
}

/// Daily span during which work may be scheduled, `[open, close)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatingWindow {
    open: u32,
    close: u32,
}

impl OperatingWindow {
    pub fn new(open: u32, close: u32) -> Result<Self, PolicyError> {
        if close > MINUTES_PER_DAY {
            return Err(PolicyError::PastMidnight(format_time(close)));
        }
        if open >= close {
            return Err(PolicyError::EmptyWindow {
                open: format_time(open),
                close: format_time(close),
            });
        }
        Ok(Self { open, close })
    }

    pub fn open(&self) -> u32 {
        self.open
    }

    pub fn close(&self) -> u32 {
        self.close
    }

    pub fn as_interval(&self) -> Interval {
        Interval::new(self.open, self.close)
    }

    pub fn width(&self) -> u32 {
        self.close - self.open
    }

    pub fn contains(&self, interval: &Interval) -> bool {
        self.as_interval().contains(interval)
    }
}

impl Default for OperatingWindow {
    fn default() -> Self {
        Self {
            open: DEFAULT_OPEN_MINUTES,
            close: DEFAULT_CLOSE_MINUTES,
        }
    }
}

/// What counts as a valid booking time.
#[derive(Debug, Clone)]
pub struct CalendarPolicy {
    default_window: OperatingWindow,
    overrides: BTreeMap<NaiveDate, OperatingWindow>,
    slot_granularity_minutes: u32,
    default_duration_minutes: u32,
}

impl CalendarPolicy {
    pub fn new(
        default_window: OperatingWindow,
        slot_granularity_minutes: u32,
        default_duration_minutes: u32,
    ) -> Result<Self, PolicyError> {
        if slot_granularity_minutes == 0 {
            return Err(PolicyError::ZeroGranularity);
        }
        if default_duration_minutes == 0 {
            return Err(PolicyError::ZeroDuration);
        }
        Ok(Self {
            default_window,
            overrides: BTreeMap::new(),
            slot_granularity_minutes,
            default_duration_minutes,
        })
    }

    /// Replace the window for one specific date (holidays, short days).
    pub fn with_override(mut self, date: NaiveDate, window: OperatingWindow) -> Self {
        self.overrides.insert(date, window);
        self
    }

    pub fn operating_window(&self, date: NaiveDate) -> OperatingWindow {
        self.overrides
            .get(&date)
            .copied()
            .unwrap_or(self.default_window)
    }

    pub fn slot_granularity_minutes(&self) -> u32 {
        self.slot_granularity_minutes
    }

    pub fn default_duration_minutes(&self) -> u32 {
        self.default_duration_minutes
    }

    pub fn is_future_or_today(&self, date: NaiveDate, now: NaiveDateTime) -> bool {
        date >= now.date()
    }
}

impl Default for CalendarPolicy {
    fn default() -> Self {
        Self {
            default_window: OperatingWindow::default(),
            overrides: BTreeMap::new(),
            slot_granularity_minutes: DEFAULT_SLOT_GRANULARITY_MINUTES,
            default_duration_minutes: DEFAULT_DURATION_MINUTES,
        }
    }
}

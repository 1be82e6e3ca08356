use chrono::NaiveDate;

use super::interval::Interval;

/// Free/busy picture of one day on one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityReport {
    pub date: NaiveDate,
    pub resource_id: String,
    pub duration_minutes: u32,
    pub window: Interval,
    /// Every blocking interval, clamped to the window, in start order.
    pub booked: Vec<Interval>,
    /// Free gaps wide enough to host the requested duration.
    pub available: Vec<Interval>,
    /// Granularity-aligned start times at which the requested duration fits.
    pub chips: Vec<u32>,
}

use chrono::NaiveDate;
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{AvailabilityReport, Interval};
use crate::services::calendar::{CalendarPolicy, OperatingWindow};
use crate::services::scheduling::SchedulingError;

// ── Interval arithmetic ──

/// Merge start-sorted intervals that overlap or touch into disjoint intervals.
pub fn merge_overlapping(sorted: &[Interval]) -> Vec<Interval> {
    let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
    for &interval in sorted {
        if let Some(last) = merged.last_mut() {
            if interval.start <= last.end {
                last.end = last.end.max(interval.end);
                continue;
            }
        }
        merged.push(interval);
    }
    merged
}

/// Remove start-sorted, disjoint intervals from `base`, returning what is left.
pub fn subtract_intervals(base: Interval, to_remove: &[Interval]) -> Vec<Interval> {
    let mut result = Vec::new();
    let mut current_start = base.start;

    for r in to_remove {
        if r.end <= current_start {
            continue;
        }
        if r.start >= base.end {
            break;
        }
        if r.start > current_start {
            result.push(Interval::new(current_start, r.start));
        }
        current_start = current_start.max(r.end);
    }

    if current_start < base.end {
        result.push(Interval::new(current_start, base.end));
    }
    result
}

/// Existing intervals the proposal would collide with.
pub fn overlapping(blocking: &[Interval], proposed: &Interval) -> Vec<Interval> {
    blocking
        .iter()
        .filter(|b| b.overlaps(proposed))
        .copied()
        .collect()
}

/// Free gaps in the window that can host `duration_minutes`.
pub fn free_intervals(window: OperatingWindow, blocking: &[Interval], duration_minutes: u32) -> Vec<Interval> {
    let mut sorted = blocking.to_vec();
    sorted.sort();
    subtract_intervals(window.as_interval(), &merge_overlapping(&sorted))
        .into_iter()
        .filter(|gap| gap.width() >= duration_minutes)
        .collect()
}

/// Granularity-aligned start times (counted from opening) at which the whole
/// duration fits inside one of the free gaps.
pub fn chips(
    window: OperatingWindow,
    available: &[Interval],
    duration_minutes: u32,
    granularity_minutes: u32,
) -> Vec<u32> {
    let step = granularity_minutes.max(1) as usize;
    (window.open()..window.close())
        .step_by(step)
        .filter(|&start| {
            let candidate = Interval::from_start(start, duration_minutes);
            available.iter().any(|gap| gap.contains(&candidate))
        })
        .collect()
}

pub fn compute_report(
    date: NaiveDate,
    resource_id: &str,
    window: OperatingWindow,
    blocking: &[Interval],
    duration_minutes: u32,
    granularity_minutes: u32,
) -> AvailabilityReport {
    let bounds = window.as_interval();
    let mut booked: Vec<Interval> = blocking
        .iter()
        .filter(|b| b.overlaps(&bounds))
        .map(|b| Interval::new(b.start.max(bounds.start), b.end.min(bounds.end)))
        .collect();
    booked.sort();

    let available = free_intervals(window, blocking, duration_minutes);
    let chips = chips(window, &available, duration_minutes, granularity_minutes);

    AvailabilityReport {
        date,
        resource_id: resource_id.to_string(),
        duration_minutes,
        window: bounds,
        booked,
        available,
        chips,
    }
}

/// Reject durations that can never be scheduled on `window`, whatever is booked.
pub fn validate_duration(window: OperatingWindow, duration_minutes: u32) -> Result<(), SchedulingError> {
    if duration_minutes == 0 {
        return Err(SchedulingError::InvalidRequest(
            "durationMinutes must be positive".to_string(),
        ));
    }
    if duration_minutes > window.width() {
        return Err(SchedulingError::DurationExceedsWindow {
            duration: duration_minutes,
            window: window.width(),
        });
    }
    Ok(())
}

/// Free/busy report for `date`, read straight from the store.
pub fn check_availability(
    conn: &Connection,
    policy: &CalendarPolicy,
    date: NaiveDate,
    resource_id: &str,
    duration_minutes: Option<u32>,
) -> Result<AvailabilityReport, SchedulingError> {
    let duration = duration_minutes.unwrap_or_else(|| policy.default_duration_minutes());
    let window = policy.operating_window(date);
    validate_duration(window, duration)?;

    let blocking = queries::find_blocking_intervals(conn, &date, resource_id)?;

    Ok(compute_report(
        date,
        resource_id,
        window,
        &blocking,
        duration,
        policy.slot_granularity_minutes(),
    ))
}

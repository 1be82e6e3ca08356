use std::sync::Arc;

use chrono::NaiveDate;
use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::models::{
    AvailabilityReport, EnquiryAction, EnquiryStatus, Interval, ServiceCategory, ServiceEnquiry,
    DEFAULT_RESOURCE,
};
use crate::services::availability;
use crate::services::calendar::{CalendarPolicy, Clock};
use crate::services::retry::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("a {duration}-minute booking cannot fit in the {window}-minute operating window")]
    DurationExceedsWindow { duration: u32, window: u32 },

    #[error("requested time overlaps {} existing booking(s)", .conflicts.len())]
    SlotConflict {
        conflicts: Vec<Interval>,
        /// Intervals that could host the same duration right now.
        available: Vec<Interval>,
    },

    #[error("cannot {action} an enquiry that is {from}")]
    InvalidTransition {
        from: EnquiryStatus,
        action: EnquiryAction,
    },

    #[error("enquiry not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("storage temporarily unavailable: {0}")]
    Transient(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl SchedulingError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SchedulingError::Transient(_))
    }
}

/// Lock contention clears on its own and is worth retrying; anything else is a fault.
impl From<rusqlite::Error> for SchedulingError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(e.code, rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked) =>
            {
                SchedulingError::Transient(err.to_string())
            }
            _ => SchedulingError::Storage(err.to_string()),
        }
    }
}

/// Trimmed resource id, `DEFAULT_RESOURCE` when absent. Blank ids are rejected.
pub fn normalize_resource(resource_id: Option<&str>) -> Result<String, SchedulingError> {
    match resource_id.map(str::trim) {
        None => Ok(DEFAULT_RESOURCE.to_string()),
        Some("") => Err(SchedulingError::InvalidRequest("resourceId must not be empty".to_string())),
        Some(r) => Ok(r.to_string()),
    }
}

/// A booking request as submitted, before validation.
#[derive(Debug, Clone)]
pub struct NewEnquiry {
    pub requester_id: String,
    pub category: ServiceCategory,
    pub resource_id: Option<String>,
    pub date: NaiveDate,
    pub start_minute: u32,
    pub duration_minutes: Option<u32>,
    pub metadata: serde_json::Value,
}

/// Validated proposal, ready for the atomic check-and-insert.
struct Proposal {
    requester_id: String,
    category: ServiceCategory,
    resource_id: String,
    date: NaiveDate,
    interval: Interval,
    metadata: serde_json::Value,
}

pub struct Scheduler {
    pub calendar: CalendarPolicy,
    pub clock: Arc<dyn Clock>,
    pub retry: RetryPolicy,
}

impl Scheduler {
    pub fn new(calendar: CalendarPolicy, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self {
            calendar,
            clock,
            retry,
        }
    }

    pub fn availability(
        &self,
        conn: &Connection,
        date: NaiveDate,
        resource_id: Option<&str>,
        duration_minutes: Option<u32>,
    ) -> Result<AvailabilityReport, SchedulingError> {
        let resource_id = normalize_resource(resource_id)?;
        availability::check_availability(conn, &self.calendar, date, &resource_id, duration_minutes)
    }

    /// The only way a new enquiry comes into existence.
    ///
    /// The overlap test runs against the blocking set read inside the same
    /// immediate transaction as the insert, never against a caller's view.
    pub fn create_enquiry(
        &self,
        conn: &mut Connection,
        request: NewEnquiry,
    ) -> Result<ServiceEnquiry, SchedulingError> {
        let proposal = self.validate(request)?;

        let result = self.retry.retry_if(
            |_| self.try_insert(conn, &proposal),
            SchedulingError::is_transient,
        );

        match &result {
            Ok(enquiry) => tracing::info!(
                enquiry_id = %enquiry.id,
                requester_id = %enquiry.requester_id,
                date = %enquiry.requested_date,
                resource_id = %enquiry.resource_id,
                start = enquiry.start_minute,
                duration = enquiry.duration_minutes,
                "enquiry created"
            ),
            Err(SchedulingError::SlotConflict { conflicts, .. }) => tracing::debug!(
                date = %proposal.date,
                resource_id = %proposal.resource_id,
                conflicts = conflicts.len(),
                "enquiry rejected: slot conflict"
            ),
            Err(e @ (SchedulingError::Transient(_) | SchedulingError::Storage(_))) => tracing::error!(
                date = %proposal.date,
                error = %e,
                "enquiry creation failed"
            ),
            Err(_) => {}
        }

        result
    }

    fn validate(&self, request: NewEnquiry) -> Result<Proposal, SchedulingError> {
        let requester_id = request.requester_id.trim().to_string();
        if requester_id.is_empty() {
            return Err(SchedulingError::InvalidRequest("requesterId is required".to_string()));
        }

        let resource_id = normalize_resource(request.resource_id.as_deref())?;

        let now = self.clock.now();
        if !self.calendar.is_future_or_today(request.date, now) {
            return Err(SchedulingError::InvalidRequest(format!(
                "requested date {} is in the past",
                request.date
            )));
        }

        let window = self.calendar.operating_window(request.date);
        let duration = request
            .duration_minutes
            .unwrap_or_else(|| self.calendar.default_duration_minutes());
        availability::validate_duration(window, duration)?;

        let interval = Interval::from_start(request.start_minute, duration);
        if !window.contains(&interval) {
            return Err(SchedulingError::InvalidRequest(format!(
                "{}-{} falls outside operating hours {}-{}",
                crate::models::format_time(interval.start),
                crate::models::format_time(interval.end),
                crate::models::format_time(window.open()),
                crate::models::format_time(window.close()),
            )));
        }

        if !(request.metadata.is_object() || request.metadata.is_null()) {
            return Err(SchedulingError::InvalidRequest("metadata must be a JSON object".to_string()));
        }

        Ok(Proposal {
            requester_id,
            category: request.category,
            resource_id,
            date: request.date,
            interval,
            metadata: request.metadata,
        })
    }

    fn try_insert(&self, conn: &mut Connection, proposal: &Proposal) -> Result<ServiceEnquiry, SchedulingError> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let blocking = queries::find_blocking_intervals(&tx, &proposal.date, &proposal.resource_id)?;
        let conflicts = availability::overlapping(&blocking, &proposal.interval);
        if !conflicts.is_empty() {
            return Err(self.conflict(proposal, &blocking, conflicts));
        }

        let now = self.clock.now();
        let enquiry = ServiceEnquiry {
            id: uuid::Uuid::new_v4().to_string(),
            requester_id: proposal.requester_id.clone(),
            category: proposal.category,
            resource_id: proposal.resource_id.clone(),
            requested_date: proposal.date,
            start_minute: proposal.interval.start,
            duration_minutes: proposal.interval.width(),
            status: EnquiryStatus::Requested,
            metadata: proposal.metadata.clone(),
            created_at: now,
            updated_at: now,
        };

        match queries::insert_enquiry(&tx, &enquiry) {
            Ok(()) => {}
            Err(e) if queries::is_slot_conflict(&e) => {
                // Storage trigger caught what the read missed; report what it sees now.
                let blocking = queries::find_blocking_intervals(&tx, &proposal.date, &proposal.resource_id)?;
                let conflicts = availability::overlapping(&blocking, &proposal.interval);
                return Err(self.conflict(proposal, &blocking, conflicts));
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit()?;
        Ok(enquiry)
    }

    fn conflict(&self, proposal: &Proposal, blocking: &[Interval], conflicts: Vec<Interval>) -> SchedulingError {
        let window = self.calendar.operating_window(proposal.date);
        SchedulingError::SlotConflict {
            conflicts,
            available: availability::free_intervals(window, blocking, proposal.interval.width()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::services::calendar::{FixedClock, OperatingWindow};
    use chrono::NaiveDateTime;
    use proptest::prelude::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn t(s: &str) -> u32 {
        crate::models::parse_time(s).unwrap()
    }

    fn scheduler() -> Scheduler {
        let now = NaiveDateTime::parse_from_str("2030-03-01 08:00", "%Y-%m-%d %H:%M").unwrap();
        Scheduler::new(
            CalendarPolicy::default(),
            Arc::new(FixedClock(now)),
            RetryPolicy::new(3, 1, 5),
        )
    }

    fn request(day: &str, start: &str, duration: Option<u32>) -> NewEnquiry {
        NewEnquiry {
            requester_id: "cust-1".to_string(),
            category: ServiceCategory::Planing,
            resource_id: None,
            date: date(day),
            start_minute: t(start),
            duration_minutes: duration,
            metadata: serde_json::json!({"quantity": 10, "woodType": "pine"}),
        }
    }

    #[test]
    fn test_create_defaults_duration_and_status() {
        let mut conn = db::init_db(":memory:").unwrap();
        let enquiry = scheduler()
            .create_enquiry(&mut conn, request("2030-03-05", "11:00", None))
            .unwrap();

        assert_eq!(enquiry.status, EnquiryStatus::Requested);
        assert_eq!(enquiry.duration_minutes, 120);
        assert_eq!(enquiry.resource_id, DEFAULT_RESOURCE);
        assert_eq!(enquiry.interval(), Interval::new(t("11:00"), t("13:00")));

        let stored = queries::get_enquiry_by_id(&conn, &enquiry.id).unwrap().unwrap();
        assert_eq!(stored, enquiry);
    }

    #[test]
    fn test_window_boundary() {
        let mut conn = db::init_db(":memory:").unwrap();
        let s = scheduler();

        assert!(s.create_enquiry(&mut conn, request("2030-03-05", "16:30", Some(30))).is_ok());

        let err = s
            .create_enquiry(&mut conn, request("2030-03-06", "16:30", Some(31)))
            .unwrap_err();
        assert!(matches!(err, SchedulingError::InvalidRequest(_)), "{err:?}");

        let err = s
            .create_enquiry(&mut conn, request("2030-03-06", "08:30", Some(60)))
            .unwrap_err();
        assert!(matches!(err, SchedulingError::InvalidRequest(_)));
    }

    #[test]
    fn test_back_to_back_acceptance() {
        let mut conn = db::init_db(":memory:").unwrap();
        let s = scheduler();
        s.create_enquiry(&mut conn, request("2030-03-05", "09:00", Some(120))).unwrap();
        s.create_enquiry(&mut conn, request("2030-03-05", "11:00", Some(120))).unwrap();
    }

    #[test]
    fn test_past_date_rejected_even_when_free() {
        let mut conn = db::init_db(":memory:").unwrap();
        let err = scheduler()
            .create_enquiry(&mut conn, request("2030-02-28", "10:00", Some(60)))
            .unwrap_err();
        assert!(matches!(err, SchedulingError::InvalidRequest(_)));

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM enquiries", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_today_is_bookable() {
        let mut conn = db::init_db(":memory:").unwrap();
        assert!(scheduler()
            .create_enquiry(&mut conn, request("2030-03-01", "10:00", Some(60)))
            .is_ok());
    }

    #[test]
    fn test_conflict_reports_overlaps_and_alternatives() {
        let mut conn = db::init_db(":memory:").unwrap();
        let s = scheduler();
        s.create_enquiry(&mut conn, request("2030-03-05", "10:00", Some(120))).unwrap();

        let err = s
            .create_enquiry(&mut conn, request("2030-03-05", "11:00", Some(120)))
            .unwrap_err();
        match err {
            SchedulingError::SlotConflict { conflicts, available } => {
                assert_eq!(conflicts, vec![Interval::new(t("10:00"), t("12:00"))]);
                assert_eq!(available, vec![Interval::new(t("12:00"), t("17:00"))]);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_inputs() {
        let mut conn = db::init_db(":memory:").unwrap();
        let s = scheduler();

        let err = s
            .create_enquiry(&mut conn, request("2030-03-05", "10:00", Some(0)))
            .unwrap_err();
        assert!(matches!(err, SchedulingError::InvalidRequest(_)));

        let err = s
            .create_enquiry(&mut conn, request("2030-03-05", "09:00", Some(481)))
            .unwrap_err();
        assert!(matches!(err, SchedulingError::DurationExceedsWindow { .. }));

        let mut blank = request("2030-03-05", "10:00", None);
        blank.requester_id = "  ".to_string();
        assert!(matches!(
            s.create_enquiry(&mut conn, blank),
            Err(SchedulingError::InvalidRequest(_))
        ));

        let mut scalar = request("2030-03-05", "10:00", None);
        scalar.metadata = serde_json::json!("just a string");
        assert!(matches!(
            s.create_enquiry(&mut conn, scalar),
            Err(SchedulingError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_resources_have_independent_timelines() {
        let mut conn = db::init_db(":memory:").unwrap();
        let s = scheduler();
        s.create_enquiry(&mut conn, request("2030-03-05", "10:00", Some(120))).unwrap();

        let mut second_line = request("2030-03-05", "10:00", Some(120));
        second_line.resource_id = Some("line-2".to_string());
        s.create_enquiry(&mut conn, second_line).unwrap();
    }

    #[test]
    fn test_availability_and_create_agree_on_resource_ids() {
        let mut conn = db::init_db(":memory:").unwrap();
        let s = scheduler();
        let mut padded = request("2030-03-05", "10:00", Some(120));
        padded.resource_id = Some(" line-2 ".to_string());
        let stored = s.create_enquiry(&mut conn, padded).unwrap();
        assert_eq!(stored.resource_id, "line-2");

        for id in [" line-2 ", "line-2"] {
            let report = s.availability(&conn, date("2030-03-05"), Some(id), Some(60)).unwrap();
            assert_eq!(report.resource_id, "line-2");
            assert_eq!(report.booked, vec![Interval::new(t("10:00"), t("12:00"))]);
        }

        assert!(matches!(
            s.availability(&conn, date("2030-03-05"), Some("  "), None),
            Err(SchedulingError::InvalidRequest(_))
        ));
        let mut blank = request("2030-03-05", "13:00", Some(60));
        blank.resource_id = Some(String::new());
        assert!(matches!(
            s.create_enquiry(&mut conn, blank),
            Err(SchedulingError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_only_lock_contention_is_transient() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        );
        assert!(SchedulingError::from(busy).is_transient());

        let locked = rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED), None);
        assert!(SchedulingError::from(locked).is_transient());

        let corrupt = SchedulingError::from(rusqlite::Error::InvalidColumnType(
            0,
            "status".to_string(),
            rusqlite::types::Type::Integer,
        ));
        assert!(matches!(corrupt, SchedulingError::Storage(_)));
        assert!(!corrupt.is_transient());
    }

    #[test]
    fn test_window_override_is_honoured() {
        let mut conn = db::init_db(":memory:").unwrap();
        let mut s = scheduler();
        s.calendar = CalendarPolicy::default()
            .with_override(date("2030-03-05"), OperatingWindow::new(t("10:00"), t("12:00")).unwrap());

        assert!(matches!(
            s.create_enquiry(&mut conn, request("2030-03-05", "09:00", Some(60))),
            Err(SchedulingError::InvalidRequest(_))
        ));
        assert!(matches!(
            s.create_enquiry(&mut conn, request("2030-03-05", "10:00", Some(180))),
            Err(SchedulingError::DurationExceedsWindow { .. })
        ));
        s.create_enquiry(&mut conn, request("2030-03-06", "09:00", Some(60))).unwrap();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn accepted_enquiries_never_overlap(
            attempts in prop::collection::vec((0u32..480, 1u32..240), 1..25)
        ) {
            let mut conn = db::init_db(":memory:").unwrap();
            let s = scheduler();
            let day = date("2030-03-05");
            let mut accepted: Vec<Interval> = Vec::new();

            for (offset, duration) in attempts {
                let start = t("09:00") + offset;
                let proposed = Interval::from_start(start, duration);
                let fits = proposed.end <= t("17:00");
                let clashes = accepted.iter().any(|a| a.overlaps(&proposed));

                let mut req = request("2030-03-05", "09:00", Some(duration));
                req.start_minute = start;
                match s.create_enquiry(&mut conn, req) {
                    Ok(_) => {
                        prop_assert!(fits && !clashes);
                        accepted.push(proposed);
                    }
                    Err(SchedulingError::SlotConflict { conflicts, .. }) => {
                        prop_assert!(fits && clashes);
                        prop_assert!(conflicts.iter().all(|c| c.overlaps(&proposed)));
                    }
                    Err(SchedulingError::InvalidRequest(_)) => prop_assert!(!fits),
                    Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
                }
            }

            let stored = queries::find_blocking_intervals(&conn, &day, DEFAULT_RESOURCE).unwrap();
            for (i, a) in stored.iter().enumerate() {
                for b in &stored[i + 1..] {
                    prop_assert!(!a.overlaps(b), "{a:?} overlaps {b:?}");
                }
            }
        }
    }
}

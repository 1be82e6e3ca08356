use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime};

use sawmill_scheduler::db::{self, DbPool, PoolOptions};
use sawmill_scheduler::models::{Actor, EnquiryAction, EnquiryStatus, ServiceCategory, ServiceEnquiry};
use sawmill_scheduler::services::lifecycle;
use sawmill_scheduler::services::calendar::{CalendarPolicy, FixedClock};
use sawmill_scheduler::services::retry::RetryPolicy;
use sawmill_scheduler::services::scheduling::{NewEnquiry, Scheduler, SchedulingError};

const WORKERS: usize = 8;

fn db_path(dir: &tempfile::TempDir) -> String {
    dir.path().join("scheduler.db").to_str().unwrap().to_string()
}

fn pool_with_timeout(dir: &tempfile::TempDir, busy_timeout: Duration) -> DbPool {
    let options = PoolOptions {
        max_size: WORKERS as u32,
        busy_timeout,
        checkout_timeout: Duration::from_secs(10),
    };
    db::init_pool(&db_path(dir), &options).unwrap()
}

fn file_pool(dir: &tempfile::TempDir) -> DbPool {
    pool_with_timeout(dir, Duration::from_secs(5))
}

fn now() -> NaiveDateTime {
    NaiveDateTime::parse_from_str("2030-03-01 08:00", "%Y-%m-%d %H:%M").unwrap()
}

fn scheduler_with_retry(retry: RetryPolicy) -> Arc<Scheduler> {
    Arc::new(Scheduler::new(CalendarPolicy::default(), Arc::new(FixedClock(now())), retry))
}

fn scheduler() -> Arc<Scheduler> {
    scheduler_with_retry(RetryPolicy::new(10, 5, 50))
}

fn request(requester: String, date: NaiveDate, start_minute: u32, duration: u32) -> NewEnquiry {
    NewEnquiry {
        requester_id: requester,
        category: ServiceCategory::Sawing,
        resource_id: None,
        date,
        start_minute,
        duration_minutes: Some(duration),
        metadata: serde_json::Value::Null,
    }
}

/// Fire one request per worker at the same instant, each on its own pooled connection.
fn race<F>(pool: &DbPool, scheduler: &Arc<Scheduler>, make: F) -> Vec<Result<ServiceEnquiry, SchedulingError>>
where
    F: Fn(usize) -> NewEnquiry,
{
    let barrier = Arc::new(Barrier::new(WORKERS));
    let handles: Vec<_> = (0..WORKERS)
        .map(|i| {
            let pool = pool.clone();
            let scheduler = Arc::clone(scheduler);
            let barrier = Arc::clone(&barrier);
            let req = make(i);
            thread::spawn(move || {
                let mut conn = pool.get().unwrap();
                barrier.wait();
                scheduler.create_enquiry(&mut conn, req)
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn test_overlapping_requests_admit_exactly_one() {
    let dir = tempfile::tempdir().unwrap();
    let pool = file_pool(&dir);
    let scheduler = scheduler();
    let date = NaiveDate::from_ymd_opt(2030, 3, 5).unwrap();

    // Every request covers 10:30-11:30, so no two can coexist.
    let results = race(&pool, &scheduler, |i| {
        request(format!("cust-{i}"), date, 600 + (i as u32 % 3) * 15, 90)
    });

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(SchedulingError::SlotConflict { .. })))
        .count();
    assert_eq!(accepted, 1, "{results:?}");
    assert_eq!(conflicts, WORKERS - 1, "{results:?}");

    let conn = pool.get().unwrap();
    let stored = db::queries::find_blocking_by_date(&conn, &date, "primary").unwrap();
    assert_eq!(stored.len(), 1);
}

#[test]
fn test_disjoint_requests_all_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let pool = file_pool(&dir);
    let scheduler = scheduler();
    let date = NaiveDate::from_ymd_opt(2030, 3, 5).unwrap();

    // Back-to-back half hours from opening.
    let results = race(&pool, &scheduler, |i| {
        request(format!("cust-{i}"), date, 540 + i as u32 * 30, 30)
    });
    assert!(results.iter().all(|r| r.is_ok()), "{results:?}");

    let conn = pool.get().unwrap();
    let stored = db::queries::find_blocking_by_date(&conn, &date, "primary").unwrap();
    assert_eq!(stored.len(), WORKERS);
    for pair in stored.windows(2) {
        assert!(!pair[0].interval().overlaps(&pair[1].interval()));
    }
}

#[test]
fn test_same_slot_on_different_days_all_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let pool = file_pool(&dir);
    let scheduler = scheduler();

    let results = race(&pool, &scheduler, |i| {
        let date = NaiveDate::from_ymd_opt(2030, 3, 5 + i as u32).unwrap();
        request(format!("cust-{i}"), date, 600, 120)
    });
    assert!(results.iter().all(|r| r.is_ok()), "{results:?}");
}

#[test]
fn test_held_write_lock_surfaces_transient_after_bounded_retries() {
    let dir = tempfile::tempdir().unwrap();
    let pool = pool_with_timeout(&dir, Duration::from_millis(30));
    let scheduler = scheduler_with_retry(RetryPolicy::new(3, 5, 20));
    let date = NaiveDate::from_ymd_opt(2030, 3, 5).unwrap();

    let blocker = rusqlite::Connection::open(db_path(&dir)).unwrap();
    blocker.execute_batch("BEGIN IMMEDIATE").unwrap();

    let mut conn = pool.get().unwrap();
    let started = Instant::now();
    let err = scheduler
        .create_enquiry(&mut conn, request("cust-1".to_string(), date, 600, 60))
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, SchedulingError::Transient(_)), "{err:?}");
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");

    blocker.execute_batch("ROLLBACK").unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM enquiries", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);

    // Once the lock is gone the same request goes through.
    assert!(scheduler
        .create_enquiry(&mut conn, request("cust-1".to_string(), date, 600, 60))
        .is_ok());
}

#[test]
fn test_racing_reject_and_cancel_have_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let pool = file_pool(&dir);
    let scheduler = scheduler();
    let date = NaiveDate::from_ymd_opt(2030, 3, 5).unwrap();

    for round in 0..10u32 {
        let enquiry = {
            let mut conn = pool.get().unwrap();
            scheduler
                .create_enquiry(&mut conn, request("cust-1".to_string(), date, 540 + round * 30, 30))
                .unwrap()
        };

        // Reject and cancel are mutually exclusive: each is illegal once the other lands.
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [
            (Actor::Admin, EnquiryAction::Reject),
            (Actor::Requester("cust-1".to_string()), EnquiryAction::Cancel),
        ]
        .into_iter()
        .map(|(actor, action)| {
            let pool = pool.clone();
            let barrier = Arc::clone(&barrier);
            let id = enquiry.id.clone();
            thread::spawn(move || {
                let conn = pool.get().unwrap();
                barrier.wait();
                lifecycle::apply_action(&conn, &actor, &id, action, now())
            })
        })
        .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners: Vec<&ServiceEnquiry> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1, "{results:?}");
        let final_status = winners[0].status;
        assert!(matches!(final_status, EnquiryStatus::Rejected | EnquiryStatus::Cancelled));

        let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert!(
            matches!(loser, SchedulingError::InvalidTransition { from, .. } if *from == final_status),
            "{loser:?}"
        );

        let conn = pool.get().unwrap();
        let stored = db::queries::get_enquiry_by_id(&conn, &enquiry.id).unwrap().unwrap();
        assert_eq!(stored.status, final_status);
    }
}

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::{ToSql, Type};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{EnquiryStatus, Interval, ServiceCategory, ServiceEnquiry};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

const ENQUIRY_COLUMNS: &str = "id, requester_id, service_category, resource_id, requested_date, \
     start_minute, duration_minutes, status, metadata, created_at, updated_at";

/// Message raised by the overlap triggers in the schema.
pub const SLOT_CONFLICT_MARKER: &str = "slot_conflict";

// ── Enquiries ──

pub fn insert_enquiry(conn: &Connection, enquiry: &ServiceEnquiry) -> rusqlite::Result<()> {
    let metadata = match &enquiry.metadata {
        serde_json::Value::Null => None,
        value => Some(value.to_string()),
    };

    conn.execute(
        "INSERT INTO enquiries (id, requester_id, service_category, resource_id, requested_date,
                                start_minute, duration_minutes, status, metadata, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            enquiry.id,
            enquiry.requester_id,
            enquiry.category.as_str(),
            enquiry.resource_id,
            format_date(&enquiry.requested_date),
            enquiry.start_minute,
            enquiry.duration_minutes,
            enquiry.status.as_str(),
            metadata,
            format_timestamp(&enquiry.created_at),
            format_timestamp(&enquiry.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_enquiry_by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<ServiceEnquiry>> {
    conn.query_row(
        &format!("SELECT {ENQUIRY_COLUMNS} FROM enquiries WHERE id = ?1"),
        params![id],
        parse_enquiry_row,
    )
    .optional()
}

/// The blocking set: enquiries on `date` and `resource_id` that still occupy time,
/// ordered by start.
pub fn find_blocking_by_date(
    conn: &Connection,
    date: &NaiveDate,
    resource_id: &str,
) -> rusqlite::Result<Vec<ServiceEnquiry>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {ENQUIRY_COLUMNS} FROM enquiries
         WHERE requested_date = ?1 AND resource_id = ?2 AND status IN ('requested', 'confirmed')
         ORDER BY start_minute ASC"
    ))?;

    let rows = stmt.query_map(params![format_date(date), resource_id], parse_enquiry_row)?;
    rows.collect()
}

pub fn find_blocking_intervals(
    conn: &Connection,
    date: &NaiveDate,
    resource_id: &str,
) -> rusqlite::Result<Vec<Interval>> {
    Ok(find_blocking_by_date(conn, date, resource_id)?
        .iter()
        .map(ServiceEnquiry::interval)
        .collect())
}

pub fn find_by_requester(conn: &Connection, requester_id: &str) -> rusqlite::Result<Vec<ServiceEnquiry>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {ENQUIRY_COLUMNS} FROM enquiries
         WHERE requester_id = ?1
         ORDER BY requested_date DESC, start_minute ASC"
    ))?;

    let rows = stmt.query_map(params![requester_id], parse_enquiry_row)?;
    rows.collect()
}

/// Compare-and-swap on status. Returns `false` when the row is missing or its
/// status is no longer `from`.
pub fn update_status(
    conn: &Connection,
    id: &str,
    from: EnquiryStatus,
    to: EnquiryStatus,
    now: &NaiveDateTime,
) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE enquiries SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
        params![to.as_str(), format_timestamp(now), id, from.as_str()],
    )?;
    Ok(count > 0)
}

#[derive(Debug, Default, Clone)]
pub struct EnquiryFilter {
    pub status: Option<EnquiryStatus>,
    pub date: Option<NaiveDate>,
    pub resource_id: Option<String>,
    pub limit: i64,
}

pub fn list_enquiries(conn: &Connection, filter: &EnquiryFilter) -> rusqlite::Result<Vec<ServiceEnquiry>> {
    let mut clauses = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(status) = filter.status {
        values.push(Box::new(status.as_str()));
        clauses.push(format!("status = ?{}", values.len()));
    }
    if let Some(date) = &filter.date {
        values.push(Box::new(format_date(date)));
        clauses.push(format!("requested_date = ?{}", values.len()));
    }
    if let Some(resource_id) = &filter.resource_id {
        values.push(Box::new(resource_id.clone()));
        clauses.push(format!("resource_id = ?{}", values.len()));
    }
    values.push(Box::new(filter.limit));
    let limit_param = values.len();

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let sql = format!(
        "SELECT {ENQUIRY_COLUMNS} FROM enquiries {where_clause}
         ORDER BY requested_date DESC, start_minute ASC LIMIT ?{limit_param}"
    );

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn ToSql> = values.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), parse_enquiry_row)?;
    rows.collect()
}

pub fn is_slot_conflict(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, Some(msg))
            if e.code == rusqlite::ErrorCode::ConstraintViolation && msg.contains(SLOT_CONFLICT_MARKER)
    )
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognised {column} value: {value}")]
struct UnrecognisedValue {
    column: &'static str,
    value: String,
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_enquiry_row(row: &rusqlite::Row) -> rusqlite::Result<ServiceEnquiry> {
    let category_str: String = row.get(2)?;
    let date_str: String = row.get(4)?;
    let status_str: String = row.get(7)?;
    let metadata_str: Option<String> = row.get(8)?;
    let created_at_str: String = row.get(9)?;
    let updated_at_str: String = row.get(10)?;

    let category = ServiceCategory::parse(&category_str).ok_or_else(|| {
        conversion_error(2, UnrecognisedValue { column: "service_category", value: category_str.clone() })
    })?;
    let requested_date =
        NaiveDate::parse_from_str(&date_str, DATE_FORMAT).map_err(|e| conversion_error(4, e))?;
    let status = EnquiryStatus::parse(&status_str).ok_or_else(|| {
        conversion_error(7, UnrecognisedValue { column: "status", value: status_str.clone() })
    })?;
    let metadata = match metadata_str {
        Some(s) => serde_json::from_str(&s).map_err(|e| conversion_error(8, e))?,
        None => serde_json::Value::Null,
    };
    let created_at = NaiveDateTime::parse_from_str(&created_at_str, TIMESTAMP_FORMAT)
        .map_err(|e| conversion_error(9, e))?;
    let updated_at = NaiveDateTime::parse_from_str(&updated_at_str, TIMESTAMP_FORMAT)
        .map_err(|e| conversion_error(10, e))?;

    Ok(ServiceEnquiry {
        id: row.get(0)?,
        requester_id: row.get(1)?,
        category,
        resource_id: row.get(3)?,
        requested_date,
        start_minute: row.get(5)?,
        duration_minutes: row.get(6)?,
        status,
        metadata,
        created_at,
        updated_at,
    })
}

fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{Actor, EnquiryAction, ServiceEnquiry};
use crate::services::scheduling::SchedulingError;

/// Whether `actor` may apply `action` to `enquiry`, assuming the transition itself is legal.
fn authorize(actor: &Actor, action: EnquiryAction, enquiry: &ServiceEnquiry) -> Result<(), SchedulingError> {
    let allowed = match action {
        EnquiryAction::Confirm | EnquiryAction::Reject => actor.is_admin(),
        EnquiryAction::Cancel => actor.is_admin() || actor.owns(&enquiry.requester_id),
        EnquiryAction::Complete => matches!(actor, Actor::Admin | Actor::System),
    };
    if allowed {
        Ok(())
    } else {
        Err(SchedulingError::Forbidden(format!(
            "{} may not {action} enquiry {}",
            actor.label(),
            enquiry.id
        )))
    }
}

/// Reads are open to admins and the owning requester only.
fn ensure_visible(actor: &Actor, enquiry: &ServiceEnquiry) -> Result<(), SchedulingError> {
    if actor.is_admin() || actor.owns(&enquiry.requester_id) {
        Ok(())
    } else {
        Err(SchedulingError::Forbidden(format!(
            "{} may not view enquiry {}",
            actor.label(),
            enquiry.id
        )))
    }
}

fn find_enquiry(conn: &Connection, id: &str) -> Result<ServiceEnquiry, SchedulingError> {
    queries::get_enquiry_by_id(conn, id)?.ok_or_else(|| SchedulingError::NotFound(id.to_string()))
}

pub fn get_enquiry(conn: &Connection, actor: &Actor, id: &str) -> Result<ServiceEnquiry, SchedulingError> {
    let enquiry = find_enquiry(conn, id)?;
    ensure_visible(actor, &enquiry)?;
    Ok(enquiry)
}

/// Advance an enquiry through its state machine.
///
/// The write is a compare-and-swap on the status read here; if another actor got
/// there first the transition is re-judged against the fresh status.
pub fn apply_action(
    conn: &Connection,
    actor: &Actor,
    id: &str,
    action: EnquiryAction,
    now: NaiveDateTime,
) -> Result<ServiceEnquiry, SchedulingError> {
    let enquiry = find_enquiry(conn, id)?;
    // The system actor cannot read enquiries but may still complete them.
    if !matches!(actor, Actor::System) {
        ensure_visible(actor, &enquiry)?;
    }
    transition(conn, actor, enquiry, action, now)
}

/// Judge and write `action` against `enquiry` as it was read.
fn transition(
    conn: &Connection,
    actor: &Actor,
    mut enquiry: ServiceEnquiry,
    action: EnquiryAction,
    now: NaiveDateTime,
) -> Result<ServiceEnquiry, SchedulingError> {
    let target = enquiry
        .status
        .apply(action)
        .ok_or(SchedulingError::InvalidTransition {
            from: enquiry.status,
            action,
        })?;
    authorize(actor, action, &enquiry)?;

    if !queries::update_status(conn, &enquiry.id, enquiry.status, target, &now)? {
        let current = find_enquiry(conn, &enquiry.id)?;
        tracing::debug!(enquiry_id = %enquiry.id, expected = %enquiry.status, found = %current.status, "status changed concurrently");
        return Err(SchedulingError::InvalidTransition {
            from: current.status,
            action,
        });
    }

    tracing::info!(
        enquiry_id = %enquiry.id,
        actor = actor.label(),
        from = %enquiry.status,
        to = %target,
        "enquiry status changed"
    );

    enquiry.status = target;
    enquiry.updated_at = now;
    Ok(enquiry)
}

pub fn enquiries_for_requester(
    conn: &Connection,
    actor: &Actor,
    requester_id: &str,
) -> Result<Vec<ServiceEnquiry>, SchedulingError> {
    if !(actor.is_admin() || actor.owns(requester_id)) {
        return Err(SchedulingError::Forbidden(format!(
            "{} may not list enquiries of {requester_id}",
            actor.label()
        )));
    }
    Ok(queries::find_by_requester(conn, requester_id)?)
}

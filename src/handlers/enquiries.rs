use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::handlers::{identify, with_db};
use crate::models::{format_time, parse_time, Actor, EnquiryAction, ServiceCategory, ServiceEnquiry};
use crate::services::lifecycle;
use crate::services::scheduling::{NewEnquiry, SchedulingError};
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnquiryResponse {
    id: String,
    requester_id: String,
    service_category: &'static str,
    resource_id: String,
    requested_date: String,
    start_time: String,
    end_time: String,
    duration_minutes: u32,
    status: &'static str,
    metadata: serde_json::Value,
    created_at: String,
    updated_at: String,
}

impl From<ServiceEnquiry> for EnquiryResponse {
    fn from(e: ServiceEnquiry) -> Self {
        let interval = e.interval();
        Self {
            id: e.id,
            requester_id: e.requester_id,
            service_category: e.category.as_str(),
            resource_id: e.resource_id,
            requested_date: e.requested_date.format("%Y-%m-%d").to_string(),
            start_time: format_time(interval.start),
            end_time: format_time(interval.end),
            duration_minutes: e.duration_minutes,
            status: e.status.as_str(),
            metadata: e.metadata,
            created_at: e.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            updated_at: e.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

#[allow(clippy::result_large_err)]
pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("date must be YYYY-MM-DD, got {s:?}")))
}

// POST /api/enquiries
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEnquiryRequest {
    pub category: ServiceCategory,
    pub date: String,
    pub start_time: String,
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub resource_id: Option<String>,
    /// Only honoured for admin and system callers acting on a customer's behalf.
    pub requester_id: Option<String>,
}

pub async fn create_enquiry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<CreateEnquiryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EnquiryResponse>), AppError> {
    let actor = identify(&headers, &state.config)?;
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let requester_id = match (&actor, body.requester_id) {
        (Actor::Requester(id), None) => id.clone(),
        (Actor::Requester(id), Some(r)) if &r == id => r,
        (Actor::Requester(_), Some(_)) => {
            return Err(SchedulingError::Forbidden(
                "requesters may only book for themselves".to_string(),
            )
            .into());
        }
        (_, Some(r)) => r,
        (_, None) => return Err(AppError::BadRequest("requesterId is required".to_string())),
    };

    let request = NewEnquiry {
        requester_id,
        category: body.category,
        resource_id: body.resource_id,
        date: parse_date(&body.date)?,
        start_minute: parse_time(&body.start_time).map_err(|e| AppError::BadRequest(e.to_string()))?,
        duration_minutes: body.duration_minutes,
        metadata: body.metadata,
    };

    let enquiry = with_db(&state, move |conn, state| {
        Ok(state.scheduler.create_enquiry(conn, request)?)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(enquiry.into())))
}

// PATCH /api/enquiries/:id
#[derive(Deserialize)]
pub struct UpdateEnquiryRequest {
    pub action: EnquiryAction,
}

pub async fn update_enquiry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<UpdateEnquiryRequest>, JsonRejection>,
) -> Result<Json<EnquiryResponse>, AppError> {
    let actor = identify(&headers, &state.config)?;
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let enquiry = with_db(&state, move |conn, state| {
        let now = state.scheduler.clock.now();
        Ok(lifecycle::apply_action(conn, &actor, &id, body.action, now)?)
    })
    .await?;

    Ok(Json(enquiry.into()))
}

// GET /api/enquiries/:id
pub async fn get_enquiry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<EnquiryResponse>, AppError> {
    let actor = identify(&headers, &state.config)?;

    let enquiry = with_db(&state, move |conn, _| Ok(lifecycle::get_enquiry(conn, &actor, &id)?)).await?;

    Ok(Json(enquiry.into()))
}

// GET /api/enquiries
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEnquiriesQuery {
    pub requester_id: Option<String>,
}

pub async fn list_enquiries(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<ListEnquiriesQuery>, QueryRejection>,
) -> Result<Json<Vec<EnquiryResponse>>, AppError> {
    let actor = identify(&headers, &state.config)?;
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let requester_id = match (query.requester_id, &actor) {
        (Some(r), _) => r,
        (None, Actor::Requester(id)) => id.clone(),
        (None, _) => return Err(AppError::BadRequest("requesterId is required".to_string())),
    };

    let enquiries = with_db(&state, move |conn, _| {
        Ok(lifecycle::enquiries_for_requester(conn, &actor, &requester_id)?)
    })
    .await?;

    Ok(Json(enquiries.into_iter().map(EnquiryResponse::from).collect()))
}

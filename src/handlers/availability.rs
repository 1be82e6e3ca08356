use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::handlers::with_db;
use crate::models::{format_time, AvailabilityReport, Interval};
use crate::state::AppState;

// GET /api/availability
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityQuery {
    pub date: String,
    pub duration_minutes: Option<u32>,
    pub resource_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    date: String,
    resource_id: String,
    duration_minutes: u32,
    open_time: String,
    close_time: String,
    booked_slots: Vec<Interval>,
    available_slots: Vec<Interval>,
    chips: Vec<String>,
}

impl From<AvailabilityReport> for AvailabilityResponse {
    fn from(report: AvailabilityReport) -> Self {
        Self {
            date: report.date.format("%Y-%m-%d").to_string(),
            resource_id: report.resource_id,
            duration_minutes: report.duration_minutes,
            open_time: format_time(report.window.start),
            close_time: format_time(report.window.end),
            booked_slots: report.booked,
            available_slots: report.available,
            chips: report.chips.into_iter().map(format_time).collect(),
        }
    }
}

pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    query: Result<Query<AvailabilityQuery>, QueryRejection>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let date = super::enquiries::parse_date(&query.date)?;

    let report = with_db(&state, move |conn, state| {
        Ok(state.scheduler.availability(
            conn,
            date,
            query.resource_id.as_deref(),
            query.duration_minutes,
        )?)
    })
    .await?;

    Ok(Json(report.into()))
}

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::db::queries::{self, EnquiryFilter};
use crate::errors::AppError;
use crate::handlers::enquiries::{parse_date, EnquiryResponse};
use crate::handlers::{identify, with_db};
use crate::models::EnquiryStatus;
use crate::services::scheduling::SchedulingError;
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

// GET /api/admin/enquiries
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnquiriesQuery {
    pub status: Option<String>,
    pub date: Option<String>,
    pub resource_id: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_all_enquiries(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<EnquiriesQuery>, QueryRejection>,
) -> Result<Json<Vec<EnquiryResponse>>, AppError> {
    if !identify(&headers, &state.config)?.is_admin() {
        return Err(SchedulingError::Forbidden("admin access required".to_string()).into());
    }
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let status = match query.status.as_deref() {
        Some(s) => Some(
            EnquiryStatus::parse(s).ok_or_else(|| AppError::BadRequest(format!("unknown status: {s}")))?,
        ),
        None => None,
    };
    let filter = EnquiryFilter {
        status,
        date: query.date.as_deref().map(parse_date).transpose()?,
        resource_id: query.resource_id,
        limit: query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
    };

    let enquiries = with_db(&state, move |conn, _| {
        queries::list_enquiries(conn, &filter).map_err(|e| AppError::from(SchedulingError::from(e)))
    })
    .await?;

    Ok(Json(enquiries.into_iter().map(EnquiryResponse::from).collect()))
}

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::authz::Role;
use crate::context::{RequestContext, Source};

use super::domain::{JobId, NewVisit, TechnicianId, TimeWindow, VisitId};
use super::repository::{RepositoryError, VisitRepository};
use super::service::{SchedulingError, SchedulingService};

/// Router builder exposing HTTP endpoints for visit scheduling.
pub fn scheduling_router<R>(service: Arc<SchedulingService<R>>) -> Router
where
    R: VisitRepository + 'static,
{
    Router::new()
        .route("/api/v1/visits", post(create_visit_handler::<R>))
        .route(
            "/api/v1/visits/:visit_id/complete",
            post(complete_visit_handler::<R>),
        )
        .route("/api/v1/visits/upcoming", get(upcoming_handler::<R>))
        .with_state(service)
}

/// Creation payload, already shape-validated by axum's JSON extractor.
#[derive(Debug, Deserialize)]
pub struct CreateVisitRequest {
    pub job_id: String,
    pub technician_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteVisitRequest {
    pub summary: String,
}

#[derive(Debug, Deserialize)]
pub struct UpcomingQuery {
    pub technician_id: Option<String>,
}

/// Build the per-operation context from the boundary headers.
///
/// Actor identity is expected from upstream auth middleware via
/// `x-actor-id` / `x-actor-role`; absent values fall back to an anonymous
/// CSR, the least-privileged interactive default. The request id is taken
/// from `x-request-id` or generated.
pub fn context_from_headers(headers: &HeaderMap) -> RequestContext {
    let actor_id = header_str(headers, "x-actor-id").unwrap_or("anonymous");
    let role = header_str(headers, "x-actor-role")
        .and_then(Role::parse)
        .unwrap_or(Role::Csr);
    let request_id = header_str(headers, "x-request-id").map(str::to_string);

    RequestContext::new(actor_id, role, Source::Api, request_id)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Echo the request id back to the caller for trace correlation.
fn with_request_id(mut response: Response, ctx: &RequestContext) -> Response {
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

pub(crate) async fn create_visit_handler<R>(
    State(service): State<Arc<SchedulingService<R>>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<CreateVisitRequest>,
) -> Response
where
    R: VisitRepository + 'static,
{
    let ctx = context_from_headers(&headers);

    let window = match TimeWindow::new(request.start_time, request.end_time) {
        Ok(window) => window,
        Err(error) => {
            let payload = json!({ "error": error.to_string() });
            let response =
                (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
            return with_request_id(response, &ctx);
        }
    };

    let new_visit = NewVisit {
        job_id: JobId(request.job_id),
        technician_id: TechnicianId(request.technician_id),
        window,
    };

    let response = match service.create_visit(&ctx, new_visit).await {
        Ok(visit) => (StatusCode::CREATED, axum::Json(visit)).into_response(),
        Err(error) => error_response(error),
    };
    with_request_id(response, &ctx)
}

pub(crate) async fn complete_visit_handler<R>(
    State(service): State<Arc<SchedulingService<R>>>,
    Path(visit_id): Path<String>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<CompleteVisitRequest>,
) -> Response
where
    R: VisitRepository + 'static,
{
    let ctx = context_from_headers(&headers);

    let response = match service
        .complete_visit(&ctx, VisitId(visit_id), &request.summary)
        .await
    {
        Ok(visit) => (StatusCode::OK, axum::Json(visit)).into_response(),
        Err(error) => error_response(error),
    };
    with_request_id(response, &ctx)
}

pub(crate) async fn upcoming_handler<R>(
    State(service): State<Arc<SchedulingService<R>>>,
    Query(query): Query<UpcomingQuery>,
    headers: HeaderMap,
) -> Response
where
    R: VisitRepository + 'static,
{
    let ctx = context_from_headers(&headers);
    let technician_id = query.technician_id.map(TechnicianId);

    let response = match service.upcoming_visits(&ctx, technician_id.as_ref()).await {
        Ok(visits) => (StatusCode::OK, axum::Json(visits)).into_response(),
        Err(error) => error_response(error),
    };
    with_request_id(response, &ctx)
}

fn error_response(error: SchedulingError) -> Response {
    match error {
        SchedulingError::Authorization(error) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::FORBIDDEN, axum::Json(payload)).into_response()
        }
        SchedulingError::Conflict(error) => {
            let payload = json!({
                "error": error.to_string(),
                "technician_id": error.technician_id.0,
                "start_time": error.window.start(),
                "end_time": error.window.end(),
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        SchedulingError::Repository(RepositoryError::NotFound) => {
            let payload = json!({ "error": "visit not found" });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        SchedulingError::Repository(RepositoryError::Conflict) => {
            let payload = json!({ "error": "visit already exists" });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        SchedulingError::Repository(RepositoryError::Unavailable(message)) => {
            let payload = json!({ "error": format!("repository unavailable: {message}") });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
        SchedulingError::PersistenceTimeout { timeout_ms } => {
            let payload = json!({
                "error": format!("persistence timed out after {timeout_ms}ms"),
                "retryable": true,
            });
            (StatusCode::SERVICE_UNAVAILABLE, axum::Json(payload)).into_response()
        }
        // The write committed; report the id so the caller can reconcile
        // instead of retrying a duplicate booking.
        SchedulingError::Dispatch { visit_id, message } => {
            let payload = json!({
                "error": message,
                "visit_id": visit_id.0,
                "committed": true,
            });
            (StatusCode::BAD_GATEWAY, axum::Json(payload)).into_response()
        }
    }
}

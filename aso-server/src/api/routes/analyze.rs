//! Analysis job routes.

use axum::{
    Json, Router,
    extract::{ConnectInfo, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Serialize;
use std::net::SocketAddr;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::jobs::{AnalyzeRequest, JobState, JobView};

/// Create the analyze router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(submit_analysis))
        .route("/{job_id}", get(get_analysis))
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    job_id: String,
    status: JobState,
}

/// Submit an analysis job.
///
/// Returns 202 with the job id; polling happens on the companion GET
/// route. The client's peer address is the rate-limit identity.
async fn submit_analysis(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<impl IntoResponse> {
    let client_id = addr.ip().to_string();
    let record = state.pipeline.submit(request, &client_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id: record.id,
            status: record.state,
        }),
    ))
}

/// Poll an analysis job by id.
async fn get_analysis(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobView>> {
    state
        .pipeline
        .poll(&job_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Job with id '{}' not found", job_id)))
}

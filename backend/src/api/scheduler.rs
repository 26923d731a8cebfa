use crate::models::{ActionResponse, RunNowResponse, SchedulerStatus, StartJobRequest};
use crate::AppState;
use log::warn;
use rocket::serde::json::Json;
use rocket::{get, post, State};

#[post("/start", data = "<request>")]
pub async fn start_job(
    request: Json<StartJobRequest>,
    state: &State<AppState>,
) -> Json<ActionResponse> {
    match state.job.start(&request.schedule).await {
        Ok(()) => Json(ActionResponse::ok()),
        Err(e) => {
            warn!("Refused to start collector job: {e}");
            Json(ActionResponse::failed(e.to_string()))
        }
    }
}

#[post("/stop")]
pub async fn stop_job(state: &State<AppState>) -> Json<ActionResponse> {
    match state.job.stop().await {
        Ok(true) => Json(ActionResponse::ok()),
        Ok(false) => Json(ActionResponse::failed("Collector job is not running")),
        Err(e) => Json(ActionResponse::failed(e.to_string())),
    }
}

#[post("/run")]
pub async fn run_job(state: &State<AppState>) -> Json<RunNowResponse> {
    match state.job.run_now().await {
        Ok(summary) => Json(RunNowResponse {
            success: true,
            count: Some(summary.count),
            total: Some(summary.total),
            message: None,
        }),
        Err(e) => Json(RunNowResponse {
            success: false,
            count: None,
            total: None,
            message: Some(e.to_string()),
        }),
    }
}

#[get("/status")]
pub async fn job_status(state: &State<AppState>) -> Json<SchedulerStatus> {
    Json(state.job.status().await)
}

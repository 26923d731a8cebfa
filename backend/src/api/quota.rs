use super::error_status;
use crate::models::{ActionResponse, QuotaStatus};
use crate::AppState;
use log::error;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{get, post, State};

#[get("/")]
pub async fn get_quota(state: &State<AppState>) -> Result<Json<QuotaStatus>, Status> {
    state.quota.status().await.map(Json).map_err(|e| {
        error!("Failed to read quota: {e}");
        error_status(&e)
    })
}

#[post("/reset")]
pub async fn reset_quota(state: &State<AppState>) -> Json<ActionResponse> {
    match state.quota.reset().await {
        Ok(()) => Json(ActionResponse::ok()),
        Err(e) => {
            error!("Failed to reset quota: {e}");
            Json(ActionResponse::failed(e.to_string()))
        }
    }
}

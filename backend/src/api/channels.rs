use super::error_status;
use crate::models::{ChannelHistorySnapshot, ChannelRecord, NewChannel};
use crate::services::cancel::CancelToken;
use crate::AppState;
use log::error;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{delete, get, post, State};

#[get("/")]
pub async fn get_channels(state: &State<AppState>) -> Result<Json<Vec<ChannelRecord>>, Status> {
    state.roster.list().await.map(Json).map_err(|e| {
        error!("Failed to load roster: {e}");
        error_status(&e)
    })
}

#[post("/", data = "<channel>")]
pub async fn add_channel(
    channel: Json<NewChannel>,
    state: &State<AppState>,
) -> Result<Json<ChannelRecord>, Status> {
    state
        .roster
        .add_channel(&channel.input, &state.stages, &CancelToken::new())
        .await
        .map(Json)
        .map_err(|e| {
            error!("Failed to add channel '{}': {e}", channel.input);
            error_status(&e)
        })
}

#[delete("/<channel_id>")]
pub async fn remove_channel(channel_id: &str, state: &State<AppState>) -> Status {
    if channel_id.is_empty() {
        return Status::BadRequest;
    }

    match state.roster.remove(channel_id).await {
        Ok(true) => Status::NoContent,
        Ok(false) => Status::NotFound,
        Err(e) => {
            error!("Failed to remove channel {channel_id}: {e}");
            error_status(&e)
        }
    }
}

#[get("/<channel_id>/history")]
pub async fn get_channel_history(
    channel_id: &str,
    state: &State<AppState>,
) -> Result<Json<Vec<ChannelHistorySnapshot>>, Status> {
    state.roster.history(channel_id).await.map(Json).map_err(|e| {
        error!("Failed to load history for {channel_id}: {e}");
        error_status(&e)
    })
}

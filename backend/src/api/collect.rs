use crate::models::{CollectRequest, CollectResponse};
use crate::AppState;
use log::{error, info};
use rocket::serde::json::Json;
use rocket::{post, State};

#[post("/collect", data = "<request>")]
pub async fn run_collection(
    request: Json<CollectRequest>,
    state: &State<AppState>,
) -> Json<CollectResponse> {
    let request = request.into_inner();

    match state
        .collection
        .collect(&request.filters, request.save_as.as_deref())
        .await
    {
        Ok(rows) => {
            info!("Collection returned {} rows", rows.len());
            Json(CollectResponse {
                success: true,
                message: format!("Collected {} rows", rows.len()),
                rows,
            })
        }
        Err(e) => {
            error!("Collection failed: {e}");
            Json(CollectResponse {
                success: false,
                message: e.to_string(),
                rows: vec![],
            })
        }
    }
}

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::Config;
use crate::services::collection::CollectionService;
use crate::services::collector_job::CollectorJob;
use crate::services::locks::FileLocks;
use crate::services::pipeline::FilterPipeline;
use crate::services::quota::QuotaLedger;
use crate::services::roster::ChannelRoster;
use crate::services::sheet_store::SheetStore;
use crate::services::stages::StageFetchers;
use crate::services::youtube::YouTubeApi;
use std::sync::Arc;

/// Explicit context shared by the routes, the scheduler and the pipeline.
pub struct AppState {
    pub config: Arc<Config>,
    pub quota: Arc<QuotaLedger>,
    pub stages: StageFetchers,
    pub roster: Arc<ChannelRoster>,
    pub collection: Arc<CollectionService>,
    pub job: Arc<CollectorJob>,
}

impl AppState {
    pub fn build(config: Config, api: Arc<dyn YouTubeApi>) -> Self {
        let store = Arc::new(SheetStore::new(config.backup_exclusions.clone()));
        let locks = Arc::new(FileLocks::new());

        let quota = Arc::new(QuotaLedger::new(
            store.clone(),
            config.quota_path(),
            config.quota_daily_limit,
        ));
        let stages = StageFetchers::new(api, quota.clone());
        let roster = Arc::new(ChannelRoster::new(
            store.clone(),
            locks,
            config.roster_path(),
            config.history_path(),
        ));
        let collection = Arc::new(CollectionService::new(
            FilterPipeline::new(stages.clone()),
            roster.clone(),
            store,
            config.results_dir(),
        ));
        let job = Arc::new(CollectorJob::new(roster.clone(), stages.clone()));

        AppState {
            config: Arc::new(config),
            quota,
            stages,
            roster,
            collection,
            job,
        }
    }
}

pub fn build_rocket(state: AppState, cors: rocket_cors::Cors) -> rocket::Rocket<rocket::Build> {
    rocket::build()
        .manage(state)
        .attach(cors)
        .mount("/api", api::collect_routes())
        .mount("/api/channels", api::channel_routes())
        .mount("/api/quota", api::quota_routes())
        .mount("/api/scheduler", api::scheduler_routes())
}

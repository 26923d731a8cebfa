use crate::error::CollectorError;
use crate::services::youtube::{YouTubeClient, DEFAULT_API_BASE};
use crate::AppState;
use anyhow::Result;
use env_logger::Builder;
use log::{error, info, warn, LevelFilter};
use rocket::http::Method;
use rocket_cors::{AllowedHeaders, AllowedOrigins, CorsOptions};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

pub const ROSTER_FILE: &str = "channels.xlsx";
pub const HISTORY_FILE: &str = "channel_history.xlsx";
pub const QUOTA_FILE: &str = "quota.json";

const DEFAULT_SCHEDULE: &str = "0 0 */6 * * *";
const DEFAULT_QUOTA_LIMIT: u64 = 10_000;

/// Everything the collector needs from the environment, passed explicitly
/// into the services at construction.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_base: Url,
    pub data_dir: PathBuf,
    pub collector_schedule: String,
    pub collector_autostart: bool,
    pub quota_daily_limit: u64,
    pub backup_exclusions: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, CollectorError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, CollectorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("YOUTUBE_API_KEY")
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                CollectorError::Configuration(
                    "YOUTUBE_API_KEY environment variable must be set".to_string(),
                )
            })?;

        let base = lookup("YOUTUBE_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let api_base = Url::parse(&base).map_err(|e| {
            CollectorError::Configuration(format!("YOUTUBE_API_BASE '{base}' is not a URL: {e}"))
        })?;

        let collector_autostart = match lookup("COLLECTOR_AUTOSTART").as_deref() {
            None => false,
            Some("1") | Some("true") | Some("yes") => true,
            Some("0") | Some("false") | Some("no") => false,
            Some(other) => {
                warn!("Ignoring COLLECTOR_AUTOSTART={other}, expected true or false");
                false
            }
        };

        let quota_daily_limit = match lookup("QUOTA_DAILY_LIMIT") {
            None => DEFAULT_QUOTA_LIMIT,
            Some(raw) => raw.parse::<u64>().unwrap_or_else(|_| {
                warn!("Ignoring QUOTA_DAILY_LIMIT={raw}, using {DEFAULT_QUOTA_LIMIT}");
                DEFAULT_QUOTA_LIMIT
            }),
        };

        let backup_exclusions = lookup("BACKUP_EXCLUDE")
            .unwrap_or_else(|| format!("{HISTORY_FILE},{QUOTA_FILE}"))
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect();

        Ok(Config {
            api_key,
            api_base,
            data_dir: lookup("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            collector_schedule: lookup("COLLECTOR_SCHEDULE")
                .unwrap_or_else(|| DEFAULT_SCHEDULE.to_string()),
            collector_autostart,
            quota_daily_limit,
            backup_exclusions,
        })
    }

    pub fn roster_path(&self) -> PathBuf {
        self.data_dir.join(ROSTER_FILE)
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(HISTORY_FILE)
    }

    pub fn quota_path(&self) -> PathBuf {
        self.data_dir.join(QUOTA_FILE)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.data_dir.join("results")
    }
}

pub fn init_logger() {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
    info!("Starting collector backend...");
}

pub fn load_environment() {
    dotenv::dotenv().ok();
}

pub async fn create_app_state(config: Config) -> Result<AppState> {
    info!("Using YouTube Data API at: {}", config.api_base);
    info!("Data directory: {}", config.data_dir.display());

    let api = Arc::new(YouTubeClient::new(
        config.api_base.clone(),
        config.api_key.clone(),
    ));
    let state = AppState::build(config, api);

    if state.config.collector_autostart {
        let schedule = state.config.collector_schedule.clone();
        match state.job.start(&schedule).await {
            Ok(()) => info!("Collector job autostarted on '{schedule}'"),
            Err(e) => error!("Collector job autostart failed: {e}"),
        }
    }

    Ok(state)
}

pub fn create_cors() -> Result<rocket_cors::Cors> {
    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::some_exact(&["http://localhost:8080"]))
        .allowed_methods(
            vec![Method::Get, Method::Post, Method::Delete, Method::Options]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allowed_headers(AllowedHeaders::some(&["Accept", "Content-Type"]))
        .allow_credentials(true)
        .to_cors()
        .map_err(|e| anyhow::anyhow!("Failed to create CORS options: {}", e))?;

    Ok(cors)
}

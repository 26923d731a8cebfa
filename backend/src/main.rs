use vidpulse::build_rocket;
use vidpulse::config::{create_app_state, create_cors, init_logger, load_environment, Config};

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    load_environment();
    init_logger();

    let config = Config::from_env()?;
    let state = create_app_state(config).await?;
    let cors = create_cors()?;

    let job = state.job.clone();
    let _rocket = build_rocket(state, cors)
        .launch()
        .await
        .map_err(|e| anyhow::anyhow!("Rocket failed: {e}"))?;

    job.shutdown().await?;
    Ok(())
}

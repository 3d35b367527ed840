use dotenvy::dotenv;
use log::info;
use std::sync::Arc;

use crmserver::config::AppConfig;
use crmserver::main_module::run_axum_server;
use crmserver::shared::state::AppState;
use crmserver::shared::utils::create_conn;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env()?;
    let pool = create_conn(&config.database)?;

    info!(
        "Starting crmserver v{} on {}:{}",
        env!("CARGO_PKG_VERSION"),
        config.server.host,
        config.server.port
    );

    let state = Arc::new(AppState::new(pool, config));
    run_axum_server(state).await?;

    Ok(())
}

use dotenvy::dotenv;
use log::{error, info};

use helpdesk_triage::main_module::{
    create_app_state, init_logging, init_stores, run_axum_server, start_background_services,
};
use helpdesk_triage::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_logging();

    let config = AppConfig::from_env()?;
    info!(
        "Starting helpdesk-triage {} on {}:{}",
        env!("CARGO_PKG_VERSION"),
        config.server.host,
        config.server.port
    );

    let stores = init_stores(&config).await;
    let (app_state, workers) = create_app_state(config, stores).await;
    let follow_up_loop = start_background_services(&app_state);

    let result = run_axum_server(app_state).await;

    follow_up_loop.abort();
    for worker in workers {
        worker.abort();
    }

    if let Err(e) = result {
        error!("Server error: {}", e);
        return Err(e.into());
    }
    info!("Shutdown complete");
    Ok(())
}

mod api;
mod audit;
mod bootstrap;
mod health;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use axum::Router;
use progear_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use progear_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

fn app(state: bootstrap::AppState) -> Router {
    health::router(state.clone()).merge(api::router(state))
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app_state = bootstrap::bootstrap_with_config(config).await?;
    let address =
        format!("{}:{}", app_state.config.server.bind_address, app_state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        agent_id = app_state.state.identity.id(),
        demo_mode = app_state.config.okta.demo_mode,
        bind_address = %address,
        "progear-server started"
    );

    axum::serve(listener, app(app_state.state)).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "progear-server stopping"
    );

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for shutdown signal"
        );
    }
}

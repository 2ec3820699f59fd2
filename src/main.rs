// zkBridge host service - Main Entry Point

use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use zkbridge::{connect, router, AppState, Config, ConfirmationPolicy, SharedState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "zkbridge stopped");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    info!(
        base_chain = %config.base_chain_network,
        rollup = %config.rollup_network,
        "starting zkbridge"
    );

    let clients = connect(&config).await?;
    let policy = ConfirmationPolicy {
        poll_interval: config.poll_interval,
        default_timeout: config.confirmation_timeout,
    };
    let state: SharedState = Arc::new(AppState::new(clients, policy)?);

    if let Some(ledger) = &state.mock {
        // Blocks are sealed and proven on arrival so requests complete
        ledger.set_auto_verify(true);
        state.seed_mock_accounts();
    }

    let app = router(state).layer(
        ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        ),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");
    info!("endpoints: GET /health, GET /accounts, GET /accounts/:name/state, POST /fee, POST /deposit, POST /transfer, POST /withdraw, POST /authorize");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

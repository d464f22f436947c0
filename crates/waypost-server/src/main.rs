use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use waypost_server::state::{build_engine, AppState};

/// `waypost health`: liveness check for Docker HEALTHCHECK.
///
/// Calls `GET http://localhost:$WAYPOST_PORT/health`.
/// Exits 0 if the server responds with HTTP 200, exits 1 otherwise.
fn run_health_check() -> ! {
    let port = std::env::var("WAYPOST_PORT").unwrap_or_else(|_| "3000".to_string());
    let url = format!("http://localhost:{}/health", port);
    match ureq::get(&url).call() {
        Ok(resp) if resp.status() == 200 => std::process::exit(0),
        _ => std::process::exit(1),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("health") {
        run_health_check();
    }
    // Structured JSON logging. Level controlled via RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("waypost=info".parse()?),
        )
        .json()
        .init();

    let cfg = waypost_server::config::Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    let engine = build_engine(&cfg).await?;
    if let Err(e) = engine.ping().await {
        tracing::warn!(error = %e, "Analytics backend not reachable at startup");
    }

    let state = Arc::new(AppState::new(engine, cfg.clone()));
    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = waypost_server::app::build_app(state);

    info!(
        port = cfg.port,
        backend = %cfg.backend,
        query_timeout_ms = cfg.query_timeout_ms,
        "Waypost listening on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}

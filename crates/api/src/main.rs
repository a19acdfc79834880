use std::sync::Arc;

use anyhow::Context;

use signup_api::app;
use signup_infra::SignupConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    signup_observability::init();

    let config = SignupConfig::from_env().context("invalid configuration")?;

    let services = Arc::new(
        app::build_services(&config)
            .await
            .context("failed to initialise store")?,
    );
    let expiry = services.spawn_expiry_runner();

    let router = app::build_app(Arc::clone(&services));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    expiry.shutdown().await;
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

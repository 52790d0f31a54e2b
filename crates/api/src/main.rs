use anyhow::Context;

use authgate_api::{ApiConfig, app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ApiConfig::from_env().context("invalid configuration")?;
    authgate_observability::init(config.log_format);
    tracing::info!(?config, "starting authgate-api");

    let services = app::AppServices::from_config(&config)
        .await
        .context("failed to wire services")?;
    let worker = services
        .spawn_mutation_worker()
        .context("failed to start mutation worker")?;
    let router = app::build_app(services, &config).context("invalid auth pipeline")?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    worker.shutdown();
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

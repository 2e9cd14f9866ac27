use anyhow::{Context, Result};
use phantast_engine::{ExecutorRegistry, IdentityExecutor, PipelineRunner, ResultCache};
use phantast_orchestrator::io::{FileOutputWriter, FsInputSource};
use phantast_orchestrator::repository::PipelineStore;
use phantast_orchestrator::{AppState, BatchOrchestrator, Config, OrchestratorOptions, create_router};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "phantast_orchestrator=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Phantast Orchestrator...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    tracing::info!(
        "Loaded configuration: workers={}, cache_max_entries={}, cache_max_bytes={:?}",
        config.workers,
        config.cache_max_entries,
        config.cache_max_bytes
    );

    let mut registry = ExecutorRegistry::new();
    registry
        .register("identity", IdentityExecutor)
        .context("Failed to register built-in operations")?;

    tracing::info!("Registered {} operation(s)", registry.len());

    let runner = PipelineRunner::new(Arc::new(registry), ResultCache::new(config.cache_limits()));
    let orchestrator = BatchOrchestrator::new(
        runner,
        Arc::new(FsInputSource),
        Arc::new(FileOutputWriter),
        OrchestratorOptions::from(&config),
    );

    // Build router with all API endpoints
    let app = create_router(AppState::new(Arc::new(PipelineStore::new()), orchestrator));

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}

use runbox::api::create_router;
use runbox::config::Config;
use runbox::events::{MemoryEventLog, RedisEventLog, SharedEventLog};
use runbox::queue::{MemoryQueue, RedisQueue, SharedQueue};
use runbox::repository::{
    ExecutionRepository, LanguageRepository, SessionRepository, establish_connection,
    seed_languages,
};
use runbox::services::{ExecutionService, LanguageService, SessionService};
use runbox::worker::{RepairSweep, WorkerPool};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn run_server<F>(shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    // Initialize tracing; RUST_LOG wins, LOG_LEVEL sets our own level.
    let default_filter = {
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "debug".to_string());
        format!("runbox={level},tower_http=debug,axum=debug")
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&default_filter)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Starting runbox with config: {:?}", config);

    if let Some(path) = config.database_url.strip_prefix("sqlite:") {
        let path = std::path::Path::new(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Establish database connection and seed the language catalogue
    let db_pool = establish_connection(&config.database_url).await?;
    seed_languages(
        &db_pool,
        config.default_time_limit_ms,
        config.default_memory_mb,
    )
    .await?;
    tracing::info!("Database connected: {}", config.database_url);

    // Initialize repositories
    let language_repo = LanguageRepository::new(db_pool.clone());
    let session_repo = SessionRepository::new(db_pool.clone());
    let execution_repo = ExecutionRepository::new(db_pool);

    // Queue and event log: broker-backed when REDIS_URL is set, embedded
    // in-process otherwise.
    let visibility_timeout = Duration::from_secs(config.visibility_timeout_secs);
    let (queue, events): (SharedQueue, SharedEventLog) = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            let conn = redis::aio::ConnectionManager::new(client).await?;
            tracing::info!("Broker connected: {}", url);
            (
                Arc::new(RedisQueue::new(conn.clone(), visibility_timeout)),
                Arc::new(RedisEventLog::new(conn)),
            )
        }
        None => {
            tracing::info!("No REDIS_URL configured; using embedded queue and event log");
            (
                Arc::new(MemoryQueue::new(visibility_timeout)),
                Arc::new(MemoryEventLog::new()),
            )
        }
    };

    // Initialize services
    let language_service = LanguageService::new(language_repo.clone());
    let session_service = SessionService::new(
        session_repo.clone(),
        language_repo.clone(),
        execution_repo.clone(),
    );
    let execution_service = ExecutionService::new(
        execution_repo.clone(),
        session_repo.clone(),
        language_repo.clone(),
        queue.clone(),
        events.clone(),
        config.default_time_limit_ms,
        config.default_memory_mb,
    );

    // Start the worker pool and the repair sweep
    let grace = Duration::from_secs(config.shutdown_grace_secs);
    let worker_pool = WorkerPool::new(
        queue.clone(),
        execution_repo.clone(),
        session_repo,
        language_repo,
        events.clone(),
        config.max_concurrent_executions,
    );
    let worker_shutdown = worker_pool.shutdown_handle();
    let worker_task = tokio::spawn(async move { worker_pool.run(grace).await });

    let sweep = RepairSweep::new(
        execution_repo,
        events,
        Duration::from_secs(config.sweep_interval_secs),
        Duration::from_secs(config.sweep_margin_secs),
    );
    let sweep_shutdown = sweep.shutdown_handle();
    let sweep_task = tokio::spawn(async move { sweep.run().await });

    // Create router
    let app = create_router(language_service, session_service, execution_service);
    let app = app.layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.host, config.http_port);
    let addr = addr.parse::<SocketAddr>()?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    // Drain background tasks: stop reserving, let in-flight runs finish up
    // to the grace period.
    tracing::info!("Shutting down background tasks");
    worker_shutdown.notify_one();
    sweep_shutdown.notify_one();
    let _ = worker_task.await;
    let _ = sweep_task.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install SIGINT handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    run_server(shutdown_signal()).await
}

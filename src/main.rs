use std::{net::SocketAddr, process, sync::Arc, time::Duration};

use shelf::{
    application::{
        error::AppError,
        items::{ItemService, ItemSettings, ItemsCache},
        repos::{ItemsRepo, ItemsWriteRepo},
    },
    cache::{
        CacheBackend, CacheBackendKind, CacheConfig, CacheHandle, KeySpace, MemoryBackend,
        RedisBackend,
    },
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiRateLimiter, ApiState},
        telemetry,
    },
};
use tokio::task::JoinHandle;
use tracing::{Dispatch, Level, debug, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;

    let cache_config = CacheConfig::from(&settings.cache);
    let (cache, purge_task) = build_cache(&cache_config)?;

    let reader: Arc<dyn ItemsRepo> = repositories.clone();
    let writer: Arc<dyn ItemsWriteRepo> = repositories.clone();
    let item_settings = ItemSettings {
        list_limit: settings.items.list_limit.get(),
        name_max_len: settings.items.name_max_len.get() as usize,
        store_timeout: settings.database.statement_timeout,
    };
    let items_cache = cache.clone().map(|handle| {
        let keys = KeySpace::new(cache_config.namespace.clone());
        ItemsCache::new(handle, keys, cache_config.ttl)
    });
    let items =
        Arc::new(ItemService::new(reader, writer, item_settings).with_cache_opt(items_cache));

    let rate_limiter = Arc::new(ApiRateLimiter::new(
        Duration::from_secs(u64::from(settings.rate_limit.window_seconds.get())),
        settings.rate_limit.max_requests.get(),
    ));
    let prune_task = spawn_rate_limit_pruner(rate_limiter.clone());

    let state = ApiState::new(items, cache, rate_limiter);
    let result = serve_http(&settings, state).await;

    prune_task.abort();
    let _ = prune_task.await;
    if let Some(task) = purge_task {
        task.abort();
        let _ = task.await;
    }

    repositories.close().await;
    info!(target = "shelf::server", "Shutdown complete");
    result
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    repositories.close().await;
    info!(target = "shelf::migrate", "Migrations applied");
    Ok(())
}

/// Connects the pool and applies pending migrations.
async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(
        database_url,
        settings.database.max_connections.get(),
        settings.database.acquire_timeout,
        settings.database.statement_timeout,
    )
    .await
    .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

/// Builds the configured backend. The memory backend also gets a purge task.
fn build_cache(
    config: &CacheConfig,
) -> Result<(Option<CacheHandle>, Option<JoinHandle<()>>), AppError> {
    if !config.enabled {
        info!(target = "shelf::cache", "Listing cache disabled");
        return Ok((None, None));
    }

    let (backend, purge_task): (Arc<dyn CacheBackend>, Option<JoinHandle<()>>) =
        match config.backend {
            CacheBackendKind::Redis => {
                let backend = RedisBackend::open(&config.url)
                    .map_err(|err| AppError::from(InfraError::from(err)))?;
                (Arc::new(backend), None)
            }
            CacheBackendKind::Memory => {
                let backend = Arc::new(MemoryBackend::new(config.memory_max_entries_non_zero()));
                let task = spawn_memory_purger(backend.clone(), config.memory_purge_interval);
                (backend, Some(task))
            }
        };

    info!(
        target = "shelf::cache",
        backend = %config.backend,
        namespace = %config.namespace,
        ttl_seconds = config.ttl.as_secs(),
        "Listing cache enabled"
    );

    Ok((
        Some(CacheHandle::new(backend, config.operation_timeout)),
        purge_task,
    ))
}

fn spawn_memory_purger(backend: Arc<MemoryBackend>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // first tick fires immediately
        loop {
            interval.tick().await;
            let purged = backend.purge_expired();
            if purged > 0 {
                debug!(target = "shelf::cache::memory", purged, "Purged expired entries");
            }
        }
    })
}

fn spawn_rate_limit_pruner(limiter: Arc<ApiRateLimiter>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(limiter.window());
        interval.tick().await;
        loop {
            interval.tick().await;
            limiter.prune();
        }
    })
}

async fn serve_http(settings: &config::Settings, state: ApiState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "shelf::server",
        addr = %settings.server.addr,
        "Listening"
    );

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
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

    info!(target = "shelf::server", "Shutdown signal received");
}

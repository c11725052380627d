use std::{process, sync::Arc};

use djedi::{
    application::{error::AppError, repos::NodeStore, storage::NodeStorage},
    cache::{CacheConfig, CacheRegistry, NodeCache, RegisteredBackend},
    config::{self, StorageBackend},
    infra::{
        db::PostgresNodeStore,
        error::InfraError,
        http::{self, ApiState},
        memory::InMemoryNodeStore,
        telemetry,
    },
};
use sqlx::postgres::PgPool;
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
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

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let pool = connect_pool(&settings).await?;
    PostgresNodeStore::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;
    info!(target = "djedi::migrate", "migrations applied");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let store = init_store(&settings).await?;

    let registry = CacheRegistry::from_config(&CacheConfig::from(&settings.cache));
    let backend = registry.resolve(&settings.cache.name);

    let storage = NodeStorage::new(store, NodeCache::new(backend.provider.clone()))
        .with_defaults(settings.uri.clone())
        .with_warm_on_publish(settings.cache.warm_on_publish);

    let result = serve_http(&settings, ApiState::new(storage)).await;
    report_cache_traffic(&settings.cache.name, &backend);
    result
}

async fn init_store(settings: &config::Settings) -> Result<Arc<dyn NodeStore>, AppError> {
    match settings.storage.backend {
        StorageBackend::Memory => {
            warn!(
                target = "djedi::storage",
                "using in-memory node store; content is lost on exit"
            );
            Ok(Arc::new(InMemoryNodeStore::new()))
        }
        StorageBackend::Postgres => {
            let pool = connect_pool(settings).await?;
            PostgresNodeStore::run_migrations(&pool)
                .await
                .map_err(InfraError::from)?;
            let store = PostgresNodeStore::new(pool);
            store.health_check().await.map_err(InfraError::from)?;
            info!(target = "djedi::storage", "connected to postgres node store");
            Ok(Arc::new(store))
        }
    }
}

async fn connect_pool(settings: &config::Settings) -> Result<PgPool, AppError> {
    let url = settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("database.url is not set"))?;
    let pool = PostgresNodeStore::connect(url, settings.database.max_connections.get())
        .await
        .map_err(InfraError::from)?;
    Ok(pool)
}

async fn serve_http(settings: &config::Settings, state: ApiState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let addr = settings.server.addr;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| InfraError::Bind { addr, source })?;
    info!(target = "djedi::http", addr = %addr, "listening");

    let shutdown = Arc::new(Notify::new());
    let trigger = shutdown.clone();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move { trigger.notified().await });
    let mut handle = tokio::spawn(async move { server.await });

    tokio::select! {
        joined = &mut handle => return server_outcome(joined),
        signal = tokio::signal::ctrl_c() => signal.map_err(InfraError::from)?,
    }

    info!(target = "djedi::http", "shutdown requested, draining connections");
    shutdown.notify_one();

    match tokio::time::timeout(settings.server.graceful_shutdown, handle).await {
        Ok(joined) => server_outcome(joined),
        Err(_) => {
            warn!(
                target = "djedi::http",
                grace_secs = settings.server.graceful_shutdown.as_secs(),
                "graceful shutdown timed out"
            );
            Ok(())
        }
    }
}

fn server_outcome(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(result) => result.map_err(|err| AppError::from(InfraError::from(err))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

fn report_cache_traffic(name: &str, backend: &RegisteredBackend) {
    if let Some(stats) = backend.stats() {
        info!(
            target = "djedi::cache",
            backend = %name,
            calls = stats.calls,
            hits = stats.hits,
            misses = stats.misses,
            sets = stats.sets,
            "cache traffic"
        );
    }
}

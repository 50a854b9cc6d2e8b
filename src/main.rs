use std::{future::IntoFuture, pin::pin, process, sync::Arc};

use esi_gateway::{
    application::{
        cache_aside::CacheAside, characters::CharacterResource, error::AppError,
        search::SearchService,
    },
    cache::{CacheKeys, FastCache},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState},
        redis::RedisFastCache,
        telemetry,
        upstream::{BackoffCoordinator, UpstreamClient},
    },
    util::clock::{Clock, RandomJitter, SystemClock},
};
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

    match command {
        config::Command::Serve(_) => {
            telemetry::init(&settings.logging).map_err(AppError::from)?;
            run_serve(settings).await
        }
        config::Command::CheckConfig(_) => {
            run_check_config(&settings);
            Ok(())
        }
    }
}

fn run_check_config(settings: &config::Settings) {
    println!("configuration OK");
    for (key, value) in settings.summary() {
        println!("  {key} = {value}");
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let cache: Arc<dyn FastCache> =
        Arc::new(RedisFastCache::connect(settings.redis.url.as_str()).await?);

    let state = build_api_state(&settings, repositories, cache)?;
    serve_http(&settings, state).await
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_api_state(
    settings: &config::Settings,
    repositories: Arc<PostgresRepositories>,
    cache: Arc<dyn FastCache>,
) -> Result<ApiState, AppError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let mut backoff =
        BackoffCoordinator::new(settings.backoff_policy(), clock.clone(), Arc::new(RandomJitter));
    if settings.backoff.share_via_cache {
        backoff = backoff.with_shared_store(cache.clone());
    }

    let upstream = UpstreamClient::new(&settings.upstream_config(), Arc::new(backoff), clock.clone())?;

    let keys = CacheKeys::new(
        settings.cache.version.clone(),
        settings.upstream.compatibility_date.clone(),
    );
    let characters = CacheAside::new(
        Arc::new(CharacterResource::new(repositories.clone(), upstream.clone())),
        cache.clone(),
        keys,
        settings.character_cache_policy(),
        clock,
    );

    Ok(ApiState {
        characters: Arc::new(characters),
        search: Arc::new(SearchService::new(upstream)),
        db: repositories,
        cache,
    })
}

async fn serve_http(settings: &config::Settings, state: ApiState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    let drain = Arc::new(Notify::new());
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown({
        let drain = drain.clone();
        async move { drain.notified().await }
    });
    let mut server = pin!(server.into_future());

    tokio::select! {
        result = &mut server => {
            return result.map_err(|err| AppError::unexpected(format!("server error: {err}")));
        }
        _ = shutdown_signal() => {
            info!(
                grace_seconds = settings.server.graceful_shutdown.as_secs(),
                "shutdown signal received, draining connections"
            );
        }
    }

    drain.notify_one();
    match tokio::time::timeout(settings.server.graceful_shutdown, server).await {
        Ok(result) => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))
        }
        Err(_) => {
            warn!("graceful shutdown timed out, dropping remaining connections");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

use std::{process, sync::Arc};

use orderline::{
    application::{
        error::AppError,
        ingest::{IngestConsumer, IngestPipeline, MessageStream, OrderPublisher},
        repos::OrdersRepo,
        warmup::CacheWarmer,
    },
    cache::{CacheConfig, OrderCache},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        nats::{self, NatsTransport},
        telemetry,
    },
};
use sqlx::PgPool;
use tokio::sync::watch;
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
        config::Command::WarmupCheck(_) => run_warmup_check(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let pool = connect_database(&settings.database).await?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| InfraError::database(format!("failed to apply migrations: {err}")))?;

    let db = PostgresRepositories::new(pool);
    let repo: Arc<dyn OrdersRepo> = Arc::new(db.clone());
    let cache = Arc::new(OrderCache::new(&CacheConfig::from(&settings.cache)));
    let store_timeout = settings.database.store_timeout;

    CacheWarmer::new(Arc::clone(&repo), Arc::clone(&cache), store_timeout)
        .warm_initial()
        .await?;

    let NatsTransport { stream, publisher } = connect_nats(&settings).await?;
    let order_stream: Arc<dyn MessageStream> = Arc::new(stream);
    let publisher: Arc<dyn OrderPublisher> = Arc::new(publisher);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let pipeline = IngestPipeline::new(Arc::clone(&repo), cache.clone(), store_timeout);
    let consumer = IngestConsumer::new(pipeline, settings.ingest.max_in_flight.get() as usize);
    let consumer_handle =
        tokio::spawn(async move { consumer.run(order_stream, shutdown_rx).await });

    {
        let shutdown_tx = Arc::clone(&shutdown_tx);
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            shutdown_tx.send_replace(true);
        });
    }

    let state = HttpState {
        cache,
        repo,
        publisher,
        db: Some(db),
        store_timeout,
    };
    let serve_result = serve_http(&settings, state, &shutdown_tx).await;

    shutdown_tx.send_replace(true);
    match tokio::time::timeout(settings.server.graceful_shutdown, consumer_handle).await {
        Ok(Ok(report)) => info!(
            received = report.received,
            acked = report.acked,
            retried = report.retried,
            "Consumer drained"
        ),
        Ok(Err(err)) => error!(error = %err, "Consumer task failed"),
        Err(_) => warn!(
            timeout_secs = settings.server.graceful_shutdown.as_secs(),
            "Consumer did not drain before the shutdown deadline"
        ),
    }

    serve_result
}

async fn run_warmup_check(settings: config::Settings) -> Result<(), AppError> {
    let pool = connect_database(&settings.database).await?;
    let repo: Arc<dyn OrdersRepo> = Arc::new(PostgresRepositories::new(pool));
    let cache = Arc::new(OrderCache::new(&CacheConfig::from(&settings.cache)));

    let report = CacheWarmer::new(repo, Arc::clone(&cache), settings.database.store_timeout)
        .warm_initial()
        .await?;

    info!(
        fetched = report.fetched,
        inserted = report.inserted,
        skipped = report.skipped,
        capacity = cache.capacity(),
        "Warmup check complete"
    );
    Ok(())
}

async fn connect_database(database: &config::DatabaseSettings) -> Result<PgPool, AppError> {
    let url = database.url.as_deref().ok_or_else(|| {
        InfraError::configuration(
            "database.url is required (set ORDERLINE__DATABASE__URL or --database-url)",
        )
    })?;

    PostgresRepositories::connect_with_retry(url, database)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))
}

async fn connect_nats(settings: &config::Settings) -> Result<NatsTransport, AppError> {
    let url = settings.nats.url.as_deref().ok_or_else(|| {
        InfraError::configuration("nats.url is required (set ORDERLINE__NATS__URL or --nats-url)")
    })?;

    nats::connect(url, &settings.nats, &settings.ingest)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))
}

async fn serve_http(
    settings: &config::Settings,
    state: HttpState,
    shutdown: &Arc<watch::Sender<bool>>,
) -> Result<(), AppError> {
    let router = http::build_router(state);
    let addr = settings.server.addr;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| InfraError::Bind { addr, source })?;
    info!(%addr, "HTTP listener started");

    let mut stop = shutdown.subscribe();
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = stop.wait_for(|stopped| *stopped).await;
        })
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl-C");
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
                warn!(error = %err, "Failed to listen for SIGTERM");
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

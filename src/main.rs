use std::{future::IntoFuture, process, time::Duration};

use microfeed::{
    application::error::AppError,
    config,
    infra::{
        bootstrap::{AppServices, Backends, ServiceConfig},
        error::InfraError,
        http, telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

const SOURCE: &str = "microfeed::main";

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
        config::Command::CheckConfig => {
            info!(
                target = SOURCE,
                addr = %settings.server.addr,
                database = settings.database.url.is_some(),
                elasticsearch = settings.search.elasticsearch_url.is_some(),
                feed_capacity = settings.feed.capacity.get(),
                rebuild_limit = settings.feed.rebuild_limit.get(),
                "configuration is valid"
            );
            Ok(())
        }
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let backends = Backends::init(&settings).await?;
    let services = AppServices::new(&backends, ServiceConfig::from(&settings));
    let router = http::build_router(services);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(target = SOURCE, addr = %settings.server.addr, "listening");

    let result = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .into_future();

    let grace = settings.server.graceful_shutdown;
    let outcome = drain_within(grace, result).await;

    backends.shutdown().await;
    outcome
}

/// Run the server future, giving in-flight requests `grace` to finish once
/// a shutdown signal has been received.
async fn drain_within<F>(grace: Duration, server: F) -> Result<(), AppError>
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let watchdog = tokio::spawn(async move {
        shutdown_signal().await;
        tokio::time::sleep(grace).await;
        let _ = stop_tx.send(());
    });

    let outcome = tokio::select! {
        served = server => served.map_err(|err| AppError::unexpected(format!("server error: {err}"))),
        _ = stop_rx => {
            warn!(
                target = SOURCE,
                grace_secs = grace.as_secs(),
                "graceful shutdown window elapsed; dropping open connections"
            );
            Ok(())
        }
    };

    watchdog.abort();
    outcome
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target = SOURCE, error = %err, "failed to listen for ctrl-c");
            futures::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(target = SOURCE, error = %err, "failed to listen for SIGTERM");
                futures::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = futures::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!(target = SOURCE, "shutdown requested");
}

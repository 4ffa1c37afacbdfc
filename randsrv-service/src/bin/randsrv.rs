use std::{
    net::SocketAddr,
    process::ExitCode,
    sync::atomic::Ordering,
    time::Duration,
};

use clap::Parser;
use eyre::Context as _;
use randsrv_service::{RandomnessService, StartedServices, config::RandsrvConfig};

/// The configuration for the randomness server.
///
/// It can be configured via environment variables or command line arguments using `clap`.
#[derive(Parser, Debug)]
#[clap(version, about)]
pub struct RandsrvServerConfig {
    /// The bind addr of the AXUM server
    #[clap(long, env = "RANDSRV_BIND_ADDR", default_value = "127.0.0.1:8080")]
    pub bind_addr: SocketAddr,

    /// Max wait time the service waits for its workers during shutdown.
    #[clap(
        long,
        env = "RANDSRV_MAX_WAIT_TIME_SHUTDOWN",
        default_value = "10s",
        value_parser = humantime::parse_duration
    )]
    pub max_wait_time_shutdown: Duration,

    /// The service config
    #[clap(flatten)]
    pub service_config: RandsrvConfig,
}

fn install_tracing() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    let fmt_layer = fmt::layer().with_target(false).with_line_number(false);
    let filter_layer = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("randsrv=debug,randsrv_service=debug,info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}

#[tokio::main]
async fn main() -> eyre::Result<ExitCode> {
    install_tracing();
    randsrv_service::metrics::describe_metrics();
    tracing::info!("{}", randsrv_service::version_info());

    let config = RandsrvServerConfig::parse();
    let result = start_service(config, randsrv_service::default_shutdown_signal()).await;
    match result {
        Ok(()) => {
            tracing::info!("good night!");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            // we don't want to double print the error therefore we just return FAILURE
            tracing::error!("{err:?}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn start_service(
    config: RandsrvServerConfig,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> eyre::Result<()> {
    tracing::info!("starting randsrv with config: {config:#?}");
    let (cancellation_token, is_graceful_shutdown) =
        randsrv_service::spawn_shutdown_task(shutdown_signal);

    tracing::info!("init randomness service..");
    let (router, epoch_scheduler) = RandomnessService::init(
        config.service_config,
        StartedServices::default(),
        cancellation_token.clone(),
    )
    .build();

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("while binding to {}", config.bind_addr))?;
    let axum_cancel_token = cancellation_token.clone();
    let server = tokio::spawn(async move {
        tracing::info!(
            "starting axum server on {}",
            listener
                .local_addr()
                .map(|x| x.to_string())
                .unwrap_or(String::from("invalid addr"))
        );
        let axum_shutdown_signal = axum_cancel_token.clone();
        let axum_result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { axum_shutdown_signal.cancelled().await })
            .await;
        tracing::info!("axum server shutdown");
        if let Err(err) = axum_result {
            tracing::error!("got error from axum: {err:?}");
        }
        // we cancel the token in case axum encountered an error to shutdown the service
        axum_cancel_token.cancel();
    });

    tracing::info!("everything started successfully - now waiting for shutdown...");
    cancellation_token.cancelled().await;

    tracing::info!(
        "waiting for shutdown of services (max wait time {:?})..",
        config.max_wait_time_shutdown
    );
    match tokio::time::timeout(config.max_wait_time_shutdown, async move {
        tokio::join!(server, epoch_scheduler)
    })
    .await
    {
        Ok((_, Ok(Err(err)))) => tracing::error!("epoch scheduler failed: {err:?}"),
        Ok(_) => tracing::info!("successfully finished shutdown in time"),
        Err(_) => tracing::warn!("could not finish shutdown in time"),
    }
    if is_graceful_shutdown.load(Ordering::Relaxed) {
        Ok(())
    } else {
        eyre::bail!("Unexpected shutdown - check error logs")
    }
}

use std::future::IntoFuture;
use std::sync::Arc;

use anyhow::Context;
use tinylink_gateway::auth::JwtKeys;
use tinylink_gateway::backend::open_repository;
use tinylink_gateway::{App, AppState, Config};
use tinylink_shortener::grpc::SERVICE_NAME;
use tinylink_shortener::{ShortenerGrpcServer, ShortenerService};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tonic_health::ServingStatus;
use tracing::{error, info, warn};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    tinylink_telemetry::init(&config.log_level, config.log_format)?;

    info!(
        server_address = %config.server_address,
        grpc_address = %config.grpc_address,
        base_url = %config.base_url,
        workers = config.pipeline.workers,
        batch_size = config.pipeline.batch_size,
        "starting tinylink"
    );

    let repository = open_repository(
        config.database_dsn.as_deref(),
        config.file_storage_path.as_deref(),
    )
    .await
    .context("failed to open storage")?;
    let service = Arc::new(ShortenerService::new(repository, config.pipeline.clone()));

    let secret = match &config.jwt_secret {
        Some(secret) => secret.clone(),
        None => {
            warn!("no jwt secret configured, identities will not survive a restart");
            Uuid::new_v4().to_string()
        }
    };
    let state = AppState::new(
        Arc::clone(&service),
        config.base_url.clone(),
        JwtKeys::new(secret.as_bytes()),
        config.trusted_subnet,
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    let listener = TcpListener::bind(config.server_address)
        .await
        .with_context(|| format!("failed to bind {}", config.server_address))?;
    info!(listen_addr = %listener.local_addr()?, "http server listening");

    let http = {
        let shutdown = shutdown.clone();
        async move {
            let result = axum::serve(listener, App::router(state))
                .with_graceful_shutdown(shutdown.clone().cancelled_owned())
                .into_future()
                .await;
            shutdown.cancel();
            result
        }
    };

    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_service_status(SERVICE_NAME, ServingStatus::Serving)
        .await;
    let grpc_server = ShortenerGrpcServer::new(Arc::clone(&service), config.base_url.clone());
    let grpc_address = config.grpc_address;
    info!(listen_addr = %grpc_address, "grpc server listening");

    let grpc = {
        let shutdown = shutdown.clone();
        async move {
            let result = Server::builder()
                .add_service(health_service)
                .add_service(grpc_server.into_service())
                .serve_with_shutdown(grpc_address, shutdown.clone().cancelled_owned())
                .await;
            shutdown.cancel();
            result
        }
    };

    let (http, grpc) = tokio::join!(http, grpc);
    info!("servers stopped, draining background work");

    service.shutdown(config.shutdown_grace).await?;

    http.context("http server failed")?;
    grpc.context("grpc server failed")?;
    info!("bye");
    Ok(())
}

/// Cancels `shutdown` on ctrl-c or SIGTERM.
async fn watch_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = shutdown.cancelled() => return,
    }

    info!("shutdown signal received");
    shutdown.cancel();
}

use std::error::Error;
use std::future::IntoFuture;

use api::{AppConfig, DispatcherState, Runtime};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "dispatch_server=info,api=info,workers=info,broker=info,db=info,tower_http=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(
        addr = %config.addr(),
        broker = %config.broker_url,
        queue = %config.queue,
        "Loaded configuration"
    );

    let runtime = Runtime::start(config).await?;
    let app = runtime.router();

    let listener = tokio::net::TcpListener::bind(runtime.config().addr()).await?;
    tracing::info!(addr = %listener.local_addr()?, "Job server listening");

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();

    // A dispatcher that stops on its own takes the process down with it
    let dispatcher = tokio::select! {
        result = server => {
            result?;
            tracing::info!("Server stopped accepting connections, stopping dispatcher");
            None
        }
        state = runtime.wait_dispatcher() => Some(state),
    };

    runtime.shutdown().await;

    match dispatcher {
        Some(DispatcherState::Failed(reason)) => {
            Err(format!("dispatcher failed: {reason}").into())
        }
        Some(state) => Err(format!("dispatcher {} unexpectedly", state.as_str()).into()),
        None => {
            tracing::info!("Graceful shutdown complete");
            Ok(())
        }
    }
}

/// Wait for SIGINT or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

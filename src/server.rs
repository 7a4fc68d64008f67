//! HTTP serve loop and ordered shutdown

use std::future::Future;
use std::net::SocketAddr;

use tokio::{net::TcpListener, signal};
use tracing::{info, Instrument};

use crate::{app, startup::Application};

/// Serves until `shutdown` resolves, then drains in order: stop accepting,
/// wait for background tasks, close the pool.
pub async fn serve_with_shutdown<S>(
    listener: TcpListener,
    application: Application,
    shutdown: S,
) -> std::io::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let Application { state, metrics } = application;
    let span = state.logger().clone();

    async move {
        info!(
            addr = %listener.local_addr()?,
            metrics = ?metrics.names(),
            "starting server"
        );

        let router = app::app(state.clone(), metrics);
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!(
            outstanding = state.tasks().outstanding(),
            "completing background tasks"
        );
        state.tasks().wait().await;

        state.models().db().close().await;
        info!("stopped server");
        Ok::<(), std::io::Error>(())
    }
    .instrument(span)
    .await
}

/// Binds `0.0.0.0:{port}` and serves until Ctrl+C or SIGTERM.
pub async fn serve(application: Application) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], application.state.settings().port));
    let listener = TcpListener::bind(addr).await?;
    serve_with_shutdown(listener, application, shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        () = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}

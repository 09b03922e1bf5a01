use gr10_dashboard::{
    router,
    sync::{listen_to_all_progress, spawn_mirror_pump},
    AppState, Config, Dashboard, Mirror, RemoteMirror,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = Config::from_env();
    let client = reqwest::Client::builder()
        .timeout(config.remote_timeout)
        .build()?;

    let dashboard = Dashboard::open(&config, client.clone()).await;
    let events = dashboard.subscribe();
    let mirror = Mirror::from_config(&config.mirror, client);
    let (remote_tx, remote_rx) = watch::channel(None);
    let state = AppState::new(dashboard, mirror, remote_rx, config.start_date);

    if state.mirror.is_enabled() {
        info!("mirroring progress to {}", state.mirror.name());
        spawn_mirror_pump(
            Arc::clone(&state.dashboard),
            Arc::clone(&state.mirror),
            events,
        );
        match config.listen_every {
            Some(every) => {
                listen_to_all_progress(Arc::clone(&state.mirror), every, move |snapshot| {
                    remote_tx.send_replace(Some(snapshot));
                });
            }
            None => info!("remote listener disabled"),
        }
    }

    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

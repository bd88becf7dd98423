mod core;
mod http;

use blu_proto::config::Config;
use blu_proto::protocol::Status;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = blu_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("blud.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    // RUST_LOG wins; otherwise keep hyper/reqwest connection chatter out.
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "info,blu_engine=debug,blu_daemon=debug,hyper_util=warn,reqwest=warn",
                )
            }),
        )
        .init();

    eprintln!("blud log: {}", log_path.display());
    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let (status_tx, _) = broadcast::channel::<Status>(64);
    let (event_tx, event_rx) = mpsc::channel::<core::DaemonEvent>(256);
    let cancel = CancellationToken::new();

    let daemon_core = core::DaemonCore::new(config.clone(), status_tx.clone(), cancel.clone()).await?;

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            daemon_core.view(),
            daemon_core.libraries(),
            status_tx.clone(),
            event_tx.clone(),
        );
    } else {
        warn!("HTTP API disabled; nothing can reach the daemon");
    }

    let shutdown = cancel.clone();
    let shutdown_tx = event_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
        }
        if shutdown_tx.send(core::DaemonEvent::Shutdown).await.is_err() {
            shutdown.cancel();
        }
    });

    info!("Daemon initialised, running event loop");
    daemon_core.run(event_rx).await?;

    Ok(())
}

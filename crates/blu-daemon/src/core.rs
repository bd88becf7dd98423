/// DaemonCore: single-owner event loop for the engine.
///
/// Commands from the HTTP API arrive as `DaemonEvent`s. Library fetch
/// results and device status events are folded into `DaemonView`, which the
/// HTTP layer reads. Control requests run on their own tasks.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use blu_engine::library::FetchDone;
use blu_engine::volume::RampConfig;
use blu_engine::watcher::WatcherConfig;
use blu_engine::{CacheStore, Device, HttpTransport, Library, Player, StatusWatcher, VolumeRamp};
use blu_proto::config::Config;
use blu_proto::library::Service;
use blu_proto::protocol::{Command, NowPlaying, Status};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Slack on top of the status wait budget before the client gives up.
const POLL_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum DaemonEvent {
    ClientCommand(Command),
    Shutdown,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LibraryStatus {
    pub loading: bool,
    pub artists: usize,
    /// Last fetch failure. The previous index is still served.
    pub error: Option<String>,
}

/// Everything the API reports besides the indexes themselves.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DaemonView {
    pub status: Status,
    pub now_playing: Option<NowPlaying>,
    /// Row of the playing artist in its service's sorted artist list.
    pub highlight: Option<usize>,
    pub libraries: HashMap<Service, LibraryStatus>,
}

pub type Libraries = Arc<HashMap<Service, Arc<Library>>>;

pub struct DaemonCore {
    config: Config,
    device: Arc<Device>,
    libraries: Libraries,
    player: Player,
    ramp: VolumeRamp,
    view: Arc<RwLock<DaemonView>>,
    status_tx: broadcast::Sender<Status>,
    fetch_tx: mpsc::Sender<FetchDone>,
    fetch_rx: mpsc::Receiver<FetchDone>,
    cancel: CancellationToken,
}

impl DaemonCore {
    pub async fn new(
        config: Config,
        status_tx: broadcast::Sender<Status>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Self> {
        let transport = Arc::new(HttpTransport::new().context("building HTTP client")?);
        let poll_timeout = Duration::from_secs(config.device.status_wait_secs) + POLL_TIMEOUT_MARGIN;
        let poll_transport = Arc::new(
            HttpTransport::with_timeout(poll_timeout).context("building status HTTP client")?,
        );
        let device = Arc::new(
            Device::new(config.device.base_url.clone(), transport.clone())
                .with_poll_transport(poll_transport),
        );
        info!("Device at {}", device.base_url());

        let cache = CacheStore::load(config.cache.file.clone(), transport)
            .await
            .with_context(|| format!("loading cache {}", config.cache.file.display()))?
            .with_ttl(cache_ttl(config.cache.ttl_days));
        let cache = Arc::new(cache);

        let mut libraries = HashMap::new();
        let mut view = DaemonView::default();
        for (service, root_key) in config.library.services() {
            let library = Library::new(service, root_key, device.clone(), cache.clone());
            libraries.insert(service, Arc::new(library));
            view.libraries.insert(service, LibraryStatus::default());
        }

        let player = Player::new(device.clone(), status_tx.clone());
        let ramp = VolumeRamp::new(
            device.clone(),
            status_tx.clone(),
            RampConfig::from(&config.volume),
        );
        let (fetch_tx, fetch_rx) = mpsc::channel(16);

        Ok(Self {
            config,
            device,
            libraries: Arc::new(libraries),
            player,
            ramp,
            view: Arc::new(RwLock::new(view)),
            status_tx,
            fetch_tx,
            fetch_rx,
            cancel,
        })
    }

    pub fn view(&self) -> Arc<RwLock<DaemonView>> {
        Arc::clone(&self.view)
    }

    pub fn libraries(&self) -> Libraries {
        Arc::clone(&self.libraries)
    }

    /// Run until the event channel closes, a `Shutdown` arrives or the
    /// cancellation token fires.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<DaemonEvent>) -> anyhow::Result<()> {
        info!("DaemonCore: starting event loop");

        let mut status_rx = self.status_tx.subscribe();
        let watcher_config = WatcherConfig {
            wait_budget: Duration::from_secs(self.config.device.status_wait_secs),
            guard_interval: Duration::from_secs(self.config.device.guard_interval_secs),
        };
        let watcher = StatusWatcher::new(self.device.clone(), self.status_tx.clone(), watcher_config)
            .spawn(self.cancel.child_token());

        let services: Vec<Service> = self.libraries.keys().copied().collect();
        for service in services {
            self.start_fetch(service, true).await;
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("DaemonCore: cancelled");
                    break;
                }

                evt = event_rx.recv() => match evt {
                    None => {
                        info!("DaemonCore: event channel closed, shutting down");
                        break;
                    }
                    Some(DaemonEvent::Shutdown) => {
                        info!("DaemonCore: shutdown requested");
                        break;
                    }
                    Some(DaemonEvent::ClientCommand(cmd)) => {
                        info!("DaemonCore: command {:?}", cmd);
                        self.handle_command(cmd).await;
                    }
                },

                Some(done) = self.fetch_rx.recv() => {
                    self.handle_fetch_done(done).await;
                }

                status = status_rx.recv() => match status {
                    Ok(status) => self.handle_status(status).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("DaemonCore: lagged {} status events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        self.cancel.cancel();
        if let Err(e) = watcher.await {
            error!("Status watcher task failed: {}", e);
        }
        Ok(())
    }

    async fn handle_command(&mut self, cmd: Command) {
        let player = self.player.clone();
        match cmd {
            Command::Play { url } => {
                tokio::spawn(async move {
                    let _ = player.play(&url).await;
                });
            }
            Command::PlayPause => {
                tokio::spawn(async move {
                    let _ = player.play_pause().await;
                });
            }
            Command::Stop => {
                tokio::spawn(async move {
                    let _ = player.stop().await;
                });
            }
            Command::Next => {
                tokio::spawn(async move {
                    let _ = player.next().await;
                });
            }
            Command::Prev => {
                tokio::spawn(async move {
                    let _ = player.previous().await;
                });
            }
            Command::ToggleMute => {
                tokio::spawn(async move {
                    let _ = player.toggle_mute().await;
                });
            }
            Command::CycleRepeat => {
                tokio::spawn(async move {
                    let _ = player.cycle_repeat().await;
                });
            }
            Command::VolumeHold { increase } => self.ramp.volume_hold(increase),
            Command::Refresh { service } => self.start_fetch(service, false).await,
        }
    }

    async fn start_fetch(&mut self, service: Service, use_cache: bool) {
        let Some(library) = self.libraries.get(&service) else {
            warn!("Refresh requested for disabled service {}", service);
            return;
        };

        {
            let mut view = self.view.write().await;
            let entry = view.libraries.entry(service).or_default();
            if entry.loading {
                debug!("{} library fetch already running", service);
                return;
            }
            entry.loading = true;
        }

        library.spawn_fetch(use_cache, self.cancel.child_token(), self.fetch_tx.clone());
    }

    async fn handle_fetch_done(&mut self, done: FetchDone) {
        let mut view = self.view.write().await;
        let entry = view.libraries.entry(done.service).or_default();
        entry.loading = false;
        match done.result {
            Ok(index) => {
                info!("{} library ready: {} artists", done.service, index.len());
                entry.artists = index.len();
                entry.error = None;
            }
            Err(e) => {
                error!("{} library unavailable: {}", done.service, e);
                entry.error = Some(e.to_string());
            }
        }
        view.highlight = highlight(&self.libraries, view.now_playing.as_ref());
    }

    async fn handle_status(&mut self, status: Status) {
        let mut view = self.view.write().await;
        if !status.state.is_error() {
            view.now_playing = status.now_playing();
            view.highlight = highlight(&self.libraries, view.now_playing.as_ref());
        }
        view.status = status;
    }
}

fn cache_ttl(days: u64) -> Duration {
    Duration::from_secs(days.saturating_mul(24 * 60 * 60))
}

/// Row of the playing artist in the library of the service it plays from.
pub fn highlight(libraries: &Libraries, now_playing: Option<&NowPlaying>) -> Option<usize> {
    let np = now_playing?;
    libraries.get(&np.service)?.index().position_of(&np.artist)
}

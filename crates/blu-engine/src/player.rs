use std::sync::Arc;

use blu_proto::protocol::{RepeatMode, Status};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::device::Device;
use crate::error::DeviceError;

/// Transport controls. A failed control request is also published as a
/// `ctrlerr` status so the display can show it.
#[derive(Clone)]
pub struct Player {
    device: Arc<Device>,
    events: broadcast::Sender<Status>,
}

impl Player {
    pub fn new(device: Arc<Device>, events: broadcast::Sender<Status>) -> Self {
        Self { device, events }
    }

    /// Issue a catalog play or autoplay URL.
    pub async fn play(&self, url: &str) -> Result<(), DeviceError> {
        info!("Play {}", url);
        let r = self.device.play(url).await;
        self.report("play", r)
    }

    pub async fn play_pause(&self) -> Result<(), DeviceError> {
        let r = self.device.toggle_pause().await;
        self.report("play/pause", r)
    }

    pub async fn stop(&self) -> Result<(), DeviceError> {
        let r = self.device.stop().await;
        self.report("stop", r)
    }

    pub async fn next(&self) -> Result<(), DeviceError> {
        let r = self.device.skip().await;
        self.report("next", r)
    }

    pub async fn previous(&self) -> Result<(), DeviceError> {
        let r = self.device.back().await;
        self.report("previous", r)
    }

    pub async fn toggle_mute(&self) -> Result<(), DeviceError> {
        let r = async {
            let volume = self.device.volume().await?;
            self.device.set_mute(!volume.muted).await
        }
        .await;
        self.report("mute", r)
    }

    /// Move the device to the next repeat mode and return it.
    pub async fn cycle_repeat(&self) -> Result<RepeatMode, DeviceError> {
        let r = async {
            let current = self.device.status().await?.repeat;
            let next = current.next();
            self.device.set_repeat(next).await?;
            Ok::<_, DeviceError>(next)
        }
        .await;
        if let Ok(mode) = &r {
            info!("Repeat mode {:?}", mode);
        }
        self.report("repeat", r)
    }

    fn report<T>(&self, what: &str, r: Result<T, DeviceError>) -> Result<T, DeviceError> {
        if let Err(e) = &r {
            warn!("Player {} failed: {}", what, e);
            let _ = self.events.send(Status::control_error());
        }
        r
    }
}

//! Hold-to-repeat volume accelerator.
//!
//! The input layer fires one `volume_hold` per key-repeat tick. Ticks are
//! collected for a short window and resolved into a single step command:
//! a small step for a tap or short hold, a large step followed by a
//! cooldown for a long hold.
//!
//! The step reads the device volume and then writes the new level. Nothing
//! makes that pair atomic on the device, so a volume change from another
//! controller in between is overwritten.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use blu_proto::config::VolumeConfig;
use blu_proto::protocol::Status;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::DeviceError;

#[async_trait]
pub trait VolumeControl: Send + Sync {
    /// Fresh read of the device volume.
    async fn current_volume(&self) -> Result<i32, DeviceError>;
    async fn set_volume(&self, level: i32) -> Result<(), DeviceError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RampConfig {
    pub window: Duration,
    pub small_step: i32,
    pub large_step: i32,
    pub large_threshold: u32,
    pub cooldown: Duration,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(500),
            small_step: 3,
            large_step: 10,
            large_threshold: 5,
            cooldown: Duration::from_secs(5),
        }
    }
}

impl From<&VolumeConfig> for RampConfig {
    fn from(cfg: &VolumeConfig) -> Self {
        Self {
            window: Duration::from_millis(cfg.window_ms),
            small_step: cfg.small_step,
            large_step: cfg.large_step,
            large_threshold: cfg.large_threshold,
            cooldown: Duration::from_secs(cfg.cooldown_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VolumeRampState {
    pub pending: u32,
    pub window_open: bool,
    pub cooldown: bool,
    /// Direction of the most recent hold in the open window.
    pub increase: bool,
}

struct Shared {
    control: Arc<dyn VolumeControl>,
    events: broadcast::Sender<Status>,
    config: RampConfig,
    state: Mutex<VolumeRampState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, VolumeRampState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Clone)]
pub struct VolumeRamp {
    shared: Arc<Shared>,
}

impl VolumeRamp {
    pub fn new(
        control: Arc<dyn VolumeControl>,
        events: broadcast::Sender<Status>,
        config: RampConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                control,
                events,
                config,
                state: Mutex::new(VolumeRampState::default()),
            }),
        }
    }

    pub fn state(&self) -> VolumeRampState {
        *self.shared.lock()
    }

    /// Register one hold tick. Never blocks; the first tick after a
    /// resolution opens a collection window on its own task.
    pub fn volume_hold(&self, increase: bool) {
        let open_window = {
            let mut state = self.shared.lock();
            if state.cooldown {
                return;
            }
            state.pending += 1;
            state.increase = increase;
            if state.window_open {
                false
            } else {
                state.window_open = true;
                true
            }
        };

        if open_window {
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move { resolve(shared).await });
        }
    }
}

async fn resolve(shared: Arc<Shared>) {
    let config = shared.config;
    tokio::time::sleep(config.window).await;

    let (count, increase, large) = {
        let mut state = shared.lock();
        let count = state.pending;
        let large = count >= config.large_threshold;
        state.pending = 0;
        state.window_open = false;
        state.cooldown = large;
        (count, state.increase, large)
    };
    let cooldown_until = Instant::now() + config.cooldown;

    let step = if large { config.large_step } else { config.small_step };
    let delta = if increase { step } else { -step };
    debug!("Volume hold: {} ticks, step {:+}", count, delta);

    if let Err(e) = apply_step(shared.control.as_ref(), delta).await {
        warn!("Volume step failed: {}", e);
        let _ = shared.events.send(Status::control_error());
    }

    if large {
        tokio::time::sleep_until(cooldown_until).await;
        shared.lock().cooldown = false;
    }
}

async fn apply_step(control: &dyn VolumeControl, delta: i32) -> Result<(), DeviceError> {
    let current = control.current_volume().await?;
    let target = (current + delta).clamp(0, 100);
    control.set_volume(target).await
}

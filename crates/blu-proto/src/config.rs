use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::library::Service;
use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub volume: VolumeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Base URL of the player's control API, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Server-side wait budget sent with every status long-poll.
    #[serde(default = "default_status_wait_secs")]
    pub status_wait_secs: u64,
    /// Pause between two status polls after a change was delivered.
    #[serde(default = "default_guard_interval_secs")]
    pub guard_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "platform::cache_file")]
    pub file: PathBuf,
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u64,
}

/// One backing music service the library is built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Browse key of the service's root node, unescaped.
    pub root_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    #[serde(default = "default_local")]
    pub local: ServiceConfig,
    #[serde(default = "default_tidal")]
    pub tidal: ServiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeConfig {
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_small_step")]
    pub small_step: i32,
    #[serde(default = "default_large_step")]
    pub large_step: i32,
    /// Presses collected in one window at which the large step kicks in.
    #[serde(default = "default_large_threshold")]
    pub large_threshold: u32,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            status_wait_secs: default_status_wait_secs(),
            guard_interval_secs: default_guard_interval_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            file: platform::cache_file(),
            ttl_days: default_ttl_days(),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            local: default_local(),
            tidal: default_tidal(),
        }
    }
}

impl LibraryConfig {
    /// Enabled services paired with their root browse keys.
    pub fn services(&self) -> Vec<(Service, String)> {
        [(Service::Local, &self.local), (Service::Tidal, &self.tidal)]
            .into_iter()
            .filter(|(_, cfg)| cfg.enabled)
            .map(|(service, cfg)| (service, cfg.root_key.clone()))
            .collect()
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            small_step: default_small_step(),
            large_step: default_large_step(),
            large_threshold: default_large_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://bluesound.local:11000".to_string()
}

fn default_status_wait_secs() -> u64 {
    60
}

fn default_guard_interval_secs() -> u64 {
    5
}

fn default_ttl_days() -> u64 {
    7
}

fn default_true() -> bool {
    true
}

fn default_local() -> ServiceConfig {
    ServiceConfig {
        enabled: true,
        root_key: "LocalMusic:bySection/%2FAlbums%3Fservice%3DLocalMusic".to_string(),
    }
}

fn default_tidal() -> ServiceConfig {
    ServiceConfig {
        enabled: true,
        root_key: "Tidal:menu/Favourites/Albums".to_string(),
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

fn default_window_ms() -> u64 {
    500
}

fn default_small_step() -> i32 {
    3
}

fn default_large_step() -> i32 {
    10
}

fn default_large_threshold() -> u32 {
    5
}

fn default_cooldown_secs() -> u64 {
    5
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

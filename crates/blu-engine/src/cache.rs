//! TTL cache of device response bodies, persisted as one JSON snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::transport::Transport;

pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Response body of the request.
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

pub struct CacheStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
    path: PathBuf,
    ttl: chrono::Duration,
    transport: Arc<dyn Transport>,
}

impl CacheStore {
    /// Load the snapshot at `path`. A missing file is an empty cache and so
    /// is a malformed one, after a warning.
    pub async fn load(
        path: impl Into<PathBuf>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, CacheError> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<HashMap<String, CacheEntry>>(&bytes) {
                Ok(entries) => {
                    debug!("Loaded {} cache entries from {}", entries.len(), path.display());
                    entries
                }
                Err(e) => {
                    warn!("Ignoring malformed cache file {}: {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            entries: Mutex::new(entries),
            path,
            ttl: to_chrono(DEFAULT_TTL),
            transport,
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = to_chrono(ttl);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Body of `key`, served from the cache when `use_cache` is set and a
    /// live entry exists, fetched otherwise.
    ///
    /// A failed retrieval leaves the cache untouched. A failed persist is
    /// returned even though the in-memory entry has already been replaced.
    pub async fn fetch_or_load(&self, key: &str, use_cache: bool) -> Result<Vec<u8>, CacheError> {
        if use_cache {
            let entries = self.entries.lock().await;
            if let Some(entry) = entries.get(key).filter(|e| e.is_live(Utc::now())) {
                return Ok(entry.payload.clone());
            }
        }

        let payload = self.transport.get(key).await?;

        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            CacheEntry {
                payload: payload.clone(),
                expires_at: Utc::now() + self.ttl,
            },
        );
        if let Err(e) = self.persist(&entries).await {
            warn!("Failed to persist cache to {}: {}", self.path.display(), e);
            return Err(e);
        }

        Ok(payload)
    }

    /// Mark `key` stale so the next cached read goes to the network.
    pub async fn expire(&self, key: &str) {
        if let Some(entry) = self.entries.lock().await.get_mut(key) {
            entry.expires_at = Utc::now();
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    async fn persist(&self, entries: &HashMap<String, CacheEntry>) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Longest TTL honoured; keeps `now + ttl` inside chrono's range.
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d.min(MAX_TTL)).unwrap_or_else(|_| chrono::Duration::days(7))
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

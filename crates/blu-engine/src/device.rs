//! Typed client for the player's control endpoints.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use blu_proto::library::Service;
use blu_proto::protocol::{RepeatMode, Status};

use crate::error::DeviceError;
use crate::transport::Transport;
use crate::volume::VolumeControl;
use crate::watcher::StatusSource;
use crate::xml::{self, StatusXml, VolumeXml};

/// Current volume level and mute flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeLevel {
    pub level: i32,
    pub muted: bool,
}

#[derive(Clone)]
pub struct Device {
    base_url: String,
    transport: Arc<dyn Transport>,
    /// Separate transport for status long-polls, whose client timeout has
    /// to sit above the server-side wait budget.
    poll_transport: Arc<dyn Transport>,
}

impl Device {
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            poll_transport: Arc::clone(&transport),
            transport,
        }
    }

    pub fn with_poll_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.poll_transport = transport;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a device path such as `/Status` or a catalog play URL.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// URL of one catalog node. Browse keys are opaque and escaped once.
    pub fn browse_url(&self, key: &str) -> String {
        self.url(&format!("/Browse?key={}", urlencoding::encode(key)))
    }

    /// URL of the per-album metadata query.
    pub fn songs_url(&self, service: Service, album: &str, artist: &str) -> String {
        self.url(&format!(
            "/Songs?service={}&album={}&artist={}",
            service.wire_name(),
            form_encode(album),
            form_encode(artist)
        ))
    }

    pub fn status_url(&self, etag: Option<&str>, wait: Duration) -> String {
        let mut url = self.url(&format!("/Status?timeout={}", wait.as_secs()));
        if let Some(etag) = etag.filter(|e| !e.is_empty()) {
            url.push_str("&etag=");
            url.push_str(&urlencoding::encode(etag));
        }
        url
    }

    /// Long-poll `/Status`. With an etag the device holds the request until
    /// its state differs from that snapshot or `wait` runs out.
    pub async fn poll_status(
        &self,
        etag: Option<&str>,
        wait: Duration,
    ) -> Result<Status, DeviceError> {
        let body = self.poll_transport.get(&self.status_url(etag, wait)).await?;
        decode_status(&body)
    }

    /// Immediate status snapshot.
    pub async fn status(&self) -> Result<Status, DeviceError> {
        let body = self.transport.get(&self.url("/Status")).await?;
        decode_status(&body)
    }

    /// Fresh volume read, never cached.
    pub async fn volume(&self) -> Result<VolumeLevel, DeviceError> {
        let body = self.transport.get(&self.url("/Volume")).await?;
        let vol: VolumeXml = xml::decode(&body).map_err(|source| DeviceError::Decode {
            endpoint: "/Volume",
            source,
        })?;

        let level = vol
            .level
            .trim()
            .parse::<i32>()
            .map_err(|_| DeviceError::InvalidField {
                endpoint: "/Volume",
                field: "level",
                value: vol.level.clone(),
            })?;
        let muted = match vol.mute.trim() {
            "1" | "true" => true,
            "0" | "false" | "" => false,
            other => {
                return Err(DeviceError::InvalidField {
                    endpoint: "/Volume",
                    field: "mute",
                    value: other.to_string(),
                })
            }
        };
        Ok(VolumeLevel { level, muted })
    }

    pub async fn set_volume(&self, level: i32) -> Result<(), DeviceError> {
        self.command(&format!("/Volume?level={level}")).await
    }

    pub async fn set_mute(&self, muted: bool) -> Result<(), DeviceError> {
        self.command(&format!("/Volume?mute={}", u8::from(muted))).await
    }

    pub async fn set_repeat(&self, mode: RepeatMode) -> Result<(), DeviceError> {
        self.command(&format!("/Repeat?state={}", mode.to_wire())).await
    }

    pub async fn toggle_pause(&self) -> Result<(), DeviceError> {
        self.command("/Pause?toggle=1").await
    }

    pub async fn stop(&self) -> Result<(), DeviceError> {
        self.command("/Stop").await
    }

    pub async fn skip(&self) -> Result<(), DeviceError> {
        self.command("/Skip").await
    }

    pub async fn back(&self) -> Result<(), DeviceError> {
        self.command("/Back").await
    }

    /// Issue a catalog play or autoplay URL verbatim.
    pub async fn play(&self, url: &str) -> Result<(), DeviceError> {
        self.command(url).await
    }

    async fn command(&self, path: &str) -> Result<(), DeviceError> {
        self.transport.get(&self.url(path)).await?;
        Ok(())
    }
}

fn decode_status(body: &[u8]) -> Result<Status, DeviceError> {
    let status: StatusXml = xml::decode(body).map_err(|source| DeviceError::Decode {
        endpoint: "/Status",
        source,
    })?;
    Ok(status.into())
}

/// Query value escaping with spaces as '+', the way the device's own
/// clients build metadata queries.
fn form_encode(value: &str) -> String {
    urlencoding::encode(value).replace("%20", "+")
}

#[async_trait]
impl StatusSource for Device {
    async fn poll_status(
        &self,
        etag: Option<&str>,
        wait: Duration,
    ) -> Result<Status, DeviceError> {
        Device::poll_status(self, etag, wait).await
    }
}

#[async_trait]
impl VolumeControl for Device {
    async fn current_volume(&self) -> Result<i32, DeviceError> {
        Ok(self.volume().await?.level)
    }

    async fn set_volume(&self, level: i32) -> Result<(), DeviceError> {
        Device::set_volume(self, level).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;

    struct NoTransport;

    #[async_trait]
    impl Transport for NoTransport {
        async fn get(&self, _url: &str) -> Result<Vec<u8>, TransportError> {
            Err(TransportError::Other("offline".to_string()))
        }
    }

    fn device() -> Device {
        Device::new("http://bluesound.local:11000/", Arc::new(NoTransport))
    }

    #[test]
    fn test_browse_url_escapes_key_once() {
        assert_eq!(
            device().browse_url("LocalMusic:bySection/%2FAlbums%3Fservice%3DLocalMusic"),
            "http://bluesound.local:11000/Browse?key=LocalMusic%3AbySection%2F%252FAlbums%253Fservice%253DLocalMusic"
        );
    }

    #[test]
    fn test_songs_url_uses_plus_for_spaces() {
        assert_eq!(
            device().songs_url(Service::Local, "The History Of Rock", "Kid Rock"),
            "http://bluesound.local:11000/Songs?service=LocalMusic&album=The+History+Of+Rock&artist=Kid+Rock"
        );
    }

    #[test]
    fn test_status_url() {
        let d = device();
        assert_eq!(
            d.status_url(None, Duration::from_secs(60)),
            "http://bluesound.local:11000/Status?timeout=60"
        );
        assert_eq!(
            d.status_url(Some("abc"), Duration::from_secs(60)),
            "http://bluesound.local:11000/Status?timeout=60&etag=abc"
        );
    }

    #[test]
    fn test_play_url_is_issued_verbatim() {
        assert_eq!(
            device().url("/Add?playnow=1&file=Kid%20Rock"),
            "http://bluesound.local:11000/Add?playnow=1&file=Kid%20Rock"
        );
    }
}

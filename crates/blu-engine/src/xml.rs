//! Wire format of the device's XML endpoints.
//!
//! Numeric fields are kept as strings here and parsed leniently when
//! converted, because the device leaves them empty in several states.

use blu_proto::protocol::{PlayerState, RepeatMode, Status};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// `/Browse` response: one node of the catalog navigation tree.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Browse {
    #[serde(rename = "item", default)]
    pub items: Vec<BrowseItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrowseItem {
    /// Album name or track name.
    #[serde(rename = "@text", default)]
    pub text: String,
    /// Artist name.
    #[serde(rename = "@text2", default)]
    pub text2: String,
    #[serde(rename = "@browseKey", default)]
    pub browse_key: String,
    #[serde(rename = "@type", default)]
    pub kind: String,
    #[serde(rename = "@playURL", default)]
    pub play_url: String,
    #[serde(rename = "@autoplayURL", default)]
    pub autoplay_url: String,
    #[serde(rename = "@duration", default)]
    pub duration: String,
    #[serde(rename = "@contextMenuKey", default)]
    pub context_menu_key: String,
}

/// `/Songs` response, used only for album release metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Songs {
    #[serde(rename = "album", default)]
    pub albums: Vec<SongsAlbum>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SongsAlbum {
    #[serde(rename = "song", default)]
    pub songs: Vec<Song>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Song {
    #[serde(default)]
    pub date: String,
    /// Filesystem path of the song on the music share.
    #[serde(rename = "fn", default)]
    pub path: String,
}

impl Songs {
    pub fn first_song(&self) -> Option<&Song> {
        self.albums.first().and_then(|a| a.songs.first())
    }
}

/// `/Status` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusXml {
    #[serde(rename = "@etag", default)]
    pub etag: String,
    #[serde(default)]
    pub volume: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title2: String,
    #[serde(default)]
    pub title3: String,
    #[serde(rename = "streamFormat", default)]
    pub stream_format: String,
    #[serde(default)]
    pub quality: String,
    #[serde(default)]
    pub totlen: String,
    #[serde(default)]
    pub secs: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub repeat: String,
    #[serde(default)]
    pub service: String,
}

impl From<StatusXml> for Status {
    fn from(x: StatusXml) -> Self {
        Status {
            etag: x.etag,
            volume: lenient_int(&x.volume) as i32,
            album: x.album,
            artist: x.artist,
            track: x.name,
            secondary_title: x.title2,
            tertiary_title: x.title3,
            stream_format: x.stream_format,
            quality: x.quality,
            total_length_secs: lenient_int(&x.totlen),
            elapsed_secs: lenient_int(&x.secs),
            state: PlayerState::from_wire(x.state.trim()),
            repeat: if x.repeat.trim().is_empty() {
                RepeatMode::None
            } else {
                RepeatMode::from_wire(lenient_int(&x.repeat) as i32)
            },
            service: x.service,
        }
    }
}

/// `/Volume` response: `<volume mute="0">34</volume>`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VolumeXml {
    #[serde(rename = "@mute", default)]
    pub mute: String,
    #[serde(rename = "$text", default)]
    pub level: String,
}

pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, quick_xml::DeError> {
    let text = String::from_utf8_lossy(body);
    quick_xml::de::from_str(&text)
}

/// Integer field that may be empty, padded, or fractional ("245.3").
fn lenient_int(s: &str) -> i64 {
    let s = s.trim();
    s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        .unwrap_or(0)
}

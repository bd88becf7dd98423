//! Library data model: the Artist -> Album -> Track index built from the
//! device catalog, and the read-only queries the presentation layer runs on it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Backing music service a library is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    /// Device-attached or network share music, grouped in alphabetic buckets.
    Local,
    /// Streaming favourites, returned as one flat album list.
    Tidal,
}

impl Service {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Tidal => "tidal",
        }
    }

    /// Service name the device uses in status payloads and metadata queries.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Local => "LocalMusic",
            Self::Tidal => "Tidal",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "LocalMusic" => Some(Self::Local),
            "Tidal" => Some(Self::Tidal),
            _ => None,
        }
    }

    /// Whether the root node lists alphabetic buckets rather than albums.
    pub fn is_bucketed(self) -> bool {
        matches!(self, Self::Local)
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "tidal" => Ok(Self::Tidal),
            other => Err(format!("unknown service: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    pub duration_secs: u32,
    pub disc_number: u32,
    pub track_number: u32,
    pub play_url: String,
    pub autoplay_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Album {
    pub name: String,
    /// Release year, 0 when unknown.
    pub year: i32,
    pub duration_secs: u32,
    pub tracks: Vec<Track>,
    pub play_url: String,
    pub autoplay_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Artist {
    pub albums: Vec<Album>,
}

/// Artist index keyed by canonical artist name, plus the display order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArtistIndex {
    pub artists: HashMap<String, Artist>,
    /// Case-insensitively sorted artist names.
    pub names: Vec<String>,
}

impl ArtistIndex {
    /// Finalise a freshly grouped map: sort names and order every artist's
    /// albums by year. Albums with equal years keep their insertion order.
    pub fn from_artists(mut artists: HashMap<String, Artist>) -> Self {
        let mut names: Vec<String> = artists.keys().cloned().collect();
        names.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)));

        for artist in artists.values_mut() {
            artist.albums.sort_by_key(|album| album.year);
        }

        Self { artists, names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn artist(&self, name: &str) -> Option<&Artist> {
        self.artists.get(name)
    }

    /// Row of `name` in the sorted artist list.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        let key = canonical_artist_name(name);
        self.names.iter().position(|n| *n == key)
    }

    /// Play and autoplay URLs of a track.
    pub fn track_urls(&self, artist: &str, album: &str, track: &str) -> Option<(&str, &str)> {
        self.artists
            .get(artist)?
            .albums
            .iter()
            .filter(|a| a.name == album)
            .flat_map(|a| a.tracks.iter())
            .find(|t| t.name == track)
            .map(|t| (t.play_url.as_str(), t.autoplay_url.as_str()))
    }
}

/// Title-case every word: first letter upper, the rest lower.
pub fn canonical_artist_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut word_start = true;
    for c in name.chars() {
        if c.is_alphanumeric() {
            if word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            word_start = false;
        } else {
            out.push(c);
            // "Don't" stays one word
            word_start = c != '\'' && c != '\u{2019}';
        }
    }
    out
}

/// Strip a leading "NN. " track number from a catalog track name.
pub fn clean_track_name(name: &str) -> &str {
    leading_track_number(name).map_or(name, |(_, rest)| rest)
}

/// Leading "NN. " number of a catalog track name, with the remainder.
pub fn leading_track_number(name: &str) -> Option<(u32, &str)> {
    let digits = name.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let rest = name[digits..].strip_prefix(". ")?;
    let number = name[..digits].parse().ok()?;
    Some((number, rest))
}

/// Seconds as "MM:SS".
pub fn format_duration(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

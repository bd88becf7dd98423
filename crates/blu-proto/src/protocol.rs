use serde::{Deserialize, Serialize};

use crate::library::Service;

/// Commands accepted by the daemon core from its API surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    /// Issue a catalog play or autoplay URL verbatim.
    Play { url: String },
    PlayPause,
    Stop,
    Next,
    Prev,
    ToggleMute,
    CycleRepeat,
    VolumeHold { increase: bool },
    Refresh { service: Service },
}

/// Playback state reported by the device, plus the two synthetic error
/// states the engine injects into the status stream.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum PlayerState {
    Play,
    Stream,
    Pause,
    #[default]
    Stop,
    Connecting,
    /// Device unreachable (DNS failure or connection refused).
    NetworkError,
    /// A control request (volume, transport) failed.
    ControlError,
    Other(String),
}

impl PlayerState {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "play" => Self::Play,
            "stream" => Self::Stream,
            "pause" => Self::Pause,
            "stop" | "" => Self::Stop,
            "connecting" => Self::Connecting,
            "network-error" | "neterr" => Self::NetworkError,
            "ctrlerr" => Self::ControlError,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Play => "play",
            Self::Stream => "stream",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::Connecting => "connecting",
            Self::NetworkError => "network-error",
            Self::ControlError => "ctrlerr",
            Self::Other(s) => s,
        }
    }

    /// Human readable label for a status line.
    pub fn label(&self) -> &str {
        match self {
            Self::Play => "playing",
            Self::Stream => "streaming",
            Self::Pause => "paused",
            Self::Stop => "stopped",
            Self::Connecting => "connecting",
            Self::NetworkError => "network error",
            Self::ControlError => "player control error",
            Self::Other(s) => s,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::NetworkError | Self::ControlError)
    }
}

impl From<String> for PlayerState {
    fn from(s: String) -> Self {
        Self::from_wire(&s)
    }
}

impl From<PlayerState> for String {
    fn from(state: PlayerState) -> Self {
        state.as_str().to_string()
    }
}

/// Repeat mode. The device encodes it as 0 (all), 1 (one), 2 (none).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    None,
    All,
    One,
}

impl RepeatMode {
    pub fn from_wire(v: i32) -> Self {
        match v {
            0 => Self::All,
            1 => Self::One,
            _ => Self::None,
        }
    }

    pub fn to_wire(self) -> i32 {
        match self {
            Self::All => 0,
            Self::One => 1,
            Self::None => 2,
        }
    }

    /// none -> all -> one -> none
    pub fn next(self) -> Self {
        match self {
            Self::None => Self::All,
            Self::All => Self::One,
            Self::One => Self::None,
        }
    }
}

/// Latest device status snapshot. Never persisted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Status {
    pub etag: String,
    pub volume: i32,
    pub album: String,
    pub artist: String,
    pub track: String,
    /// Alternate titles used by streams that carry no artist/track.
    pub secondary_title: String,
    pub tertiary_title: String,
    pub stream_format: String,
    pub quality: String,
    pub total_length_secs: i64,
    pub elapsed_secs: i64,
    pub state: PlayerState,
    pub repeat: RepeatMode,
    /// Originating service as reported by the device, e.g. "LocalMusic".
    pub service: String,
}

/// What is currently playing, published for whoever owns the display so it
/// can re-highlight the artist and track in its library view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub service: Service,
    pub artist: String,
    pub track: String,
}

impl Status {
    pub fn network_error() -> Self {
        Self {
            state: PlayerState::NetworkError,
            ..Self::default()
        }
    }

    pub fn control_error() -> Self {
        Self {
            state: PlayerState::ControlError,
            ..Self::default()
        }
    }

    /// Title shown for the current item, which depends on whether the device
    /// is playing a library track or a stream.
    pub fn now_playing_title(&self) -> String {
        match self.state {
            PlayerState::Play => format!("{} - {}", self.artist, self.track),
            PlayerState::Stream => self.secondary_title.clone(),
            PlayerState::Pause => {
                if self.artist.is_empty() && self.track.is_empty() {
                    self.tertiary_title.clone()
                } else {
                    format!("{} - {}", self.artist, self.track)
                }
            }
            _ => String::new(),
        }
    }

    /// "playing | 24/96 FLAC" style line; error and stopped states carry no format.
    pub fn state_line(&self) -> String {
        let show_format = matches!(
            self.state,
            PlayerState::Play | PlayerState::Stream | PlayerState::Pause
        );
        if show_format && !(self.quality.is_empty() && self.stream_format.is_empty()) {
            format!(
                "{} | {} {}",
                self.state.label(),
                self.quality,
                self.stream_format
            )
        } else {
            self.state.label().to_string()
        }
    }

    /// Library item to highlight, if any. Only library playback from a
    /// known service maps back into an artist index.
    pub fn now_playing(&self) -> Option<NowPlaying> {
        if !matches!(self.state, PlayerState::Play | PlayerState::Pause) {
            return None;
        }
        if self.artist.is_empty() {
            return None;
        }
        let service = Service::from_wire(&self.service)?;
        Some(NowPlaying {
            service,
            artist: self.artist.clone(),
            track: self.track.clone(),
        })
    }
}

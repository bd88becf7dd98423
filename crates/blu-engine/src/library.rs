//! Library synchronizer: walks the device catalog of one service and builds
//! an [`ArtistIndex`] from it.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use blu_proto::library::{
    canonical_artist_name, clean_track_name, leading_track_number, Album, Artist, ArtistIndex,
    Service, Track,
};
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::device::Device;
use crate::error::LibraryError;
use crate::xml::{self, Browse, BrowseItem, Songs};

/// Root browse key of the local music collection, grouped by letter.
pub const LOCAL_ROOT_KEY: &str = "LocalMusic:bySection/%2FAlbums%3Fservice%3DLocalMusic";
/// Root browse key of the streaming favourites album list.
pub const TIDAL_ROOT_KEY: &str = "Tidal:menu/Favourites/Albums";

/// Outcome of a background fetch, one per [`Library::spawn_fetch`].
#[derive(Debug)]
pub struct FetchDone {
    pub service: Service,
    pub result: Result<Arc<ArtistIndex>, LibraryError>,
}

pub struct Library {
    service: Service,
    root_key: String,
    device: Arc<Device>,
    cache: Arc<CacheStore>,
    index: RwLock<Arc<ArtistIndex>>,
}

impl Library {
    pub fn new(
        service: Service,
        root_key: impl Into<String>,
        device: Arc<Device>,
        cache: Arc<CacheStore>,
    ) -> Self {
        Self {
            service,
            root_key: root_key.into(),
            device,
            cache,
            index: RwLock::new(Arc::new(ArtistIndex::default())),
        }
    }

    pub fn service(&self) -> Service {
        self.service
    }

    /// Index currently served. Stays valid while a rebuild runs.
    pub fn index(&self) -> Arc<ArtistIndex> {
        match self.index.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// Build a fresh index from the catalog. The served index is untouched.
    pub async fn fetch_data(
        &self,
        use_cache: bool,
        cancel: &CancellationToken,
    ) -> Result<ArtistIndex, LibraryError> {
        info!("Fetching {} library (use_cache={})", self.service, use_cache);

        check(cancel)?;
        let root = self.browse(&self.root_key, use_cache).await?;

        let album_items = if self.service.is_bucketed() {
            let mut albums = Vec::new();
            for bucket in &root.items {
                check(cancel)?;
                if bucket.browse_key.is_empty() {
                    continue;
                }
                let list = self.browse(&bucket.browse_key, use_cache).await?;
                albums.extend(list.items);
            }
            albums
        } else {
            root.items
        };

        let mut artists: HashMap<String, Artist> = HashMap::new();
        for item in &album_items {
            check(cancel)?;
            let album = self.fetch_album(item, use_cache).await?;
            artists
                .entry(canonical_artist_name(&item.text2))
                .or_default()
                .albums
                .push(album);
        }

        let index = ArtistIndex::from_artists(artists);
        info!(
            "{} library: {} artists from {} albums",
            self.service,
            index.len(),
            album_items.len()
        );
        Ok(index)
    }

    /// Build a new index and swap it in. On failure the previous index keeps
    /// being served.
    pub async fn refresh(
        &self,
        use_cache: bool,
        cancel: &CancellationToken,
    ) -> Result<Arc<ArtistIndex>, LibraryError> {
        let index = Arc::new(self.fetch_data(use_cache, cancel).await?);
        match self.index.write() {
            Ok(mut guard) => *guard = Arc::clone(&index),
            Err(poisoned) => *poisoned.into_inner() = Arc::clone(&index),
        }
        Ok(index)
    }

    /// Rebuild bypassing the cache.
    pub async fn update_data(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<ArtistIndex>, LibraryError> {
        self.refresh(false, cancel).await
    }

    /// Run [`Library::refresh`] on its own task and report the outcome on `tx`.
    pub fn spawn_fetch(
        self: &Arc<Self>,
        use_cache: bool,
        cancel: CancellationToken,
        tx: mpsc::Sender<FetchDone>,
    ) -> JoinHandle<()> {
        let library = Arc::clone(self);
        tokio::spawn(async move {
            let result = library.refresh(use_cache, &cancel).await;
            if let Err(e) = &result {
                warn!("{} library fetch failed: {}", library.service, e);
            }
            let done = FetchDone {
                service: library.service,
                result,
            };
            if tx.send(done).await.is_err() {
                debug!("Library fetch result dropped, receiver gone");
            }
        })
    }

    async fn browse(&self, key: &str, use_cache: bool) -> Result<Browse, LibraryError> {
        let body = self
            .cache
            .fetch_or_load(&self.device.browse_url(key), use_cache)
            .await?;
        xml::decode(&body).map_err(|source| LibraryError::Decode {
            what: "browse listing",
            source,
        })
    }

    async fn fetch_album(&self, item: &BrowseItem, use_cache: bool) -> Result<Album, LibraryError> {
        let listing = if item.browse_key.is_empty() {
            Browse::default()
        } else {
            self.browse(&item.browse_key, use_cache).await?
        };

        let tracks: Vec<Track> = listing
            .items
            .iter()
            .enumerate()
            .map(|(pos, t)| parse_track(pos, t))
            .collect();
        let duration_secs = tracks.iter().map(|t| t.duration_secs).sum();

        let context_key = listing
            .items
            .first()
            .map(|t| t.context_menu_key.as_str())
            .unwrap_or_default();
        let year = self
            .resolve_year(&item.text, &canonical_artist_name(&item.text2), context_key, use_cache)
            .await;

        Ok(Album {
            name: item.text.clone(),
            year,
            duration_secs,
            tracks,
            play_url: item.play_url.clone(),
            autoplay_url: item.autoplay_url.clone(),
        })
    }

    /// Release year from the songs metadata, then the context menu key, then
    /// the file path. 0 when nothing yields a year.
    async fn resolve_year(
        &self,
        album: &str,
        artist: &str,
        context_key: &str,
        use_cache: bool,
    ) -> i32 {
        let songs = match self.songs(album, artist, use_cache).await {
            Ok(songs) => Some(songs),
            Err(e) => {
                warn!("No release metadata for {} - {}: {}", artist, album, e);
                None
            }
        };
        let first = songs.as_ref().and_then(Songs::first_song);

        if let Some(year) = first.and_then(|s| parse_year(&s.date)) {
            return year;
        }
        if let Some(year) = year_from_context_key(context_key) {
            return year;
        }
        if let Some(year) = first.and_then(|s| year_from_path(&s.path)) {
            return year;
        }
        debug!("Unknown release year for {} - {}", artist, album);
        0
    }

    async fn songs(&self, album: &str, artist: &str, use_cache: bool) -> Result<Songs, LibraryError> {
        let url = self.device.songs_url(self.service, album, artist);
        let body = self.cache.fetch_or_load(&url, use_cache).await?;
        xml::decode(&body).map_err(|source| LibraryError::Decode {
            what: "songs metadata",
            source,
        })
    }
}

fn check(cancel: &CancellationToken) -> Result<(), LibraryError> {
    if cancel.is_cancelled() {
        Err(LibraryError::Cancelled)
    } else {
        Ok(())
    }
}

fn parse_track(position: usize, item: &BrowseItem) -> Track {
    let duration_secs = item.duration.trim().parse().unwrap_or(0);
    let track_number = leading_track_number(&item.text)
        .map(|(n, _)| n)
        .unwrap_or(position as u32 + 1);

    Track {
        name: clean_track_name(&item.text).to_string(),
        duration_secs,
        disc_number: 1,
        track_number,
        play_url: item.play_url.clone(),
        autoplay_url: item.autoplay_url.clone(),
    }
}

/// Year of a metadata date: a bare "2006" or a full "2006-01-02".
pub fn parse_year(date: &str) -> Option<i32> {
    let date = date.trim();
    if date.len() == 4 && date.bytes().all(|b| b.is_ascii_digit()) {
        return date.parse().ok();
    }
    let b = date.as_bytes();
    let digits = |r: std::ops::Range<usize>| b[r].iter().all(u8::is_ascii_digit);
    let shaped = b.len() == 10
        && b[4] == b'-'
        && b[7] == b'-'
        && digits(0..4)
        && digits(5..7)
        && digits(8..10);
    if !shaped {
        return None;
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .map(|d| d.year())
}

/// Year from a "(2001)" or "[2001]" token in a URL-encoded context menu key.
/// Keys are sometimes escaped more than once.
pub fn year_from_context_key(key: &str) -> Option<i32> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RE
        .get_or_init(|| Regex::new(r"[\(\[](\d{4})[\)\]]").ok())
        .as_ref()?;

    let mut decoded = key.to_string();
    for _ in 0..4 {
        match urlencoding::decode(&decoded) {
            Ok(next) if next != decoded => decoded = next.into_owned(),
            _ => break,
        }
    }
    let decoded = decoded.replace('+', " ");

    re.captures(&decoded)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// First standalone 4-digit token of a file path.
pub fn year_from_path(path: &str) -> Option<i32> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RE
        .get_or_init(|| Regex::new(r"(?:^|[^0-9])(\d{4})(?:[^0-9]|$)").ok())
        .as_ref()?;

    re.captures(path)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

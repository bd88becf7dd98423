mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use blu_engine::library::{LOCAL_ROOT_KEY, TIDAL_ROOT_KEY};
use blu_engine::{CacheStore, Device, HttpTransport, Library};
use blu_engine::error::LibraryError;
use blu_proto::library::Service;
use common::mock_device::{browse, songs, MockDevice};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const DEVIL_CONTEXT_KEY: &str =
    "LocalMusic%3AcontextMenu%2FAlbum%3Falbum%3DDevil%2BWithout%2BA%2BCause%2B%255B1998%255D";

struct Fixture {
    mock: MockDevice,
    device: Arc<Device>,
    _dir: tempfile::TempDir,
    cache: Arc<CacheStore>,
}

async fn fixture() -> Fixture {
    let mock = MockDevice::start().await;
    let device = Arc::new(mock.device());
    let dir = tempfile::tempdir().unwrap();
    let cache = CacheStore::load(
        dir.path().join("cache.json"),
        Arc::new(HttpTransport::new().unwrap()),
    )
    .await
    .unwrap();
    Fixture {
        mock,
        device,
        _dir: dir,
        cache: Arc::new(cache),
    }
}

impl Fixture {
    fn library(&self, service: Service, root: &str) -> Library {
        Library::new(service, root, Arc::clone(&self.device), Arc::clone(&self.cache))
    }

    fn browse(&self, key: &str, body: String) {
        self.mock.set(&self.device.browse_url(key), body);
    }

    fn songs(&self, service: Service, album: &str, artist: &str, body: String) {
        self.mock.set(&self.device.songs_url(service, album, artist), body);
    }

    /// Two letter buckets, three artists' worth of albums in mixed case.
    fn local_catalog(&self) {
        self.browse(
            LOCAL_ROOT_KEY,
            browse(&[
                &[("text", "A-C"), ("browseKey", "bucket-c")],
                &[("text", "K"), ("browseKey", "bucket-k")],
            ]),
        );
        self.browse(
            "bucket-c",
            browse(&[&[
                ("text", "Cocky"),
                ("text2", "kid rock"),
                ("browseKey", "album-cocky"),
                ("playURL", "/Add?playnow=1&album=Cocky"),
                ("autoplayURL", "/Add?playnow=1&album=Cocky&autoplay=1"),
            ]]),
        );
        self.browse(
            "bucket-k",
            browse(&[
                &[
                    ("text", "Devil Without A Cause"),
                    ("text2", "Kid Rock"),
                    ("browseKey", "album-devil"),
                ],
                &[("text", "Issues"), ("text2", "Korn"), ("browseKey", "album-issues")],
                &[("text", "Untitled"), ("text2", "KORN"), ("browseKey", "album-untitled")],
            ]),
        );

        self.browse(
            "album-cocky",
            browse(&[
                &[
                    ("text", "01. Forever"),
                    ("duration", "245"),
                    ("playURL", "/Play?id=1"),
                    ("autoplayURL", "/Add?id=1&autoplay=1"),
                ],
                &[("text", "02. Lay It On Me"), ("duration", "oops")],
            ]),
        );
        // Metadata is queried under the title-cased artist, not the raw "kid rock".
        self.songs(
            Service::Local,
            "Cocky",
            "Kid Rock",
            songs("2001-11-20", "/music/Kid Rock/Cocky/01.flac"),
        );

        self.browse(
            "album-devil",
            browse(&[&[
                ("text", "Bawitdaba"),
                ("duration", "265"),
                ("contextMenuKey", DEVIL_CONTEXT_KEY),
            ]]),
        );

        self.browse("album-issues", browse(&[&[("text", "Falling Away From Me"), ("duration", "270")]]));
        self.songs(
            Service::Local,
            "Issues",
            "Korn",
            songs("", "/music/Korn/1999 - Issues/01.flac"),
        );

        self.browse("album-untitled", browse(&[&[("text", "Evolution"), ("duration", "217")]]));
        self.songs(
            Service::Local,
            "Untitled",
            "Korn",
            songs("sometime in 2007", "/music/Korn/Untitled/01.flac"),
        );
    }
}

#[tokio::test]
async fn builds_bucketed_library() {
    let fx = fixture().await;
    fx.local_catalog();
    let library = fx.library(Service::Local, LOCAL_ROOT_KEY);

    let index = library
        .fetch_data(true, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(index.names, vec!["Kid Rock", "Korn"]);

    let kid_rock = index.artist("Kid Rock").unwrap();
    let albums: Vec<(&str, i32)> = kid_rock
        .albums
        .iter()
        .map(|a| (a.name.as_str(), a.year))
        .collect();
    assert_eq!(albums, vec![("Devil Without A Cause", 1998), ("Cocky", 2001)]);

    let cocky = &kid_rock.albums[1];
    assert_eq!(cocky.duration_secs, 245);
    assert_eq!(cocky.play_url, "/Add?playnow=1&album=Cocky");
    assert_eq!(cocky.tracks[0].name, "Forever");
    assert_eq!(cocky.tracks[0].track_number, 1);
    assert_eq!(cocky.tracks[1].name, "Lay It On Me");
    assert_eq!(cocky.tracks[1].duration_secs, 0);

    let korn: Vec<(&str, i32)> = index
        .artist("Korn")
        .unwrap()
        .albums
        .iter()
        .map(|a| (a.name.as_str(), a.year))
        .collect();
    assert_eq!(korn, vec![("Untitled", 0), ("Issues", 1999)]);

    assert_eq!(
        index.track_urls("Kid Rock", "Cocky", "Forever"),
        Some(("/Play?id=1", "/Add?id=1&autoplay=1"))
    );

    let songs_queries: Vec<String> = fx
        .mock
        .requests()
        .into_iter()
        .filter(|r| r.starts_with("/Songs"))
        .collect();
    assert!(songs_queries.iter().any(|r| r.contains("artist=Kid+Rock")));
    assert!(songs_queries.iter().all(|r| !r.contains("artist=kid") && !r.contains("artist=KORN")));
}

#[tokio::test]
async fn years_are_non_decreasing_and_names_sorted() {
    let fx = fixture().await;
    fx.local_catalog();
    let index = fx
        .library(Service::Local, LOCAL_ROOT_KEY)
        .fetch_data(true, &CancellationToken::new())
        .await
        .unwrap();

    for artist in index.artists.values() {
        assert!(artist.albums.windows(2).all(|w| w[0].year <= w[1].year));
    }
    let mut sorted = index.names.clone();
    sorted.sort_by_key(|n| n.to_lowercase());
    sorted.dedup();
    assert_eq!(sorted, index.names);
}

#[tokio::test]
async fn builds_flat_library() {
    let fx = fixture().await;
    fx.browse(
        TIDAL_ROOT_KEY,
        browse(&[&[
            ("text", "Blonde"),
            ("text2", "frank ocean"),
            ("browseKey", "Tidal:album/1"),
        ]]),
    );
    fx.browse(
        "Tidal:album/1",
        browse(&[
            &[("text", "Nikes"), ("duration", "314")],
            &[("text", "Ivy"), ("duration", "249")],
        ]),
    );
    fx.songs(Service::Tidal, "Blonde", "frank ocean", songs("2016", ""));

    let index = fx
        .library(Service::Tidal, TIDAL_ROOT_KEY)
        .fetch_data(true, &CancellationToken::new())
        .await
        .unwrap();

    let album = &index.artist("Frank Ocean").unwrap().albums[0];
    assert_eq!(album.year, 2016);
    assert_eq!(album.duration_secs, 563);
    assert_eq!(album.tracks[1].track_number, 2);
}

#[tokio::test]
async fn failed_rebuild_keeps_serving_previous_index() {
    let fx = fixture().await;
    fx.local_catalog();
    let library = fx.library(Service::Local, LOCAL_ROOT_KEY);
    let cancel = CancellationToken::new();

    library.refresh(true, &cancel).await.unwrap();
    assert_eq!(library.index().len(), 2);

    fx.mock.set_status(
        &fx.device.browse_url("bucket-k"),
        StatusCode::INTERNAL_SERVER_ERROR,
        "",
    );
    let err = library.update_data(&cancel).await.unwrap_err();
    assert!(matches!(err, LibraryError::Cache(_)), "{err:?}");
    assert_eq!(library.index().names, vec!["Kid Rock", "Korn"]);
}

#[tokio::test]
async fn undecodable_listing_aborts_fetch() {
    let fx = fixture().await;
    fx.browse(LOCAL_ROOT_KEY, "<browse><item text=".to_string());

    let err = fx
        .library(Service::Local, LOCAL_ROOT_KEY)
        .fetch_data(true, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LibraryError::Decode { .. }), "{err:?}");
}

#[tokio::test]
async fn cancelled_fetch_stops_before_any_request() {
    let fx = fixture().await;
    fx.local_catalog();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = fx
        .library(Service::Local, LOCAL_ROOT_KEY)
        .fetch_data(true, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, LibraryError::Cancelled));
    assert!(fx.mock.requests().is_empty());
}

#[tokio::test]
async fn spawned_fetch_reports_completion() {
    let fx = fixture().await;
    fx.local_catalog();
    let library = Arc::new(fx.library(Service::Local, LOCAL_ROOT_KEY));
    let (tx, mut rx) = mpsc::channel(4);

    library
        .spawn_fetch(true, CancellationToken::new(), tx)
        .await
        .unwrap();

    let done = rx.recv().await.unwrap();
    assert_eq!(done.service, Service::Local);
    assert_eq!(done.result.unwrap().len(), 2);
    assert_eq!(library.index().len(), 2);
}

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::Json,
    routing::{get, post},
    Router,
};
use blu_engine::fuzzy;
use blu_proto::library::{canonical_artist_name, Artist, Service};
use blu_proto::protocol::{Command, Status};
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, RwLock};
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

use crate::core::{DaemonEvent, DaemonView, Libraries};

#[derive(Clone)]
struct HttpState {
    view: Arc<RwLock<DaemonView>>,
    libraries: Libraries,
    status_tx: broadcast::Sender<Status>,
    event_tx: mpsc::Sender<DaemonEvent>,
}

#[derive(Serialize)]
struct ArtistList {
    names: Vec<String>,
    /// Row of the currently playing artist, if it is in this library.
    highlight: Option<usize>,
}

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
}

#[derive(Deserialize)]
struct PlayQuery {
    url: String,
}

pub fn start_server(
    bind_address: String,
    port: u16,
    view: Arc<RwLock<DaemonView>>,
    libraries: Libraries,
    status_tx: broadcast::Sender<Status>,
    event_tx: mpsc::Sender<DaemonEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(HttpState {
            view,
            libraries,
            status_tx,
            event_tx,
        });

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

fn router(state: HttpState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/events", get(status_events))
        .route("/api/library/:service/artists", get(list_artists))
        .route("/api/library/:service/artists/:name", get(get_artist))
        .route("/api/library/:service/search", get(search_artists))
        .route("/api/library/:service/refresh", post(refresh))
        .route("/api/play", post(play_url))
        .route("/api/play/pause", post(play_pause))
        .route("/api/stop", post(stop))
        .route("/api/next", post(next))
        .route("/api/prev", post(prev))
        .route("/api/mute", post(toggle_mute))
        .route("/api/repeat", post(cycle_repeat))
        .route("/api/volume/hold/:direction", post(volume_hold))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn get_status(State(state): State<HttpState>) -> Json<DaemonView> {
    Json(state.view.read().await.clone())
}

async fn status_events(
    State(state): State<HttpState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.status_tx.subscribe();
    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(status) => {
                    let event = Event::default()
                        .event("status")
                        .json_data(&status)
                        .unwrap_or_else(|_| Event::default().event("status"));
                    return Some((Ok(event), rx));
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("SSE client lagged {} status events", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn parse_service(raw: &str) -> Result<Service, StatusCode> {
    raw.parse().map_err(|_| StatusCode::BAD_REQUEST)
}

async fn list_artists(
    State(state): State<HttpState>,
    Path(service): Path<String>,
) -> Result<Json<ArtistList>, StatusCode> {
    let service = parse_service(&service)?;
    let library = state.libraries.get(&service).ok_or(StatusCode::NOT_FOUND)?;
    let index = library.index();

    let highlight = {
        let view = state.view.read().await;
        view.now_playing
            .as_ref()
            .filter(|np| np.service == service)
            .and(view.highlight)
    };

    Ok(Json(ArtistList {
        names: index.names.clone(),
        highlight,
    }))
}

async fn get_artist(
    State(state): State<HttpState>,
    Path((service, name)): Path<(String, String)>,
) -> Result<Json<Artist>, StatusCode> {
    let service = parse_service(&service)?;
    let library = state.libraries.get(&service).ok_or(StatusCode::NOT_FOUND)?;
    let index = library.index();
    let artist = index
        .artist(&canonical_artist_name(&name))
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(artist.clone()))
}

async fn search_artists(
    State(state): State<HttpState>,
    Path(service): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<String>>, StatusCode> {
    let service = parse_service(&service)?;
    let library = state.libraries.get(&service).ok_or(StatusCode::NOT_FOUND)?;
    let index = library.index();
    let hits = fuzzy::search(&query.q, index.names.as_slice());
    debug!("HTTP API: search {:?} -> {} hits", query.q, hits.len());
    Ok(Json(hits.into_iter().map(str::to_string).collect()))
}

async fn refresh(
    State(state): State<HttpState>,
    Path(service): Path<String>,
) -> StatusCode {
    let service = match parse_service(&service) {
        Ok(s) => s,
        Err(code) => return code,
    };
    if !state.libraries.contains_key(&service) {
        return StatusCode::NOT_FOUND;
    }
    info!("HTTP API: Refresh {} library", service);
    send(&state, Command::Refresh { service }).await
}

async fn play_url(State(state): State<HttpState>, Query(query): Query<PlayQuery>) -> StatusCode {
    info!("HTTP API: Play {}", query.url);
    send(&state, Command::Play { url: query.url }).await
}

async fn play_pause(State(state): State<HttpState>) -> StatusCode {
    send(&state, Command::PlayPause).await
}

async fn stop(State(state): State<HttpState>) -> StatusCode {
    send(&state, Command::Stop).await
}

async fn next(State(state): State<HttpState>) -> StatusCode {
    send(&state, Command::Next).await
}

async fn prev(State(state): State<HttpState>) -> StatusCode {
    send(&state, Command::Prev).await
}

async fn toggle_mute(State(state): State<HttpState>) -> StatusCode {
    send(&state, Command::ToggleMute).await
}

async fn cycle_repeat(State(state): State<HttpState>) -> StatusCode {
    send(&state, Command::CycleRepeat).await
}

async fn volume_hold(
    State(state): State<HttpState>,
    Path(direction): Path<String>,
) -> StatusCode {
    match parse_direction(&direction) {
        Some(increase) => send(&state, Command::VolumeHold { increase }).await,
        None => StatusCode::BAD_REQUEST,
    }
}

fn parse_direction(raw: &str) -> Option<bool> {
    match raw {
        "up" | "increase" => Some(true),
        "down" | "decrease" => Some(false),
        _ => None,
    }
}

async fn send(state: &HttpState, cmd: Command) -> StatusCode {
    if state.event_tx.send(DaemonEvent::ClientCommand(cmd)).await.is_err() {
        error!("Failed to send command, core is gone");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

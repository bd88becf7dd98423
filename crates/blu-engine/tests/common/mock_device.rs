//! In-process stand-in for a player's HTTP control API.
//!
//! Responses are looked up by exact path and query first, then by path
//! alone. Every request is recorded in arrival order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::Router;
use blu_engine::{Device, HttpTransport};
use tokio::task::JoinHandle;

#[derive(Default)]
struct Inner {
    responses: HashMap<String, (StatusCode, String)>,
    requests: Vec<String>,
}

#[derive(Clone)]
pub struct MockDevice {
    inner: Arc<Mutex<Inner>>,
    base_url: String,
    _server: Arc<JoinHandle<()>>,
}

impl MockDevice {
    pub async fn start() -> Self {
        let inner = Arc::new(Mutex::new(Inner::default()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock device");
        let addr = listener.local_addr().expect("mock device address");

        let app = Router::new()
            .fallback(respond)
            .with_state(Arc::clone(&inner));
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            inner,
            base_url: format!("http://{addr}"),
            _server: Arc::new(server),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `Device` talking to this mock over real HTTP.
    pub fn device(&self) -> Device {
        let transport = HttpTransport::new().expect("http transport");
        Device::new(self.base_url.clone(), Arc::new(transport))
    }

    /// Serve `body` for a path (optionally with query) or a full URL.
    pub fn set(&self, path_or_url: &str, body: impl Into<String>) {
        self.set_status(path_or_url, StatusCode::OK, body);
    }

    pub fn set_status(&self, path_or_url: &str, status: StatusCode, body: impl Into<String>) {
        let key = path_or_url
            .strip_prefix(self.base_url.as_str())
            .unwrap_or(path_or_url)
            .to_string();
        self.inner
            .lock()
            .unwrap()
            .responses
            .insert(key, (status, body.into()));
    }

    pub fn requests(&self) -> Vec<String> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub fn request_count(&self, prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.starts_with(prefix))
            .count()
    }
}

async fn respond(State(inner): State<Arc<Mutex<Inner>>>, uri: Uri) -> (StatusCode, String) {
    let full = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());

    let mut inner = inner.lock().unwrap();
    inner.requests.push(full.clone());
    inner
        .responses
        .get(&full)
        .or_else(|| inner.responses.get(uri.path()))
        .cloned()
        .unwrap_or((StatusCode::NOT_FOUND, String::new()))
}

/// `<browse>` document with one `<item>` per attribute list.
pub fn browse(items: &[&[(&str, &str)]]) -> String {
    let mut out = String::from("<browse sid=\"1\">");
    for attrs in items {
        out.push_str("<item");
        for (name, value) in attrs.iter() {
            out.push_str(&format!(" {}=\"{}\"", name, escape(value)));
        }
        out.push_str("/>");
    }
    out.push_str("</browse>");
    out
}

/// `<songs>` document whose first song carries `date` and `path`.
pub fn songs(date: &str, path: &str) -> String {
    format!(
        "<songs><album><song><date>{}</date><fn>{}</fn></song></album></songs>",
        escape(date),
        escape(path)
    )
}

pub fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

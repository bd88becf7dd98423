//! Raw HTTP retrieval. Everything above this layer deals in response bodies
//! and classified errors.

use std::error::Error as _;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::TransportError;

#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` and return the response body.
    async fn get(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Plain client without a client-side timeout.
    pub fn new() -> Result<Self, TransportError> {
        Self::build(reqwest::Client::builder())
    }

    /// Client that gives up after `timeout`. Used for long-polls, where the
    /// timeout sits just above the server-side wait budget.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        Self::build(reqwest::Client::builder().timeout(timeout))
    }

    fn build(builder: reqwest::ClientBuilder) -> Result<Self, TransportError> {
        let client = builder
            .user_agent(concat!("blutui/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(classify)?;
        Ok(body.to_vec())
    }
}

/// Map a reqwest failure onto the categories the engine reacts to.
pub fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout;
    }
    if let Some(status) = err.status() {
        return TransportError::Status(status.as_u16());
    }

    let detail = error_chain(&err);
    let mut source: Option<&(dyn std::error::Error + 'static)> = err.source();
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionRefused => {
                    return TransportError::ConnectionRefused(detail)
                }
                std::io::ErrorKind::TimedOut => return TransportError::Timeout,
                _ => {}
            }
        }
        source = e.source();
    }

    if is_dns_failure(&detail) {
        return TransportError::Dns(detail);
    }
    if detail.to_ascii_lowercase().contains("connection refused") {
        return TransportError::ConnectionRefused(detail);
    }
    TransportError::Other(detail)
}

fn is_dns_failure(detail: &str) -> bool {
    let lower = detail.to_ascii_lowercase();
    lower.contains("dns error")
        || lower.contains("failed to lookup address")
        || lower.contains("name or service not known")
        || lower.contains("nodename nor servname")
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        out.push_str(": ");
        out.push_str(&e.to_string());
        source = e.source();
    }
    out
}

use thiserror::Error;

/// Failure of a single HTTP retrieval, classified for the status watcher.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("DNS resolution failed: {0}")]
    Dns(String),
    #[error("connection refused: {0}")]
    ConnectionRefused(String),
    #[error("request timed out")]
    Timeout,
    #[error("device answered HTTP {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// The device cannot be reached at all, as opposed to a slow or
    /// misbehaving response.
    pub fn is_network_error(&self) -> bool {
        matches!(self, Self::Dns(_) | Self::ConnectionRefused(_))
    }
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to decode {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: quick_xml::DeError,
    },
    #[error("invalid {field} value {value:?} in {endpoint} response")]
    InvalidField {
        endpoint: &'static str,
        field: &'static str,
        value: String,
    },
}

impl DeviceError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Timeout))
    }

    pub fn is_network_error(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_network_error())
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("cache file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache snapshot encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: quick_xml::DeError,
    },
    #[error("library fetch cancelled")]
    Cancelled,
}

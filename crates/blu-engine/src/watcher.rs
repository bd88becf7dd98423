//! Device status long-poll loop.
//!
//! Each successful poll is published on a broadcast channel and its etag is
//! echoed on the next request, so the device only answers once its state
//! has changed. An unreachable device is published as a `network-error`
//! status; long-poll timeouts are expected and stay silent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use blu_proto::protocol::Status;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::DeviceError;

#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn poll_status(&self, etag: Option<&str>, wait: Duration)
        -> Result<Status, DeviceError>;
}

#[derive(Debug, Clone, Copy)]
pub struct WatcherConfig {
    /// Server-side wait budget of one long-poll.
    pub wait_budget: Duration,
    /// Pause after a delivered status or a failed attempt.
    pub guard_interval: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            wait_budget: Duration::from_secs(60),
            guard_interval: Duration::from_secs(5),
        }
    }
}

pub struct StatusWatcher {
    source: Arc<dyn StatusSource>,
    events: broadcast::Sender<Status>,
    config: WatcherConfig,
    etag: Option<String>,
}

impl StatusWatcher {
    pub fn new(
        source: Arc<dyn StatusSource>,
        events: broadcast::Sender<Status>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            source,
            events,
            config,
            etag: None,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Poll until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Status watcher started");
        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                r = self.source.poll_status(self.etag.as_deref(), self.config.wait_budget) => r,
            };

            match result {
                Ok(status) => {
                    debug!("Status {} ({})", status.state.as_str(), status.etag);
                    self.etag = Some(status.etag.clone()).filter(|e| !e.is_empty());
                    self.publish(status);
                }
                Err(e) if e.is_timeout() => {
                    debug!("Status long-poll timed out, polling again");
                    continue;
                }
                Err(e) if e.is_network_error() => {
                    warn!("Device unreachable: {}", e);
                    self.publish(Status::network_error());
                }
                Err(e) => {
                    warn!("Status poll failed: {}", e);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.guard_interval) => {}
            }
        }
        info!("Status watcher stopped");
    }

    fn publish(&self, status: Status) {
        // No subscribers is fine; the next status will find them.
        let _ = self.events.send(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use std::sync::Mutex;

    /// Replays scripted results, then blocks forever.
    struct Scripted {
        results: Mutex<Vec<Result<Status, DeviceError>>>,
        seen_etags: Mutex<Vec<Option<String>>>,
    }

    impl Scripted {
        fn new(mut results: Vec<Result<Status, DeviceError>>) -> Self {
            results.reverse();
            Self {
                results: Mutex::new(results),
                seen_etags: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl StatusSource for Scripted {
        async fn poll_status(
            &self,
            etag: Option<&str>,
            _wait: Duration,
        ) -> Result<Status, DeviceError> {
            self.seen_etags.lock().unwrap().push(etag.map(str::to_string));
            let next = self.results.lock().unwrap().pop();
            match next {
                Some(r) => r,
                None => std::future::pending().await,
            }
        }
    }

    fn status(etag: &str) -> Status {
        Status {
            etag: etag.to_string(),
            ..Status::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_silent_and_etag_is_echoed() {
        let source = Arc::new(Scripted::new(vec![
            Ok(status("a")),
            Err(DeviceError::Transport(TransportError::Timeout)),
            Ok(status("b")),
        ]));
        let (tx, mut rx) = broadcast::channel(16);
        let cancel = CancellationToken::new();
        let handle = StatusWatcher::new(source.clone(), tx, WatcherConfig::default())
            .spawn(cancel.clone());

        assert_eq!(rx.recv().await.unwrap().etag, "a");
        assert_eq!(rx.recv().await.unwrap().etag, "b");

        cancel.cancel();
        handle.await.unwrap();

        let seen = source.seen_etags.lock().unwrap().clone();
        assert_eq!(
            seen[..3],
            [None, Some("a".to_string()), Some("a".to_string())]
        );
    }
}

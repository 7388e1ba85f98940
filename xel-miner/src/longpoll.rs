//! Background listener for coordinator events.
//!
//! Holds a long-lived request open against the coordinator. When the reply
//! mentions a new block the coordinator loop is woken for an out-of-cycle
//! refresh instead of waiting for the next scan interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::coordinator::Coordinator;
use crate::tracing::prelude::*;

/// Pause after an event that was neither a timeout nor a new block.
const EVENT_PAUSE: Duration = Duration::from_secs(1);

pub struct LongPollWatcher {
    coordinator: Coordinator,
    refresh: Arc<Notify>,
    retry_pause: Duration,
    running: CancellationToken,
}

impl LongPollWatcher {
    pub fn new(
        coordinator: Coordinator,
        refresh: Arc<Notify>,
        retry_pause: Duration,
        running: CancellationToken,
    ) -> Self {
        Self {
            coordinator,
            refresh,
            retry_pause,
            running,
        }
    }

    /// Run until cancelled.
    pub async fn run(self) {
        debug!("Long-poll watcher started");

        loop {
            let result = tokio::select! {
                result = self.coordinator.long_poll() => result,
                _ = self.running.cancelled() => break,
            };

            let pause = match result {
                Ok(event) if event.is_new_block() => {
                    info!("Long-poll: new block detected");
                    self.refresh.notify_one();
                    None
                }
                Ok(event) if event.is_timeout() => None,
                Ok(event) => {
                    debug!(event = ?event.event, "Long-poll event ignored");
                    Some(EVENT_PAUSE)
                }
                Err(e) => {
                    warn!(error = %e, pause_s = self.retry_pause.as_secs(), "Long-poll failed");
                    Some(self.retry_pause)
                }
            };

            if let Some(pause) = pause {
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = self.running.cancelled() => break,
                }
            }
        }

        debug!("Long-poll watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::test_support::ScriptedTransport;
    use serde_json::json;

    fn watcher(
        transport: Arc<ScriptedTransport>,
        retry_pause: Duration,
    ) -> (LongPollWatcher, Arc<Notify>, CancellationToken) {
        let refresh = Arc::new(Notify::new());
        let running = CancellationToken::new();
        let watcher = LongPollWatcher::new(
            Coordinator::new(transport),
            refresh.clone(),
            retry_pause,
            running.clone(),
        );
        (watcher, refresh, running)
    }

    #[tokio::test]
    async fn test_new_block_triggers_refresh() {
        let transport = ScriptedTransport::new();
        transport.push("longpoll", json!({"event": "timeout"}));
        transport.push("longpoll", json!({"event": ["tx", "new block 123"]}));
        transport.set_fallback("longpoll", json!({"event": "other"}));

        let (watcher, refresh, running) = watcher(transport.clone(), Duration::from_secs(10));
        let task = tokio::spawn(watcher.run());

        tokio::time::timeout(Duration::from_secs(5), refresh.notified())
            .await
            .expect("refresh not triggered");

        running.cancel();
        task.await.unwrap();
        assert!(transport.seen_of("longpoll").len() >= 2);
    }

    #[tokio::test]
    async fn test_failure_pauses_then_retries() {
        let transport = ScriptedTransport::new();
        transport.push_failure("longpoll");
        transport.push("longpoll", json!({"event": "new block"}));

        let (watcher, refresh, running) = watcher(transport.clone(), Duration::from_millis(50));
        let task = tokio::spawn(watcher.run());

        tokio::time::timeout(Duration::from_secs(5), refresh.notified())
            .await
            .expect("refresh not triggered after retry");

        running.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_during_pause() {
        let transport = ScriptedTransport::new();
        transport.push_failure("longpoll");

        let (watcher, _refresh, running) = watcher(transport.clone(), Duration::from_secs(3600));
        let task = tokio::spawn(watcher.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        running.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("watcher did not stop")
            .unwrap();
        assert_eq!(transport.seen_of("longpoll").len(), 1);
    }
}

//! Reload signalling from task runners to connected browsers.

use assetline_core::ReloadKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default number of buffered events per subscriber.
pub const RELOAD_CHANNEL_CAPACITY: usize = 16;

/// What connected browsers should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadEvent {
    /// Reload the page.
    Full,
    /// Re-fetch stylesheets without reloading.
    Styles,
}

impl ReloadEvent {
    /// Wire form sent over the live-reload websocket.
    #[must_use]
    pub fn to_json(&self) -> &'static str {
        match self {
            ReloadEvent::Full => r#"{"type":"reload"}"#,
            ReloadEvent::Styles => r#"{"type":"css"}"#,
        }
    }
}

impl From<ReloadKind> for ReloadEvent {
    fn from(kind: ReloadKind) -> Self {
        match kind {
            ReloadKind::Full => ReloadEvent::Full,
            ReloadKind::Styles => ReloadEvent::Styles,
        }
    }
}

/// Broadcast hub for reload events.
///
/// Cloning is cheap; all clones share one channel.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    tx: broadcast::Sender<ReloadEvent>,
    sent: Arc<AtomicU64>,
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new(RELOAD_CHANNEL_CAPACITY)
    }
}

impl ReloadHub {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            sent: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish an event. Returns the number of subscribers that will see it.
    ///
    /// Having no subscribers is not an error.
    pub fn send(&self, event: ReloadEvent) -> usize {
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.tx.send(event).unwrap_or(0)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.tx.subscribe()
    }

    /// Events published since creation.
    #[must_use]
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let hub = ReloadHub::default();
        let mut a = hub.subscribe();
        let mut b = hub.clone().subscribe();

        assert_eq!(hub.send(ReloadEvent::Styles), 2);
        assert_eq!(a.recv().await.unwrap(), ReloadEvent::Styles);
        assert_eq!(b.recv().await.unwrap(), ReloadEvent::Styles);
        assert_eq!(hub.sent_count(), 1);
    }

    #[test]
    fn test_send_without_subscribers() {
        let hub = ReloadHub::new(4);
        assert_eq!(hub.send(ReloadEvent::Full), 0);
        assert_eq!(hub.sent_count(), 1);
    }

    #[test]
    fn test_wire_format() {
        assert_eq!(ReloadEvent::Full.to_json(), r#"{"type":"reload"}"#);
        assert_eq!(ReloadEvent::from(ReloadKind::Styles), ReloadEvent::Styles);
    }
}

//! Live change notifications for sterilization records.
//!
//! `ChangeFeed` is a clonable handle around a `tokio::sync::broadcast` channel. It is
//! injected into the Actix application state in `main.rs`; the record handlers publish
//! a `RecordChange` after every successful write and the SSE endpoint in
//! `services::records::stream` turns a `Subscription` into a stream of snapshots.
//!
//! A `Subscription` ends when it is dropped or `unsubscribe` is called, so a client
//! that disconnects releases its receiver without any bookkeeping in the feed.

use log::{debug, warn};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Default number of changes buffered for slow subscribers.
pub const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordChange {
    pub kind: ChangeKind,
    pub record_id: String,
}

#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<RecordChange>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        ChangeFeed { tx }
    }

    /// Notifies every live subscriber. Having no subscribers is not an error.
    pub fn publish(&self, kind: ChangeKind, record_id: impl Into<String>) {
        let change = RecordChange {
            kind,
            record_id: record_id.into(),
        };
        match self.tx.send(change) {
            Ok(receivers) => debug!("Change delivered to {} subscriber(s)", receivers),
            Err(_) => debug!("Change published with no subscribers"),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        debug!("New change feed subscriber");
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        ChangeFeed::new(DEFAULT_CAPACITY)
    }
}

/// One listener on the change feed.
pub struct Subscription {
    rx: broadcast::Receiver<RecordChange>,
}

impl Subscription {
    /// Waits for the next change. Returns `None` once the feed is gone.
    ///
    /// A subscriber that fell behind skips the changes it missed; callers re-query
    /// the full snapshot on every change anyway.
    pub async fn recv(&mut self) -> Option<RecordChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) => return Some(change),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Change feed subscriber lagged, skipped {} change(s)", skipped)
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!("Change feed subscriber left");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn test_subscriber_receives_published_change() {
        let feed = ChangeFeed::default();
        let mut sub = feed.subscribe();
        feed.publish(ChangeKind::Created, "r-1");
        assert_eq!(
            sub.recv().await,
            Some(RecordChange {
                kind: ChangeKind::Created,
                record_id: "r-1".into()
            })
        );
    }

    #[actix_web::test]
    async fn test_unsubscribe_releases_receiver() {
        let feed = ChangeFeed::default();
        let sub = feed.subscribe();
        let other = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 2);
        sub.unsubscribe();
        drop(other);
        assert_eq!(feed.subscriber_count(), 0);
        feed.publish(ChangeKind::Deleted, "r-2");
    }

    #[actix_web::test]
    async fn test_lagging_subscriber_keeps_going() {
        let feed = ChangeFeed::new(1);
        let mut sub = feed.subscribe();
        feed.publish(ChangeKind::Created, "a");
        feed.publish(ChangeKind::Updated, "b");
        let change = sub.recv().await.unwrap();
        assert_eq!(change.record_id, "b");
    }

    #[actix_web::test]
    async fn test_recv_ends_when_feed_is_dropped() {
        let feed = ChangeFeed::default();
        let mut sub = feed.subscribe();
        drop(feed);
        assert_eq!(sub.recv().await, None);
    }
}

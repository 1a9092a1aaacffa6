//! Status publishing boundary
//!
//! The engine calls [`StatusPublisher::publish`] from its dispatch path, so
//! implementations hand the snapshot off (channel, watch) and return
//! immediately. Rendering and network I/O belong on the receiving side.

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::call_graph::StatusSnapshot;

pub trait StatusPublisher: Send + Sync {
    fn publish(&self, snapshot: StatusSnapshot);
}

impl<P: StatusPublisher + ?Sized> StatusPublisher for std::sync::Arc<P> {
    fn publish(&self, snapshot: StatusSnapshot) {
        (**self).publish(snapshot)
    }
}

/// Logs each summary at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

impl StatusPublisher for LogPublisher {
    fn publish(&self, snapshot: StatusSnapshot) {
        info!(calls = snapshot.call_count(), "Call status: {}", snapshot.summary_text);
    }
}

/// Forwards snapshots into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<StatusSnapshot>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusSnapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusPublisher for ChannelPublisher {
    fn publish(&self, snapshot: StatusSnapshot) {
        if self.tx.send(snapshot).is_err() {
            warn!("Status receiver dropped, snapshot discarded");
        }
    }
}

/// Keeps only the latest snapshot, for pull-style readers.
#[derive(Debug)]
pub struct WatchPublisher {
    tx: watch::Sender<StatusSnapshot>,
}

impl WatchPublisher {
    pub fn new() -> (Self, watch::Receiver<StatusSnapshot>) {
        let (tx, rx) = watch::channel(StatusSnapshot::idle());
        (Self { tx }, rx)
    }

    /// The most recently published snapshot.
    pub fn latest(&self) -> StatusSnapshot {
        self.tx.borrow().clone()
    }
}

impl StatusPublisher for WatchPublisher {
    fn publish(&self, snapshot: StatusSnapshot) {
        self.tx.send_if_modified(|current| {
            if *current == snapshot {
                debug!("Status unchanged");
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

/// Fans a snapshot out to several publishers in order.
#[derive(Default)]
pub struct MultiPublisher {
    publishers: Vec<Box<dyn StatusPublisher>>,
}

impl MultiPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, publisher: impl StatusPublisher + 'static) -> Self {
        self.publishers.push(Box::new(publisher));
        self
    }

    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }
}

impl StatusPublisher for MultiPublisher {
    fn publish(&self, snapshot: StatusSnapshot) {
        if let Some((last, rest)) = self.publishers.split_last() {
            for publisher in rest {
                publisher.publish(snapshot.clone());
            }
            last.publish(snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn busy() -> StatusSnapshot {
        StatusSnapshot {
            summary_text: "100->200 [100(Up)]".to_string(),
            calls_from: vec!["100".to_string()],
            calls_to: vec!["200".to_string()],
            cids_from: vec!["100".to_string()],
            cids_to: vec!["200".to_string()],
            channels: vec!["100".to_string()],
            contexts: vec!["default".to_string()],
        }
    }

    #[test]
    fn test_channel_publisher_delivers() {
        let (publisher, mut rx) = ChannelPublisher::new();
        publisher.publish(busy());
        assert_eq!(rx.try_recv().unwrap(), busy());
    }

    #[test]
    fn test_channel_publisher_survives_dropped_receiver() {
        let (publisher, rx) = ChannelPublisher::new();
        drop(rx);
        publisher.publish(busy());
    }

    #[test]
    fn test_watch_publisher_keeps_latest() {
        let (publisher, rx) = WatchPublisher::new();
        assert!(rx.borrow().is_idle());

        publisher.publish(busy());
        assert_eq!(*rx.borrow(), busy());
        assert_eq!(publisher.latest(), busy());
    }

    #[test]
    fn test_multi_publisher_fans_out() {
        let (first, mut first_rx) = ChannelPublisher::new();
        let (second, mut second_rx) = ChannelPublisher::new();
        let multi = MultiPublisher::new().with(first).with(second);

        multi.publish(busy());
        assert_eq!(multi.len(), 2);
        assert_eq!(first_rx.try_recv().unwrap(), busy());
        assert_eq!(second_rx.try_recv().unwrap(), busy());
    }
}

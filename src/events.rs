//! "Graph updated" notifications.
//!
//! Backed by tokio's broadcast channel: every subscriber sees every event,
//! publishing never blocks, and receivers can be polled with `try_recv`
//! without an async runtime.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphChange {
    /// A full rebuild finished and was published.
    Rebuilt { documents: usize, links: usize },
    /// One document's forward entry was replaced or removed.
    DocumentUpdated { path: PathBuf },
    /// Both maps were emptied.
    Cleared,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEvent {
    /// Strictly increasing per `GraphEvents` instance.
    pub generation: u64,
    pub change: GraphChange,
}

/// Broadcast bus for graph updates.
#[derive(Clone)]
pub struct GraphEvents {
    tx: broadcast::Sender<GraphEvent>,
    generation: Arc<AtomicU64>,
    capacity: usize,
}

impl GraphEvents {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            generation: Arc::new(AtomicU64::new(0)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stamps `change` with the next generation and publishes it.
    ///
    /// Returns the number of subscribers that received it; zero subscribers
    /// is not an error.
    pub fn publish(&self, change: GraphChange) -> usize {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.tx
            .send(GraphEvent { generation, change })
            .unwrap_or(0)
    }

    /// Receives all events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<GraphEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Generation of the most recently published event, zero if none.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl Default for GraphEvents {
    fn default() -> Self {
        Self::new(64)
    }
}

impl std::fmt::Debug for GraphEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphEvents")
            .field("capacity", &self.capacity)
            .field("generation", &self.generation())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_fine() {
        let events = GraphEvents::new(4);
        assert_eq!(events.publish(GraphChange::Cleared), 0);
        assert_eq!(events.generation(), 1);
    }

    #[test]
    fn subscribers_receive_events_in_generation_order() {
        let events = GraphEvents::new(4);
        let mut rx = events.subscribe();

        events.publish(GraphChange::Rebuilt {
            documents: 2,
            links: 3,
        });
        events.publish(GraphChange::Cleared);

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(
            first.change,
            GraphChange::Rebuilt {
                documents: 2,
                links: 3
            }
        );
        assert_eq!(second.change, GraphChange::Cleared);
        assert!(first.generation < second.generation);
        assert!(rx.try_recv().is_err());
    }
}

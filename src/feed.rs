use crate::{bus::Event, chat::Message, error::ChatError, store::DocumentStore};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

/// Live view of the most recent `limit` messages.
///
/// The first call to [`FeedSubscription::next_snapshot`] yields the current
/// window; every later call waits for a change in the store and yields the
/// re-read window. Dropping the subscription ends it.
pub struct FeedSubscription {
    store: Arc<dyn DocumentStore>,
    changes: broadcast::Receiver<Event>,
    limit: usize,
    primed: bool,
}

impl FeedSubscription {
    pub fn new(store: Arc<dyn DocumentStore>, limit: usize) -> Self {
        // Subscribe before the first read so no append slips between the two
        let changes = store.changes();
        Self {
            store,
            changes,
            limit,
            primed: false,
        }
    }

    /// `Ok(None)` once the store's change stream has closed.
    pub async fn next_snapshot(&mut self) -> Result<Option<Vec<Message>>, ChatError> {
        if self.primed {
            match self.changes.recv().await {
                Ok(Event::MessageAppended(msg)) => {
                    debug!("Feed change: message {} appended", msg.id);
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Snapshots are full re-reads, so missed notifications are harmless
                    debug!("Feed lagged by {} notifications", skipped);
                }
                Err(RecvError::Closed) => {
                    warn!("Feed change stream closed");
                    return Ok(None);
                }
            }
            // Collapse a burst of appends into one snapshot
            while let Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) =
                self.changes.try_recv()
            {}
        }
        self.primed = true;

        self.store
            .recent(self.limit)
            .await
            .map(Some)
            .map_err(ChatError::subscription)
    }
}

//! Event broadcaster: fans every job event out to all connected observers.
//!
//! Implements the core emitter port over a `tokio::sync::broadcast` channel.
//! Observers that connect later see only subsequent events (no replay); slow
//! observers that lag past the buffer miss events and resynchronize via the
//! list endpoint.

use tokio::sync::broadcast;

use grabbit_core::{JobEvent, JobEventEmitter};

/// Broadcast-channel backed event emitter.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBroadcaster {
    /// Create a broadcaster buffering up to `capacity` events per observer.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Default capacity (256 events).
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(256)
    }

    /// Subscribe a new observer.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    /// Number of connected observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl JobEventEmitter for EventBroadcaster {
    fn emit(&self, event: JobEvent) {
        // Nobody listening is fine
        let _ = self.sender.send(event);
    }
}

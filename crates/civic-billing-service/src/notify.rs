//! Per-user real-time notifications.
//!
//! Each user has a room keyed by their ID. Handlers publish subscription
//! events into the room and any connected clients receive them. Publishing
//! never blocks and never fails the request that triggered it.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::broadcast;

use civic_billing_core::{Subscription, UserId};

/// Kind of subscription event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A subscription became active (free activation or confirmed payment).
    Activated,
    /// A subscription was cancelled.
    Cancelled,
    /// Auto-renew settings changed.
    AutoRenewUpdated,
}

impl EventKind {
    /// Event name on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Activated => "subscription:activated",
            Self::Cancelled => "subscription:cancelled",
            Self::AutoRenewUpdated => "subscription:autoRenewUpdated",
        }
    }
}

/// Event delivered to a user's room.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionEvent {
    /// Event name, e.g. `subscription:activated`.
    pub event: &'static str,
    /// Owner of the room.
    pub user_id: UserId,
    /// Subscription snapshot after the change.
    pub subscription: Subscription,
}

impl SubscriptionEvent {
    /// Build an event for the subscription's owner.
    #[must_use]
    pub fn new(kind: EventKind, subscription: Subscription) -> Self {
        Self {
            event: kind.as_str(),
            user_id: subscription.user_id,
            subscription,
        }
    }
}

/// Fan-out of subscription events to per-user rooms.
pub struct Notifier {
    rooms: Mutex<HashMap<UserId, broadcast::Sender<SubscriptionEvent>>>,
    capacity: usize,
}

impl Notifier {
    /// Create a notifier whose rooms buffer up to `capacity` events per receiver.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Join a user's room.
    pub fn subscribe(&self, user_id: UserId) -> broadcast::Receiver<SubscriptionEvent> {
        let mut rooms = self
            .rooms
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        rooms
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Drop a user's room once its last receiver is gone.
    ///
    /// Call after dropping the receiver returned by [`Notifier::subscribe`].
    pub fn leave(&self, user_id: &UserId) {
        let mut rooms = self
            .rooms
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if rooms
            .get(user_id)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            rooms.remove(user_id);
            tracing::debug!(user_id = %user_id, "Room closed");
        }
    }

    /// Publish an event to the subscription owner's room.
    ///
    /// Returns the number of receivers reached. A room nobody listens to is
    /// dropped.
    pub fn publish(&self, kind: EventKind, subscription: &Subscription) -> usize {
        let event = SubscriptionEvent::new(kind, subscription.clone());
        let user_id = event.user_id;
        let mut rooms = self
            .rooms
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let Some(sender) = rooms.get(&user_id) else {
            tracing::debug!(user_id = %user_id, event = event.event, "No listeners for event");
            return 0;
        };

        match sender.send(event) {
            Ok(reached) => {
                tracing::debug!(user_id = %user_id, event = kind.as_str(), reached, "Event published");
                reached
            }
            Err(_) => {
                rooms.remove(&user_id);
                tracing::debug!(user_id = %user_id, event = kind.as_str(), "Room closed; event dropped");
                0
            }
        }
    }

    /// Number of rooms with at least one sender registered.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

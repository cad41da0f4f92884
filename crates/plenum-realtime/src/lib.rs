//! Change-notification hub for live sessions.
//!
//! The hub fans out payload-free [`ChangeNotification`]s over per-event
//! broadcast channels. Notifications carry only the table, the operation, and
//! the record id; subscribers re-query the store to see what actually changed.
//! Delivery is at-least-once from the subscriber's point of view: a lagged
//! receiver observes an error rather than silently losing its place, and the
//! correct response to any doubt is to re-query.

use plenum_types::ChangeNotification;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of each per-event notification channel.
///
/// Notifications are small and subscribers only re-query in response, so a
/// modest buffer covers bursts of moderator activity. A receiver that falls
/// further behind than this sees [`broadcast::error::RecvError::Lagged`] and
/// should refresh from the store.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Fan-out point for change notifications, keyed by event id.
///
/// Channels are created lazily on first subscribe and removed when a publish
/// or an explicit [`RealtimeHub::prune`] finds no receivers left. The lock
/// never spans an await; all operations are brief map lookups.
#[derive(Debug)]
pub struct RealtimeHub {
    channels: RwLock<HashMap<String, broadcast::Sender<ChangeNotification>>>,
    capacity: usize,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Subscribes to change notifications for one event.
    ///
    /// The channel is created if this is the first subscriber. Only changes
    /// published after this call are delivered; callers wanting current state
    /// query the store after subscribing, not before.
    pub fn subscribe(&self, event_id: &str) -> broadcast::Receiver<ChangeNotification> {
        if let Some(tx) = self.read_channels().get(event_id) {
            return tx.subscribe();
        }

        self.write_channels()
            .entry(event_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publishes a change notification to every subscriber of an event.
    ///
    /// Returns the number of receivers the notification reached. Publishing
    /// to an event nobody is watching is a no-op, not an error; a channel
    /// whose receivers are all gone is swept from the map on the way out.
    pub fn publish(&self, event_id: &str, notification: ChangeNotification) -> usize {
        let delivered = {
            let channels = self.read_channels();
            match channels.get(event_id) {
                Some(tx) => tx.send(notification).unwrap_or(0),
                None => 0,
            }
        };
        if delivered == 0 {
            self.prune(event_id);
        }
        debug!(
            event_id = %event_id,
            receivers = delivered,
            "published change notification"
        );
        delivered
    }

    /// Drops the channel for an event once no receivers remain.
    ///
    /// Called opportunistically when a subscriber tears down; harmless if
    /// other receivers are still attached.
    pub fn prune(&self, event_id: &str) {
        let mut channels = self.write_channels();
        if let Some(tx) = channels.get(event_id) {
            if tx.receiver_count() == 0 {
                channels.remove(event_id);
            }
        }
    }

    /// Number of live per-event channels, for diagnostics.
    pub fn channel_count(&self) -> usize {
        self.read_channels().len()
    }

    // The map holds only channel handles and is updated with single inserts
    // and removes, so a guard recovered from a poisoned lock is coherent.
    fn read_channels(
        &self,
    ) -> RwLockReadGuard<'_, HashMap<String, broadcast::Sender<ChangeNotification>>> {
        self.channels.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_channels(
        &self,
    ) -> RwLockWriteGuard<'_, HashMap<String, broadcast::Sender<ChangeNotification>>> {
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::{Channel, ChannelCache, ChannelEvent, ConnectionId};

/// A cloneable handle to a [`ChannelCache`] shared by every connection in the process.
///
/// Each method takes the lock once, so a join or a disconnect is observed by other connections
/// either completely or not at all. The lock is never held across an `.await`; nothing in the
/// cache blocks.
#[derive(Debug, Clone, Default)]
pub struct SharedChannelCache {
    inner: Arc<Mutex<ChannelCache>>,
}

impl SharedChannelCache {
    /// Constructs a handle to a new, empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the cache for a sequence of operations that must appear atomic.
    pub fn lock(&self) -> MutexGuard<'_, ChannelCache> {
        self.inner.lock()
    }

    /// Applies `event` as seen by `connection`. Returns whether the cache changed.
    pub fn apply(&self, connection: ConnectionId, event: &ChannelEvent) -> bool {
        self.lock().apply(connection, event)
    }

    /// See [`ChannelCache::join`].
    pub fn join(&self, connection: ConnectionId, name: &str, nick: &str) -> bool {
        self.lock().join(connection, name, nick)
    }

    /// See [`ChannelCache::part`].
    pub fn part(&self, connection: ConnectionId, name: &str, nick: &str) -> bool {
        self.lock().part(connection, name, nick)
    }

    /// See [`ChannelCache::disconnect`].
    pub fn disconnect(&self, connection: ConnectionId, nick: Option<&str>) -> Vec<String> {
        self.lock().disconnect(connection, nick)
    }

    /// Returns the normalized names of the channels `connection` is joined to.
    #[must_use]
    pub fn client_channel_names(&self, connection: ConnectionId) -> Vec<String> {
        self.lock().client_channel_names(connection)
    }

    /// Returns a copy of the channel `name` as it is right now, if `connection` is joined to
    /// it.
    #[must_use]
    pub fn channel_snapshot(&self, connection: ConnectionId, name: &str) -> Option<Channel> {
        self.lock().channel_for_client(connection, name).cloned()
    }

    /// Returns the number of cached channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.lock().channel_count()
    }
}

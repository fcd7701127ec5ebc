//! The process-wide channel registry and the index of which connection is joined to which
//! channel.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, error, trace, warn};

use crate::channel::{Channel, normalize};
use crate::Error;

/// Opaque identifier of a single client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Constructs a new connection id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw numeric id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for ConnectionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shares channel state between every connection in the process.
///
/// The cache keeps two views that must agree:
///
/// - `channels` owns every [`Channel`], keyed by its normalized name.
/// - `membership` maps each connection to the keys of the channels it is joined to. It holds
///   keys only, never channels.
///
/// A channel is created the first time a connection joins it and is evicted as soon as the
/// last connection leaves. Events should be driven in the order "create, add user, mark joined"
/// and "remove user, mark left"; [`ChannelCache::join`], [`ChannelCache::part`] and
/// [`ChannelCache::apply`] do exactly that.
#[derive(Default)]
pub struct ChannelCache {
    /// Normalized channel name -> channel
    channels: HashMap<String, Channel>,
    /// Connection -> normalized names of joined channels, in join order
    membership: HashMap<ConnectionId, Vec<String>>,
}

impl ChannelCache {
    /// Constructs a new, empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the channel for `name`, creating it if it isn't cached yet.
    ///
    /// An existing channel is returned untouched, so its display name stays whatever the first
    /// caller passed.
    pub fn create_channel(&mut self, name: &str) -> &mut Channel {
        let key = normalize(name);

        self.channels.entry(key).or_insert_with_key(|key| {
            debug!(channel = %key, display_name = %name, "creating channel");

            Channel::new(name)
        })
    }

    /// Records that `connection` is joined to `name`.
    ///
    /// This only updates the index; the channel itself must already have been created with
    /// [`ChannelCache::create_channel`]. Returns `false` if the connection was already
    /// recorded as joined.
    pub fn mark_client_joined(&mut self, connection: ConnectionId, name: &str) -> bool {
        let key = normalize(name);

        if !self.channels.contains_key(&key) {
            warn!(%connection, channel = %key, "marking connection joined to an uncached channel");
        }

        let joined = self.membership.entry(connection).or_default();

        if joined.contains(&key) {
            return false;
        }

        trace!(%connection, channel = %key, "connection joined channel");
        joined.push(key);

        true
    }

    /// Records that `connection` left `name` and evicts the channel if nobody else is joined.
    ///
    /// Returns `false` if the connection wasn't recorded as joined to the channel.
    pub fn mark_client_left(&mut self, connection: ConnectionId, name: &str) -> bool {
        let key = normalize(name);

        let Some(joined) = self.membership.get_mut(&connection) else {
            return false;
        };

        let Some(idx) = joined.iter().position(|k| *k == key) else {
            return false;
        };

        joined.remove(idx);

        if joined.is_empty() {
            self.membership.remove(&connection);
        }

        trace!(%connection, channel = %key, "connection left channel");
        self.clear_unused_channel(&key);

        true
    }

    /// Evicts the channel `key` if no connection is joined to it. Returns whether it was
    /// evicted.
    pub fn clear_unused_channel(&mut self, key: &str) -> bool {
        let key = normalize(key);

        if self.membership.values().any(|joined| joined.contains(&key)) {
            return false;
        }

        let evicted = self.channels.remove(&key).is_some();

        if evicted {
            debug!(channel = %key, "evicted unused channel");
        }

        evicted
    }

    /// Returns the normalized names of the channels `connection` is joined to, in the order
    /// they were joined.
    #[must_use]
    pub fn client_channel_names(&self, connection: ConnectionId) -> Vec<String> {
        self.membership
            .get(&connection)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the channels `connection` is joined to, in the order they were joined.
    ///
    /// A joined key without a cached channel means the indexes have diverged. Debug builds
    /// panic; release builds log the fault and leave the channel out.
    #[must_use]
    pub fn client_channels(&self, connection: ConnectionId) -> Vec<&Channel> {
        let Some(joined) = self.membership.get(&connection) else {
            return vec![];
        };

        joined
            .iter()
            .filter_map(|key| self.resolve(connection, key))
            .collect()
    }

    /// Returns the channels `connection` is joined to, keyed by their normalized names.
    #[must_use]
    pub fn client_channel_map(&self, connection: ConnectionId) -> HashMap<&str, &Channel> {
        self.client_channels(connection)
            .into_iter()
            .map(|channel| (channel.key(), channel))
            .collect()
    }

    /// Returns the channel `name` if `connection` is joined to it.
    #[must_use]
    pub fn channel_for_client(&self, connection: ConnectionId, name: &str) -> Option<&Channel> {
        let key = normalize(name);

        if !self.is_joined(connection, &key) {
            return None;
        }

        self.resolve(connection, &key)
    }

    /// Returns the channel `name` for mutation if `connection` is joined to it.
    pub fn channel_for_client_mut(
        &mut self,
        connection: ConnectionId,
        name: &str,
    ) -> Option<&mut Channel> {
        let key = normalize(name);

        if !self.is_joined(connection, &key) {
            return None;
        }

        let channel = self.channels.get_mut(&key);

        if channel.is_none() {
            report_desync(connection, &key);
        }

        channel
    }

    /// Returns the cached channel `name`, regardless of who is joined to it.
    #[must_use]
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&normalize(name))
    }

    /// Returns the cached channel `name` for mutation, regardless of who is joined to it.
    pub fn channel_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.channels.get_mut(&normalize(name))
    }

    /// Returns true if the channel `name` is cached.
    #[must_use]
    pub fn contains_channel(&self, name: &str) -> bool {
        self.channels.contains_key(&normalize(name))
    }

    /// Returns true if `connection` is joined to at least one channel.
    #[must_use]
    pub fn is_connection_known(&self, connection: ConnectionId) -> bool {
        self.membership.contains_key(&connection)
    }

    /// Returns the connections joined to `name`, in ascending order.
    #[must_use]
    pub fn connections_in(&self, name: &str) -> Vec<ConnectionId> {
        let key = normalize(name);
        let mut connections: Vec<ConnectionId> = self
            .membership
            .iter()
            .filter(|(_, joined)| joined.contains(&key))
            .map(|(connection, _)| *connection)
            .collect();

        connections.sort_unstable();
        connections
    }

    /// Returns an iterator over every cached channel, in no particular order.
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    /// Returns the number of cached channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Returns the number of connections joined to at least one channel.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.membership.len()
    }

    /// Joins `connection` to `name` as `nick`: creates the channel if needed, adds the nick to
    /// the roster and records the membership.
    ///
    /// Returns `false` if the connection was already joined.
    pub fn join(&mut self, connection: ConnectionId, name: &str, nick: &str) -> bool {
        self.create_channel(name).add_user(nick);
        self.mark_client_joined(connection, name)
    }

    /// Parts `connection` from `name`: removes `nick` from the roster and drops the membership,
    /// evicting the channel if this was the last connection in it.
    ///
    /// Returns `false` if the connection wasn't joined. A membership without a cached channel is
    /// reported as a desync and dropped all the same.
    pub fn part(&mut self, connection: ConnectionId, name: &str, nick: &str) -> bool {
        let key = normalize(name);

        if !self.is_joined(connection, &key) {
            return false;
        }

        match self.channels.get_mut(&key) {
            Some(channel) => {
                channel.remove_user(nick);
            }
            None => report_desync(connection, &key),
        }

        self.mark_client_left(connection, &key)
    }

    /// Parts `connection` from every channel it is joined to, removing `nick` from each roster
    /// first if given. Returns the normalized names of the parted channels.
    pub fn disconnect(&mut self, connection: ConnectionId, nick: Option<&str>) -> Vec<String> {
        let keys = self.client_channel_names(connection);

        for key in &keys {
            if let Some(nick) = nick
                && let Some(channel) = self.channels.get_mut(key)
            {
                channel.remove_user(nick);
            }

            self.mark_client_left(connection, key);
        }

        debug!(%connection, channels = keys.len(), "connection disconnected");

        keys
    }

    /// Checks that both views of the cache agree.
    ///
    /// # Errors
    ///
    /// - [`Error::Desynchronized`] if a connection is joined to a channel that is not cached.
    /// - [`Error::Orphaned`] if a cached channel has no joined connection.
    pub fn verify_integrity(&self) -> Result<(), Error> {
        let mut referenced: Vec<&str> = Vec::new();

        for (connection, joined) in &self.membership {
            for key in joined {
                if !self.channels.contains_key(key) {
                    return Err(Error::Desynchronized {
                        connection: *connection,
                        channel: key.clone(),
                    });
                }

                referenced.push(key);
            }
        }

        if let Some(key) = self
            .channels
            .keys()
            .find(|key| !referenced.contains(&key.as_str()))
        {
            return Err(Error::Orphaned {
                channel: key.clone(),
            });
        }

        Ok(())
    }

    /// Returns true if `key` is in the membership set of `connection`.
    fn is_joined(&self, connection: ConnectionId, key: &str) -> bool {
        self.membership
            .get(&connection)
            .is_some_and(|joined| joined.iter().any(|k| k == key))
    }

    /// Looks up a key taken from the membership index.
    fn resolve(&self, connection: ConnectionId, key: &str) -> Option<&Channel> {
        let channel = self.channels.get(key);

        if channel.is_none() {
            report_desync(connection, key);
        }

        channel
    }
}

/// Reports a membership key that has no cached channel.
fn report_desync(connection: ConnectionId, key: &str) {
    let err = Error::Desynchronized {
        connection,
        channel: key.to_string(),
    };

    error!(%connection, channel = %key, "{err}");

    if cfg!(debug_assertions) {
        panic!("{err}");
    }
}

impl fmt::Debug for ChannelCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelCache")
            .field("channel_count", &self.channels.len())
            .field("connection_count", &self.membership.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: ConnectionId = ConnectionId::new(1);
    const B: ConnectionId = ConnectionId::new(2);

    #[test]
    fn create_channel_is_get_or_create() {
        let mut cache = ChannelCache::new();

        cache.create_channel("#Foo").set_topic(Some("hello".into()));
        let channel = cache.create_channel("#FOO");

        assert_eq!(channel.display_name(), "#Foo");
        assert_eq!(channel.topic(), Some("hello"));
        assert_eq!(cache.channel_count(), 1);
    }

    #[test]
    fn mark_client_joined_is_idempotent() {
        let mut cache = ChannelCache::new();
        cache.create_channel("#foo");

        assert!(cache.mark_client_joined(A, "#foo"));
        assert!(!cache.mark_client_joined(A, "#FOO"));

        assert_eq!(cache.client_channel_names(A), vec!["#foo"]);
    }

    #[test]
    fn mark_client_joined_does_not_create_channels() {
        let mut cache = ChannelCache::new();

        assert!(cache.mark_client_joined(A, "#foo"));
        assert!(!cache.contains_channel("#foo"));
    }

    #[test]
    fn mark_client_left_reports_absence() {
        let mut cache = ChannelCache::new();

        assert!(!cache.mark_client_left(A, "#foo"));

        cache.join(A, "#foo", "alice");
        assert!(!cache.mark_client_left(A, "#bar"));
        assert!(cache.mark_client_left(A, "#foo"));
        assert!(!cache.mark_client_left(A, "#foo"));
    }

    #[test]
    fn empty_membership_sets_are_dropped() {
        let mut cache = ChannelCache::new();
        cache.join(A, "#foo", "alice");
        cache.join(A, "#bar", "alice");

        cache.mark_client_left(A, "#foo");
        assert!(cache.is_connection_known(A));

        cache.mark_client_left(A, "#bar");
        assert!(!cache.is_connection_known(A));
        assert_eq!(cache.connection_count(), 0);
    }

    #[test]
    fn channel_is_evicted_after_last_connection_leaves() {
        let mut cache = ChannelCache::new();
        cache.join(A, "#foo", "alice");
        cache.join(B, "#foo", "bob");
        cache.join(A, "#bar", "alice");

        assert!(cache.mark_client_left(A, "#foo"));
        assert!(cache.contains_channel("#foo"));

        assert!(cache.mark_client_left(B, "#foo"));
        assert!(!cache.contains_channel("#foo"));
        assert!(cache.contains_channel("#bar"));
    }

    #[test]
    fn recreated_channel_starts_fresh() {
        let mut cache = ChannelCache::new();
        cache.join(A, "#foo", "alice");
        if let Some(channel) = cache.channel_mut("#foo") {
            channel.set_modes("+nt");
        }

        cache.part(A, "#foo", "alice");

        let channel = cache.create_channel("#Foo");
        assert_eq!(channel.modes(), "");
        assert_eq!(channel.display_name(), "#Foo");
        assert!(channel.is_empty());
    }

    #[test]
    fn clear_unused_channel_keeps_referenced_channels() {
        let mut cache = ChannelCache::new();
        cache.join(A, "#foo", "alice");
        cache.create_channel("#lonely");

        assert!(!cache.clear_unused_channel("#foo"));
        assert!(cache.clear_unused_channel("#lonely"));
        assert!(!cache.clear_unused_channel("#lonely"));
    }

    #[test]
    fn unknown_connections_have_no_channels() {
        let cache = ChannelCache::new();

        assert!(cache.client_channel_names(A).is_empty());
        assert!(cache.client_channels(A).is_empty());
        assert!(cache.client_channel_map(A).is_empty());
        assert!(cache.channel_for_client(A, "#foo").is_none());
    }

    #[test]
    fn channel_for_client_requires_membership() {
        let mut cache = ChannelCache::new();
        cache.join(A, "#Foo", "alice");

        assert_eq!(
            cache.channel_for_client(A, "#FOO").map(Channel::display_name),
            Some("#Foo")
        );
        assert!(cache.channel_for_client(B, "#foo").is_none());
        assert!(cache.channel_for_client(A, "#bar").is_none());
    }

    #[test]
    fn client_channels_resolve_in_join_order() {
        let mut cache = ChannelCache::new();
        cache.join(A, "#one", "alice");
        cache.join(A, "#Two", "alice");
        cache.join(A, "#three", "alice");

        let keys: Vec<&str> = cache.client_channels(A).into_iter().map(Channel::key).collect();
        assert_eq!(keys, vec!["#one", "#two", "#three"]);

        let map = cache.client_channel_map(A);
        assert_eq!(map.len(), 3);
        assert_eq!(map.get("#two").map(|c| c.display_name()), Some("#Two"));
    }

    #[test]
    fn part_removes_nick_from_roster() {
        let mut cache = ChannelCache::new();
        cache.join(A, "#foo", "alice");
        cache.join(B, "#foo", "bob");

        assert!(cache.part(A, "#foo", "alice"));
        assert!(!cache.part(A, "#foo", "alice"));

        let channel = cache.channel("#foo").expect("channel should still be cached");
        assert!(!channel.user_in_channel("alice"));
        assert!(channel.user_in_channel("bob"));
    }

    #[test]
    fn disconnect_parts_every_channel() {
        let mut cache = ChannelCache::new();
        cache.join(A, "#foo", "alice");
        cache.join(A, "#bar", "alice");
        cache.join(B, "#foo", "bob");

        let parted = cache.disconnect(A, Some("alice"));

        assert_eq!(parted, vec!["#foo", "#bar"]);
        assert!(!cache.is_connection_known(A));
        assert!(!cache.contains_channel("#bar"));
        assert_eq!(cache.connections_in("#foo"), vec![B]);
        assert_eq!(
            cache.channel("#foo").map(|c| c.user_in_channel("alice")),
            Some(false)
        );
        assert_eq!(cache.verify_integrity(), Ok(()));
    }

    #[test]
    fn verify_integrity_reports_orphans() {
        let mut cache = ChannelCache::new();
        cache.create_channel("#lonely");

        assert_eq!(
            cache.verify_integrity(),
            Err(Error::Orphaned {
                channel: "#lonely".to_string()
            })
        );
    }

    #[test]
    fn verify_integrity_reports_dangling_keys() {
        let mut cache = ChannelCache::new();
        cache.mark_client_joined(A, "#ghost");

        assert_eq!(
            cache.verify_integrity(),
            Err(Error::Desynchronized {
                connection: A,
                channel: "#ghost".to_string()
            })
        );
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "not in the cache"))]
    fn dangling_keys_are_not_resolved() {
        let mut cache = ChannelCache::new();
        cache.mark_client_joined(A, "#ghost");

        assert!(cache.client_channels(A).is_empty());
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "not in the cache"))]
    fn part_drops_dangling_memberships() {
        let mut cache = ChannelCache::new();
        cache.mark_client_joined(A, "#ghost");

        assert!(cache.part(A, "#ghost", "alice"));
        assert!(!cache.is_connection_known(A));
        assert!(cache.verify_integrity().is_ok());
    }

    #[test]
    fn part_leaves_other_rosters_alone_when_not_joined() {
        let mut cache = ChannelCache::new();
        cache.join(A, "#foo", "alice");

        assert!(!cache.part(B, "#foo", "alice"));
        assert!(cache.channel("#foo").is_some_and(|c| c.user_in_channel("alice")));
    }
}

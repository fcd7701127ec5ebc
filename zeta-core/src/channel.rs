use std::collections::HashMap;
use std::fmt;

use time::OffsetDateTime;

/// Returns the canonical cache key for a channel name.
///
/// Channel names are case-insensitive, so `#Rust` and `#RUST` refer to the same channel.
#[must_use]
pub fn normalize(name: &str) -> String {
    name.to_lowercase()
}

/// The status flags a user holds within a single channel, such as `@` for operator and `+` for
/// voice.
///
/// Flags are kept in the order they were acquired and a flag added through
/// [`ModePrefix::insert`] is never duplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ModePrefix(String);

impl ModePrefix {
    /// Constructs an empty prefix.
    #[must_use]
    pub const fn new() -> Self {
        Self(String::new())
    }

    /// Returns the prefix as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the user holds no status flags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if `flag` is part of the prefix.
    #[must_use]
    pub fn contains(&self, flag: char) -> bool {
        self.0.contains(flag)
    }

    /// Appends `flag` unless it is already present. Returns whether the prefix changed.
    pub fn insert(&mut self, flag: char) -> bool {
        if self.contains(flag) {
            return false;
        }

        self.0.push(flag);

        true
    }

    /// Removes the first occurrence of `flag`. Returns whether the prefix changed.
    pub fn remove(&mut self, flag: char) -> bool {
        match self.0.find(flag) {
            Some(idx) => {
                self.0.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Returns an iterator over the flags in acquisition order.
    pub fn flags(&self) -> impl Iterator<Item = char> + '_ {
        self.0.chars()
    }
}

impl fmt::Display for ModePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModePrefix {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ModePrefix {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<&str> for ModePrefix {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// This structure contains the shared state of a single channel: who is in it, what status
/// each user holds, and the channel metadata last reported by the server.
///
/// A `Channel` knows nothing about the connections that observe it; that bookkeeping lives in
/// [`ChannelCache`](crate::ChannelCache).
#[derive(Debug, Clone)]
pub struct Channel {
    // The normalized channel name used as the cache key
    key: String,
    // The channel name as the server first presented it
    display_name: String,
    // Every joined user and their status flags
    roster: HashMap<String, ModePrefix>,
    // The channels current topic
    topic: Option<String>,
    // Who set the current topic
    topic_set_by: Option<String>,
    // When the channel was created, if the server told us
    created_at: Option<OffsetDateTime>,
    // Channel-wide modes, e.g. `+nt`
    modes: String,
}

impl Channel {
    /// Constructs a new, empty channel named `name`.
    pub fn new<S: Into<String>>(name: S) -> Self {
        let display_name = name.into();

        Self {
            key: normalize(&display_name),
            display_name,
            roster: HashMap::new(),
            topic: None,
            topic_set_by: None,
            created_at: None,
            modes: String::new(),
        }
    }

    /// Returns the normalized name of the channel
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the name of the channel as originally presented
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the topic of the channel
    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// Returns who set the topic of the channel
    #[must_use]
    pub fn topic_set_by(&self) -> Option<&str> {
        self.topic_set_by.as_deref()
    }

    /// Returns the creation time of the channel
    #[must_use]
    pub const fn created_at(&self) -> Option<OffsetDateTime> {
        self.created_at
    }

    /// Returns the channel-wide mode string
    #[must_use]
    pub fn modes(&self) -> &str {
        &self.modes
    }

    /// Sets the topic of the channel
    pub fn set_topic(&mut self, topic: Option<String>) {
        self.topic = topic;
    }

    /// Sets who set the topic of the channel
    pub fn set_topic_set_by(&mut self, set_by: Option<String>) {
        self.topic_set_by = set_by;
    }

    /// Sets both the topic and its setter, as a `TOPIC` command does.
    pub fn set_topic_with_setter(&mut self, topic: Option<String>, set_by: Option<String>) {
        self.topic = topic;
        self.topic_set_by = set_by;
    }

    /// Sets the creation time of the channel
    pub fn set_created_at(&mut self, created_at: Option<OffsetDateTime>) {
        self.created_at = created_at;
    }

    /// Sets the channel-wide mode string
    pub fn set_modes<S: Into<String>>(&mut self, modes: S) {
        self.modes = modes.into();
    }

    /// Returns the number of users in the channel
    #[must_use]
    pub fn len(&self) -> usize {
        self.roster.len()
    }

    /// Returns true if nobody is known to be in the channel
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    /// Returns an iterator over the users in the channel and their prefixes, in no particular
    /// order.
    pub fn users(&self) -> impl Iterator<Item = (&str, &ModePrefix)> {
        self.roster.iter().map(|(nick, prefix)| (nick.as_str(), prefix))
    }

    /// Returns true if `nick` is in the channel.
    #[must_use]
    pub fn user_in_channel(&self, nick: &str) -> bool {
        self.roster.contains_key(nick)
    }

    /// Returns the status flags of `nick`, or `None` if the user is not in the channel.
    #[must_use]
    pub fn mode_prefix(&self, nick: &str) -> Option<&ModePrefix> {
        self.roster.get(nick)
    }

    /// Adds `nick` to the channel with no status flags. Adding a user that is already present
    /// keeps their current flags.
    pub fn add_user(&mut self, nick: &str) {
        if self.roster.contains_key(nick) {
            return;
        }

        self.roster.insert(nick.to_string(), ModePrefix::new());
    }

    /// Removes `nick` and their flags from the channel. Returns whether the user was present.
    pub fn remove_user(&mut self, nick: &str) -> bool {
        self.roster.remove(nick).is_some()
    }

    /// Replaces the status flags of `nick`.
    ///
    /// Users that are not in the channel are ignored; this never adds them.
    pub fn set_mode_prefix<P: Into<ModePrefix>>(&mut self, nick: &str, prefix: P) {
        if let Some(current) = self.roster.get_mut(nick) {
            *current = prefix.into();
        }
    }

    /// Clears every status flag of `nick`, if they are in the channel.
    pub fn clear_mode_prefix(&mut self, nick: &str) {
        self.set_mode_prefix(nick, ModePrefix::new());
    }

    /// Grants `flag` to `nick`. Returns whether anything changed.
    pub fn add_mode_flag(&mut self, nick: &str, flag: char) -> bool {
        self.roster
            .get_mut(nick)
            .is_some_and(|prefix| prefix.insert(flag))
    }

    /// Revokes `flag` from `nick`. Returns whether anything changed.
    pub fn remove_mode_flag(&mut self, nick: &str, flag: char) -> bool {
        self.roster
            .get_mut(nick)
            .is_some_and(|prefix| prefix.remove(flag))
    }

    /// Moves the roster entry of `old` to `new`, keeping its flags.
    ///
    /// Nothing happens if `old` is not in the channel. An existing entry for `new` is
    /// overwritten. Returns whether the user was renamed.
    pub fn rename_user(&mut self, old: &str, new: &str) -> bool {
        let Some(prefix) = self.roster.remove(old) else {
            return false;
        };

        self.roster.insert(new.to_string(), prefix);

        true
    }
}

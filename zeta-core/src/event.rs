//! Already-parsed channel events and the order in which they mutate the cache.

use time::OffsetDateTime;
use tracing::trace;

use crate::{Channel, ChannelCache, ConnectionId, ModePrefix};

/// A channel-related event observed by a single connection.
///
/// Events that name a channel the connection is not joined to are ignored; servers routinely
/// deliver messages for channels a client has just left.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum ChannelEvent {
    /// The connection itself joined `channel` as `nick`.
    SelfJoin {
        /// The channel name as sent by the server
        channel: String,
        /// The connection's own nickname
        nick: String,
    },
    /// The connection itself left `channel`, either by parting or by being kicked.
    SelfPart {
        /// The channel name
        channel: String,
        /// The connection's own nickname
        nick: String,
    },
    /// Another user joined `channel`.
    Join {
        /// The channel name
        channel: String,
        /// The user's nickname
        nick: String,
    },
    /// Another user left `channel`, either by parting or by being kicked.
    Part {
        /// The channel name
        channel: String,
        /// The user's nickname
        nick: String,
    },
    /// A user quit the network and left every channel.
    Quit {
        /// The user's nickname
        nick: String,
    },
    /// A user changed nickname.
    NickChange {
        /// The previous nickname
        old: String,
        /// The new nickname
        new: String,
    },
    /// A `NAMES` listing of users and their status prefixes.
    Names {
        /// The channel name
        channel: String,
        /// Every listed nickname and its prefix
        entries: Vec<(String, ModePrefix)>,
    },
    /// A status flag was granted or revoked.
    UserMode {
        /// The channel name
        channel: String,
        /// The affected user's nickname
        nick: String,
        /// The prefix flag, e.g. `@`
        flag: char,
        /// `true` if the flag was granted, `false` if it was revoked
        set: bool,
    },
    /// The topic changed or was reported.
    Topic {
        /// The channel name
        channel: String,
        /// The new topic, `None` if it was cleared
        topic: Option<String>,
    },
    /// The topic setter was reported.
    TopicSetBy {
        /// The channel name
        channel: String,
        /// Who set the topic
        set_by: String,
    },
    /// The channel-wide modes were reported.
    ChannelModes {
        /// The channel name
        channel: String,
        /// The mode string, e.g. `+nt`
        modes: String,
    },
    /// The channel creation time was reported.
    CreatedAt {
        /// The channel name
        channel: String,
        /// When the channel was created
        at: OffsetDateTime,
    },
    /// The connection was closed and implicitly left every channel.
    Disconnect {
        /// The connection's own nickname, if registration completed
        nick: Option<String>,
    },
}

impl ChannelCache {
    /// Applies `event` as seen by `connection`. Returns whether the cache changed.
    pub fn apply(&mut self, connection: ConnectionId, event: &ChannelEvent) -> bool {
        trace!(%connection, ?event, "applying channel event");

        match event {
            ChannelEvent::SelfJoin { channel, nick } => self.join(connection, channel, nick),
            ChannelEvent::SelfPart { channel, nick } => self.part(connection, channel, nick),
            ChannelEvent::Join { channel, nick } => {
                self.with_channel(connection, channel, |c| {
                    if c.user_in_channel(nick) {
                        return false;
                    }

                    c.add_user(nick);

                    true
                })
            }
            ChannelEvent::Part { channel, nick } => {
                self.with_channel(connection, channel, |c| c.remove_user(nick))
            }
            ChannelEvent::Quit { nick } => {
                self.with_each_channel(connection, |c| c.remove_user(nick))
            }
            ChannelEvent::NickChange { old, new } => {
                self.with_each_channel(connection, |c| c.rename_user(old, new))
            }
            ChannelEvent::Names { channel, entries } => {
                self.with_channel(connection, channel, |c| {
                    for (nick, prefix) in entries {
                        c.add_user(nick);
                        c.set_mode_prefix(nick, prefix.clone());
                    }

                    !entries.is_empty()
                })
            }
            ChannelEvent::UserMode {
                channel,
                nick,
                flag,
                set,
            } => self.with_channel(connection, channel, |c| {
                if *set {
                    c.add_mode_flag(nick, *flag)
                } else {
                    c.remove_mode_flag(nick, *flag)
                }
            }),
            ChannelEvent::Topic { channel, topic } => {
                self.with_channel(connection, channel, |c| {
                    c.set_topic(topic.clone());
                    true
                })
            }
            ChannelEvent::TopicSetBy { channel, set_by } => {
                self.with_channel(connection, channel, |c| {
                    c.set_topic_set_by(Some(set_by.clone()));
                    true
                })
            }
            ChannelEvent::ChannelModes { channel, modes } => {
                self.with_channel(connection, channel, |c| {
                    c.set_modes(modes.as_str());
                    true
                })
            }
            ChannelEvent::CreatedAt { channel, at } => {
                self.with_channel(connection, channel, |c| {
                    c.set_created_at(Some(*at));
                    true
                })
            }
            ChannelEvent::Disconnect { nick } => {
                !self.disconnect(connection, nick.as_deref()).is_empty()
            }
        }
    }

    /// Runs `f` on `name` if `connection` is joined to it.
    fn with_channel<F>(&mut self, connection: ConnectionId, name: &str, f: F) -> bool
    where
        F: FnOnce(&mut Channel) -> bool,
    {
        match self.channel_for_client_mut(connection, name) {
            Some(channel) => f(channel),
            None => {
                trace!(%connection, channel = %name, "ignoring event for unjoined channel");
                false
            }
        }
    }

    /// Runs `f` on every channel `connection` is joined to.
    fn with_each_channel<F>(&mut self, connection: ConnectionId, mut f: F) -> bool
    where
        F: FnMut(&mut Channel) -> bool,
    {
        let mut changed = false;

        for key in self.client_channel_names(connection) {
            if let Some(channel) = self.channel_for_client_mut(connection, &key) {
                changed |= f(channel);
            }
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: ConnectionId = ConnectionId::new(1);
    const B: ConnectionId = ConnectionId::new(2);

    fn self_join(channel: &str, nick: &str) -> ChannelEvent {
        ChannelEvent::SelfJoin {
            channel: channel.to_string(),
            nick: nick.to_string(),
        }
    }

    #[test]
    fn events_for_unjoined_channels_are_ignored() {
        let mut cache = ChannelCache::new();
        cache.apply(A, &self_join("#foo", "alice"));

        let changed = cache.apply(
            B,
            &ChannelEvent::Join {
                channel: "#foo".into(),
                nick: "mallory".into(),
            },
        );

        assert!(!changed);
        assert_eq!(
            cache.channel("#foo").map(|c| c.user_in_channel("mallory")),
            Some(false)
        );
    }

    #[test]
    fn quit_removes_user_from_all_joined_channels() {
        let mut cache = ChannelCache::new();
        cache.apply(A, &self_join("#one", "alice"));
        cache.apply(A, &self_join("#two", "alice"));

        for channel in ["#one", "#two"] {
            cache.apply(
                A,
                &ChannelEvent::Join {
                    channel: channel.into(),
                    nick: "bob".into(),
                },
            );
        }

        assert!(cache.apply(A, &ChannelEvent::Quit { nick: "bob".into() }));
        assert!(!cache.apply(A, &ChannelEvent::Quit { nick: "bob".into() }));

        for channel in cache.client_channels(A) {
            assert!(!channel.user_in_channel("bob"));
            assert!(channel.user_in_channel("alice"));
        }
    }

    #[test]
    fn nick_change_renames_across_channels() {
        let mut cache = ChannelCache::new();
        cache.apply(A, &self_join("#one", "alice"));
        cache.apply(A, &self_join("#two", "alice"));
        cache.apply(
            A,
            &ChannelEvent::UserMode {
                channel: "#one".into(),
                nick: "alice".into(),
                flag: '@',
                set: true,
            },
        );

        assert!(cache.apply(
            A,
            &ChannelEvent::NickChange {
                old: "alice".into(),
                new: "alicia".into(),
            },
        ));

        let one = cache.channel("#one").expect("#one is cached");
        let two = cache.channel("#two").expect("#two is cached");

        assert_eq!(one.mode_prefix("alicia").map(ModePrefix::as_str), Some("@"));
        assert_eq!(two.mode_prefix("alicia").map(ModePrefix::as_str), Some(""));
        assert!(!one.user_in_channel("alice"));
    }

    #[test]
    fn names_populates_roster_with_prefixes() {
        let mut cache = ChannelCache::new();
        cache.apply(A, &self_join("#foo", "alice"));

        cache.apply(
            A,
            &ChannelEvent::Names {
                channel: "#foo".into(),
                entries: vec![
                    ("alice".into(), ModePrefix::from("@")),
                    ("bob".into(), ModePrefix::from("+")),
                    ("carol".into(), ModePrefix::new()),
                ],
            },
        );

        let channel = cache.channel("#foo").expect("#foo is cached");

        assert_eq!(channel.len(), 3);
        assert_eq!(channel.mode_prefix("alice").map(ModePrefix::as_str), Some("@"));
        assert_eq!(channel.mode_prefix("bob").map(ModePrefix::as_str), Some("+"));
    }

    #[test]
    fn metadata_events_update_channel() {
        let mut cache = ChannelCache::new();
        cache.apply(A, &self_join("#foo", "alice"));

        cache.apply(
            A,
            &ChannelEvent::Topic {
                channel: "#FOO".into(),
                topic: Some("welcome".into()),
            },
        );
        cache.apply(
            A,
            &ChannelEvent::TopicSetBy {
                channel: "#foo".into(),
                set_by: "bob".into(),
            },
        );
        cache.apply(
            A,
            &ChannelEvent::ChannelModes {
                channel: "#foo".into(),
                modes: "+nt".into(),
            },
        );
        cache.apply(
            A,
            &ChannelEvent::CreatedAt {
                channel: "#foo".into(),
                at: OffsetDateTime::UNIX_EPOCH,
            },
        );

        let channel = cache.channel_for_client(A, "#foo").expect("joined");

        assert_eq!(channel.topic(), Some("welcome"));
        assert_eq!(channel.topic_set_by(), Some("bob"));
        assert_eq!(channel.modes(), "+nt");
        assert_eq!(channel.created_at(), Some(OffsetDateTime::UNIX_EPOCH));
    }

    #[test]
    fn disconnect_event_parts_everything() {
        let mut cache = ChannelCache::new();
        cache.apply(A, &self_join("#one", "alice"));
        cache.apply(A, &self_join("#two", "alice"));

        assert!(cache.apply(
            A,
            &ChannelEvent::Disconnect {
                nick: Some("alice".into())
            }
        ));
        assert!(!cache.apply(A, &ChannelEvent::Disconnect { nick: None }));
        assert_eq!(cache.channel_count(), 0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn events_deserialize_from_tagged_json() {
        let event: ChannelEvent = serde_json::from_str(
            r##"{"type":"user_mode","channel":"#foo","nick":"alice","flag":"@","set":true}"##,
        )
        .expect("valid event");

        assert_eq!(
            event,
            ChannelEvent::UserMode {
                channel: "#foo".into(),
                nick: "alice".into(),
                flag: '@',
                set: true,
            }
        );
    }
}

//! Turns parsed IRC messages into channel events for the cache.

use irc::proto::{ChannelMode, Command, Message, Mode};
use time::OffsetDateTime;
use tracing::trace;
use zeta_core::{ChannelEvent, ModePrefix};

/// The status prefixes a server may put in front of a nickname in a `NAMES` reply.
const NAMES_PREFIXES: &[char] = &['~', '&', '@', '%', '+'];

const RPL_WELCOME: u16 = 1;
const RPL_CHANNELMODEIS: u16 = 324;
const RPL_CREATIONTIME: u16 = 329;
const RPL_TOPIC: u16 = 332;
const RPL_TOPICWHOTIME: u16 = 333;
const RPL_NAMREPLY: u16 = 353;

/// Tracks what a single connection needs to know to interpret its own traffic, which is
/// currently just its nickname.
#[derive(Debug, Clone)]
pub struct Translator {
    nickname: String,
}

impl Translator {
    /// Constructs a translator for a connection registered as `nickname`.
    pub fn new<S: Into<String>>(nickname: S) -> Self {
        Self {
            nickname: nickname.into(),
        }
    }

    /// Returns the connection's current nickname.
    #[must_use]
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// Returns true if `nick` refers to this connection.
    fn is_me(&self, nick: &str) -> bool {
        self.nickname.eq_ignore_ascii_case(nick)
    }

    /// Translates `message` into the channel events it implies.
    ///
    /// Messages that don't affect channel state yield no events.
    pub fn translate(&mut self, message: &Message) -> Vec<ChannelEvent> {
        let source = message.source_nickname();

        match &message.command {
            Command::JOIN(channels, _, _) => {
                let Some(nick) = source else {
                    return vec![];
                };

                split_list(channels)
                    .map(|channel| {
                        if self.is_me(nick) {
                            ChannelEvent::SelfJoin {
                                channel: channel.to_string(),
                                nick: nick.to_string(),
                            }
                        } else {
                            ChannelEvent::Join {
                                channel: channel.to_string(),
                                nick: nick.to_string(),
                            }
                        }
                    })
                    .collect()
            }
            Command::PART(channels, _) => {
                let Some(nick) = source else {
                    return vec![];
                };

                split_list(channels)
                    .map(|channel| self.departure(channel, nick))
                    .collect()
            }
            Command::KICK(channels, users, _) => {
                let channels: Vec<&str> = split_list(channels).collect();

                // One channel applies to every user; otherwise pairs are positional
                match channels.as_slice() {
                    [channel] => split_list(users)
                        .map(|nick| self.departure(channel, nick))
                        .collect(),
                    _ => channels
                        .iter()
                        .zip(split_list(users))
                        .map(|(channel, nick)| self.departure(channel, nick))
                        .collect(),
                }
            }
            Command::QUIT(_) => {
                let Some(nick) = source else {
                    return vec![];
                };

                if self.is_me(nick) {
                    vec![ChannelEvent::Disconnect {
                        nick: Some(nick.to_string()),
                    }]
                } else {
                    vec![ChannelEvent::Quit {
                        nick: nick.to_string(),
                    }]
                }
            }
            Command::NICK(new) => {
                let Some(old) = source else {
                    return vec![];
                };

                if self.is_me(old) {
                    trace!(%old, %new, "own nickname changed");
                    self.nickname.clone_from(new);
                }

                vec![ChannelEvent::NickChange {
                    old: old.to_string(),
                    new: new.clone(),
                }]
            }
            Command::TOPIC(channel, Some(topic)) => {
                let mut events = vec![ChannelEvent::Topic {
                    channel: channel.clone(),
                    topic: non_empty(topic),
                }];

                if let Some(nick) = source {
                    events.push(ChannelEvent::TopicSetBy {
                        channel: channel.clone(),
                        set_by: nick.to_string(),
                    });
                }

                events
            }
            Command::ChannelMODE(channel, modes) => modes
                .iter()
                .filter_map(|mode| user_mode_event(channel, mode))
                .collect(),
            command => match numeric(command) {
                Some((code, args)) => self.translate_numeric(code, args),
                None => vec![],
            },
        }
    }

    /// Translates the numeric replies that carry channel state.
    fn translate_numeric(&mut self, code: u16, args: &[String]) -> Vec<ChannelEvent> {
        match (code, args) {
            (RPL_WELCOME, [me, ..]) => {
                self.nickname.clone_from(me);
                vec![]
            }
            (RPL_NAMREPLY, [_, _, channel, names]) => vec![ChannelEvent::Names {
                channel: channel.clone(),
                entries: names.split_whitespace().map(parse_names_entry).collect(),
            }],
            (RPL_TOPIC, [_, channel, topic]) => vec![ChannelEvent::Topic {
                channel: channel.clone(),
                topic: non_empty(topic),
            }],
            (RPL_TOPICWHOTIME, [_, channel, set_by, ..]) => vec![ChannelEvent::TopicSetBy {
                channel: channel.clone(),
                set_by: set_by.clone(),
            }],
            (RPL_CHANNELMODEIS, [_, channel, modes @ ..]) if !modes.is_empty() => {
                vec![ChannelEvent::ChannelModes {
                    channel: channel.clone(),
                    modes: modes.join(" "),
                }]
            }
            (RPL_CREATIONTIME, [_, channel, timestamp, ..]) => timestamp
                .parse::<i64>()
                .ok()
                .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
                .map(|at| ChannelEvent::CreatedAt {
                    channel: channel.clone(),
                    at,
                })
                .into_iter()
                .collect(),
            _ => vec![],
        }
    }

    /// Returns the event for `nick` leaving `channel`.
    fn departure(&self, channel: &str, nick: &str) -> ChannelEvent {
        if self.is_me(nick) {
            ChannelEvent::SelfPart {
                channel: channel.to_string(),
                nick: nick.to_string(),
            }
        } else {
            ChannelEvent::Part {
                channel: channel.to_string(),
                nick: nick.to_string(),
            }
        }
    }
}

/// Splits a comma-separated target list, skipping empty items.
fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').filter(|item| !item.is_empty())
}

/// Maps an empty topic to `None`, which clears it.
fn non_empty(topic: &str) -> Option<String> {
    (!topic.is_empty()).then(|| topic.to_string())
}

/// Returns the numeric code and arguments of a server reply.
///
/// Replies the `irc` crate doesn't know by name arrive as raw commands.
fn numeric(command: &Command) -> Option<(u16, &[String])> {
    match command {
        Command::Response(response, args) => Some((*response as u16, args.as_slice())),
        Command::Raw(code, args) if code.len() == 3 => {
            code.parse().ok().map(|code| (code, args.as_slice()))
        }
        _ => None,
    }
}

/// Returns the prefix flag a channel mode grants, if it is a membership status mode.
const fn prefix_flag(mode: &ChannelMode) -> Option<char> {
    match mode {
        ChannelMode::Founder => Some('~'),
        ChannelMode::Admin => Some('&'),
        ChannelMode::Oper => Some('@'),
        ChannelMode::Halfop => Some('%'),
        ChannelMode::Voice => Some('+'),
        _ => None,
    }
}

/// Translates a single status mode change, e.g. `+o alice`.
fn user_mode_event(channel: &str, mode: &Mode<ChannelMode>) -> Option<ChannelEvent> {
    let (mode, nick, set) = match mode {
        Mode::Plus(mode, Some(nick)) => (mode, nick, true),
        Mode::Minus(mode, Some(nick)) => (mode, nick, false),
        _ => return None,
    };

    prefix_flag(mode).map(|flag| ChannelEvent::UserMode {
        channel: channel.to_string(),
        nick: nick.clone(),
        flag,
        set,
    })
}

/// Splits a `NAMES` entry such as `@+alice` or `@alice!user@host` into a nickname and prefix.
fn parse_names_entry(entry: &str) -> (String, ModePrefix) {
    let nick = entry.trim_start_matches(NAMES_PREFIXES);
    let prefix = &entry[..entry.len() - nick.len()];
    let nick = nick.split_once('!').map_or(nick, |(nick, _)| nick);

    (nick.to_string(), ModePrefix::from(prefix))
}

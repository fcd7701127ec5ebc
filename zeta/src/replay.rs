//! Replays a recorded connection log into the shared channel cache.

use std::borrow::Cow;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, instrument, warn};
use zeta_core::{ChannelEvent, ConnectionId, SharedChannelCache};

use crate::Error;
use crate::config::ConnectionConfig;
use crate::translate::Translator;

/// Counters collected while replaying a single connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// The number of lines read from the log.
    pub lines: usize,
    /// The number of lines that could not be parsed as IRC messages.
    pub skipped: usize,
    /// The number of channel events applied to the cache.
    pub events: usize,
    /// The number of events that changed the cache.
    pub changes: usize,
}

impl ReplayStats {
    fn record(&mut self, changed: bool) {
        self.events += 1;

        if changed {
            self.changes += 1;
        }
    }
}

/// Reads the log of `connection` line by line and applies every channel event it implies to
/// `cache`.
///
/// Lines are decoded lossily when they aren't valid UTF-8. Blank lines are ignored and lines
/// that can't be parsed are logged and skipped. If the connection is configured to disconnect
/// at the end of its log, its memberships are released once the log is exhausted.
///
/// # Errors
///
/// Returns [`Error::ReadLog`] if the log can't be opened or read.
#[instrument(skip_all, fields(connection = connection.id, nickname = %connection.nickname))]
pub async fn replay(
    cache: SharedChannelCache,
    connection: ConnectionConfig,
) -> Result<ReplayStats, Error> {
    let read_error = |source: std::io::Error| Error::ReadLog {
        path: connection.log.clone(),
        source,
    };

    let file = File::open(&connection.log).await.map_err(read_error)?;
    let mut lines = BufReader::new(file).split(b'\n');

    let id = ConnectionId::new(connection.id);
    let mut translator = Translator::new(connection.nickname.as_str());
    let mut stats = ReplayStats::default();

    debug!(path = ?connection.log, "replaying log");

    while let Some(bytes) = lines.next_segment().await.map_err(read_error)? {
        stats.lines += 1;

        // IRC lines are bytes, not text
        let line = String::from_utf8_lossy(&bytes);

        if matches!(line, Cow::Owned(_)) {
            debug!(line_no = stats.lines, "line is not valid utf-8, decoding lossily");
        }

        let line = line.trim_end_matches('\r');

        if line.trim().is_empty() {
            continue;
        }

        let message = match line.parse::<irc::proto::Message>() {
            Ok(message) => message,
            Err(err) => {
                warn!(line_no = stats.lines, %err, "skipping unparseable line");
                stats.skipped += 1;

                continue;
            }
        };

        for event in translator.translate(&message) {
            stats.record(cache.apply(id, &event));
        }
    }

    if connection.disconnect_at_end {
        let event = ChannelEvent::Disconnect {
            nick: Some(translator.nickname().to_string()),
        };

        stats.record(cache.apply(id, &event));
    }

    info!(
        lines = stats.lines,
        skipped = stats.skipped,
        events = stats.events,
        changes = stats.changes,
        "replay finished"
    );

    Ok(stats)
}

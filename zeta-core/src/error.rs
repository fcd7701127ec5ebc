use thiserror::Error;

use crate::ConnectionId;

/// Internal-consistency faults between the channel registry and the connection index.
///
/// These never result from ordinary protocol races; they mean the cache was driven out of
/// order.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A connection is recorded as joined to a channel that is not in the cache
    #[error("Connection {connection} is joined to `{channel}', which is not in the cache")]
    Desynchronized {
        /// The connection holding the dangling key
        connection: ConnectionId,
        /// The normalized channel key
        channel: String,
    },
    /// A channel remains in the cache although no connection is joined to it
    #[error("Channel `{channel}' is cached but no connection is joined to it")]
    Orphaned {
        /// The normalized channel key
        channel: String,
    },
}

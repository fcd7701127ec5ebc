//! Channel state shared between IRC client connections.
//!
//! Several connections in one process often sit in the same channels. Rather than have each
//! connection keep its own copy of every roster, they share one [`ChannelCache`], which owns
//! every [`Channel`] and remembers which connection is joined to which channel. A channel is
//! dropped as soon as the last connection referencing it leaves.
//!
//! The cache consumes already-parsed [`ChannelEvent`]s; reading and parsing protocol lines is
//! left to the caller. Use [`SharedChannelCache`] when connections run on different threads or
//! tasks.

mod cache;
mod channel;
mod error;
mod event;
mod shared;

pub use cache::{ChannelCache, ConnectionId};
pub use channel::{Channel, ModePrefix, normalize};
pub use error::Error;
pub use event::ChannelEvent;
pub use shared::SharedChannelCache;

//! Replays the recorded server traffic of several IRC connections through a single shared
//! channel cache.

pub mod config;
mod error;
pub mod replay;
pub mod tracing;
pub mod translate;

pub use config::Config;
pub use error::Error;
pub use replay::{ReplayStats, replay};
pub use translate::Translator;

//! Error types

use std::io;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Application errors for configuration, replay and cache verification.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The configuration could not be loaded or is invalid.
    #[error("Could not load configuration")]
    #[diagnostic(help("check the config file and any ZETA_ environment variables"))]
    Config(#[from] Box<figment::Error>),
    /// A replay log could not be read.
    #[error("Could not read replay log `{path}'")]
    ReadLog {
        /// The path of the log
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
    /// The channel cache is internally inconsistent.
    #[error("Channel cache integrity check failed")]
    Integrity(#[from] zeta_core::Error),
    /// A replay task panicked or was cancelled.
    #[error("Replay task failed")]
    Join(#[from] tokio::task::JoinError),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

use std::path::PathBuf;

use argh::FromArgs;
use miette::WrapErr;
use tracing::{debug, info, trace};

use zeta::{Config, Error, ReplayStats};
use zeta_core::SharedChannelCache;

/// Replays recorded IRC connection logs through a shared channel cache.
#[derive(Debug, FromArgs)]
struct Opts {
    /// path to config file
    #[argh(option, default = "PathBuf::from(\"config.toml\")")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Parse command-line arguments
    let opts: Opts = argh::from_env();

    // Load the config file, with environment variables taking precedence
    let config = Config::load(&opts.config)
        .wrap_err_with(|| format!("loading config file {}", opts.config.display()))?;

    zeta::tracing::try_init(&config.tracing)?;

    info!(
        "{} v{} running",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let cache = SharedChannelCache::new();

    trace!(
        num_connections = config.replay.connections.len(),
        "spawning replay tasks"
    );

    let tasks: Vec<_> = config
        .replay
        .connections
        .into_iter()
        .map(|connection| tokio::spawn(zeta::replay(cache.clone(), connection)))
        .collect();

    let mut total = ReplayStats::default();

    for task in tasks {
        let stats = task.await.map_err(Error::from)??;

        total.lines += stats.lines;
        total.skipped += stats.skipped;
        total.events += stats.events;
        total.changes += stats.changes;
    }

    {
        let cache = cache.lock();

        for channel in cache.channels() {
            debug!(
                channel = %channel.display_name(),
                users = channel.len(),
                connections = ?cache.connections_in(channel.key()),
                "channel remains cached"
            );
        }

        cache.verify_integrity().map_err(Error::from)?;

        info!(
            lines = total.lines,
            skipped = total.skipped,
            events = total.events,
            changes = total.changes,
            channels = cache.channel_count(),
            connections = cache.connection_count(),
            "all replays finished"
        );
    }

    Ok(())
}

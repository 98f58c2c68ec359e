//! Tracing setup for the command-line driver.

use std::sync::OnceLock;

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;

static INIT: OnceLock<()> = OnceLock::new();

/// Maps a `-v` count to the default level; `RUST_LOG` directives still apply.
pub fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialize tracing once per process. Output goes to stderr so program
/// results on stdout stay clean.
pub fn init(verbosity: u8) {
    INIT.get_or_init(|| {
        SubscriberBuilder::default()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(level_for(verbosity).into()),
            )
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    });
    tracing::debug!(verbosity, "tracing initialised");
}

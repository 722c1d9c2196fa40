//! Log output setup for the `banlist` binary and for bots embedding the
//! library.

use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Install the process-wide subscriber, writing to stderr.
///
/// `RUST_LOG` wins when set; otherwise events at `level` and above are kept.
/// With `json` every event is one JSON object per line. Returns `false` when
/// a subscriber was already installed, in which case nothing changes.
pub fn init_tracing(json: bool, level: Level) -> bool {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();
    let output = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let output = if json {
        output.json().boxed()
    } else {
        output.boxed()
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
        .is_ok()
}

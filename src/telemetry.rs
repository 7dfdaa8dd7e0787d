use tracing::metadata::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

const ENV_VAR: &str = "BOTGARD_LOG";

/// Install the global subscriber. The filter is taken from, in order:
/// the `BOTGARD_LOG` environment variable, the config file's `logging.filter`
/// and the verbosity flag. Calling this twice is a no-op.
pub fn init(verbosity: u8, logging: &LoggingConfig) {
    let builder =
        EnvFilter::builder().with_default_directive(level_from_verbosity(verbosity).into());
    let filter = if std::env::var_os(ENV_VAR).is_some() {
        builder.with_env_var(ENV_VAR).from_env_lossy()
    } else if let Some(directives) = &logging.filter {
        builder.parse_lossy(directives)
    } else {
        builder.with_env_var(ENV_VAR).from_env_lossy()
    };

    let _ = tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

fn level_from_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::ERROR,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    }
}

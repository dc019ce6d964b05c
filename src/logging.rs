//! Logger setup for binaries embedding the client

use std::io::Write;

use log::LevelFilter;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: LevelFilter,
    /// Honour `RUST_LOG` when it is set
    pub respect_env: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            respect_env: true,
        }
    }
}

/// Parse a level name such as `debug`; unknown names fall back to `info`.
pub fn parse_level(name: &str) -> LevelFilter {
    name.parse().unwrap_or(LevelFilter::Info)
}

/// Install the global logger. Later calls are no-ops.
pub fn init_logging(config: LoggingConfig) {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                chrono::Local::now().format(TIME_FORMAT),
                record.level(),
                record.args()
            )
        })
        .filter(None, config.level);

    if config.respect_env {
        builder.parse_default_env();
    }

    let _ = builder.try_init();
}

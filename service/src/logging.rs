use crate::config::Config;
use log::{LevelFilter, SetLoggerError};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// Dependencies whose records only show up at Trace. Observer callbacks run
/// inside the runtime's threads, so their internals would drown our lines.
const DEPENDENCY_MODULES: &[&str] = &["tokio", "mio", "async_stream", "dotenvy", "clap"];

pub struct Logger {}

impl Logger {
    /// Installs the global terminal logger at the configured level.
    ///
    /// Records carry their module from Info up, which tells session lifecycle
    /// (`observe::provider`) apart from subscriptions (`observe::fish`,
    /// `observe::registry`). Fails if a global logger is already installed.
    pub fn init_logger(config: &Config) -> Result<(), SetLoggerError> {
        TermLogger::init(
            config.log_level_filter,
            Self::log_config(config.log_level_filter),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        )
    }

    fn log_config(level: LevelFilter) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder
            .set_time_format_rfc3339()
            .set_target_level(LevelFilter::Info)
            .set_location_level(LevelFilter::Off);

        if level != LevelFilter::Trace {
            for module in DEPENDENCY_MODULES {
                builder.add_filter_ignore_str(module);
            }
        }

        builder.build()
    }
}

use std::sync::Once;

/// Logging verbosity accepted by [`init_logger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Only warnings and errors
    Warning = 0,
    /// General information messages
    Info = 1,
    /// Detailed debugging information
    Debug = 2,
}

impl From<i32> for LogLevel {
    fn from(value: i32) -> Self {
        match value {
            i32::MIN..=0 => LogLevel::Warning,
            1 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
        }
    }
}

static INIT: Once = Once::new();

/// Install the `env_logger` backend once per process.
///
/// `RUST_LOG` takes precedence when set; otherwise `default_level` applies.
/// Later calls, or a logger installed by the host application, are left alone.
pub fn init_logger(default_level: LogLevel) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(default_level.into());
        if let Ok(filters) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filters);
        }
        let _ = builder.try_init();
    });
}

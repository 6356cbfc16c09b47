//! `tracing-subscriber` initialization, matching `codex-exec`'s use of
//! `EnvFilter` so `RUST_LOG` still works, seeded from the agent config's
//! `logLevel` when the environment variable is absent.

use conveyor_protocol::config::LogLevel;
use tracing_subscriber::EnvFilter;

pub fn init(log_level: LogLevel) {
    let default_directive = match log_level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

//! Logging utilities and per-source log targets
//!
//! VKFW logs through the `log` facade. Messages are grouped into three
//! sources, each with its own target, so applications can raise the level of
//! one source without drowning in the others:
//!
//! - `vkfw::core` - dispatch engine, window registry, text input
//! - `vkfw::platform` - clock and platform glue
//! - `vkfw::backend` - display protocol traffic from the active backend

pub use log::{debug, error, info, trace, warn};

use crate::config::LoggingConfig;

/// A group of log messages that can be enabled independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogSource {
    /// Core messages
    Core,
    /// Platform messages
    Platform,
    /// Backend messages
    Backend,
}

impl LogSource {
    /// All sources
    pub const ALL: [Self; 3] = [Self::Core, Self::Platform, Self::Backend];

    /// The `log` target used for this source
    pub const fn target(self) -> &'static str {
        match self {
            Self::Core => "vkfw::core",
            Self::Platform => "vkfw::platform",
            Self::Backend => "vkfw::backend",
        }
    }
}

/// Initialize the logging system from `RUST_LOG`
pub fn init() {
    let _ = env_logger::try_init();
}

/// Initialize the logging system, raising every enabled source to `debug`
///
/// `RUST_LOG` is still honoured for everything else. Calling this more than
/// once is harmless; only the first call installs a logger.
pub fn init_with(config: &LoggingConfig) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
    for source in LogSource::ALL {
        if config.is_enabled(source) {
            builder.filter_module(source.target(), log::LevelFilter::Debug);
        }
    }
    let _ = builder.try_init();
}

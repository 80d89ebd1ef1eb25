//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Change the log level at runtime once config files are loaded
//!
//! # Design Decisions
//! - `RUST_LOG` always wins; the level argument and the `log.level` key
//!   only apply when it is unset
//! - The filter sits behind a reload layer so the level can change
//!   without reinstalling the subscriber

use tracing_subscriber::filter::ParseError;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

/// Level used when nothing else is configured.
pub const DEFAULT_LEVEL: &str = "info";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log level {level:?}: {source}")]
    InvalidLevel {
        level: String,
        #[source]
        source: ParseError,
    },

    #[error("failed to install log subscriber: {0}")]
    Init(#[from] TryInitError),

    #[error("failed to change log level: {0}")]
    Reload(#[from] reload::Error),
}

/// Runtime control over the installed filter.
#[derive(Debug, Clone)]
pub struct LogHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    env_override: bool,
}

impl LogHandle {
    /// Replace the active level unless `RUST_LOG` is in charge.
    pub fn set_level(&self, level: &str) -> Result<(), LoggingError> {
        if self.env_override {
            tracing::debug!(level, "RUST_LOG is set, ignoring configured log level");
            return Ok(());
        }
        let filter = parse_level(level)?;
        self.handle.reload(filter)?;
        tracing::info!(level, "Log level changed");
        Ok(())
    }
}

/// Install the global subscriber.
pub fn init(level: Option<&str>) -> Result<LogHandle, LoggingError> {
    let (filter, env_override) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (parse_level(level.unwrap_or(DEFAULT_LEVEL))?, false),
    };

    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(LogHandle { handle, env_override })
}

fn parse_level(level: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(level.trim()).map_err(|source| LoggingError::InvalidLevel {
        level: level.to_string(),
        source,
    })
}

//! Tracing subscriber setup driven by [`config::Logger`](crate::config::Logger).
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::{
    config::{LogFormat, Logger},
    Error, Result,
};

/// Installs the global subscriber. Does nothing when logging is disabled.
///
/// # Errors
/// Fails when the level directive is invalid or a subscriber is already installed.
pub fn init(config: &Logger) -> Result<()> {
    if !config.enable {
        return Ok(());
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|err| Error::Config(format!("invalid logger level: {err}")))?,
    };

    let layer = match config.format {
        LogFormat::Compact => fmt::layer().compact().with_writer(std::io::stderr).boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|err| Error::Message(format!("cannot install logger: {err}")))?;

    if config.pretty_backtrace {
        std::env::set_var("RUST_BACKTRACE", "1");
    }
    Ok(())
}

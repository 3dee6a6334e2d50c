//! Logging bootstrap.
//!
//! Builds the global `tracing` subscriber from [`LogSettings`]: JSON
//! output by default, human-readable console output on request, with the
//! level names the rest of the stack uses. `fatal` has no `tracing`
//! level of its own; [`fatal`] logs at error and terminates the process.

use tracing::Level;

use crate::config::LogSettings;

/// Errors from logging initialization.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("invalid log level: {0}")]
    InvalidLevel(String),

    #[error("logging already initialized")]
    AlreadyInitialized,
}

fn parse_level(level: &str) -> Result<Level, InitError> {
    match level {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" | "" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" | "fatal" => Ok(Level::ERROR),
        other => Err(InitError::InvalidLevel(other.to_string())),
    }
}

/// Installs the global subscriber. Call once at startup.
pub fn init_logging(settings: &LogSettings) -> Result<(), InitError> {
    let level = parse_level(&settings.level)?;

    match settings.format.as_str() {
        "console" | "text" => tracing_subscriber::fmt()
            .with_max_level(level)
            .try_init()
            .map_err(|_| InitError::AlreadyInitialized)?,
        _ => tracing_subscriber::fmt()
            .json()
            .with_max_level(level)
            .try_init()
            .map_err(|_| InitError::AlreadyInitialized)?,
    }

    if !settings.service_name.is_empty() {
        tracing::info!(
            service = %settings.service_name,
            environment = %settings.environment,
            "logging initialized"
        );
    }
    Ok(())
}

/// Logs at error level and terminates the process with a non-zero exit
/// code.
pub fn fatal(message: &str) -> ! {
    tracing::error!("{message}");
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_parse() {
        assert_eq!(parse_level("trace").unwrap(), Level::TRACE);
        assert_eq!(parse_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_level("info").unwrap(), Level::INFO);
        assert_eq!(parse_level("warn").unwrap(), Level::WARN);
        assert_eq!(parse_level("error").unwrap(), Level::ERROR);
        assert_eq!(parse_level("fatal").unwrap(), Level::ERROR);
        assert!(matches!(
            parse_level("verbose"),
            Err(InitError::InvalidLevel(_))
        ));
    }
}

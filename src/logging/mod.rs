//! Logging initialisation via tracing-subscriber.
//!
//! Two ways in:
//!
//! - [`init`]: plain console logging to stderr, level from a string or
//!   `RUST_LOG`.
//! - [`init_with_config`]: sinks built from a [`LoggingConfig`], installed
//!   as a [`SinkLayer`]. The returned [`LoggingHandle`] clears loggers,
//!   dispatches hand-built records and feeds the panic hook.

pub mod config;
pub mod factory;
pub mod filters;
pub mod format;
pub mod layer;
pub mod panic_hook;
pub mod record;
pub mod sinks;

use std::path::Path;
use std::sync::Arc;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::error::KitError;

pub use config::{LoggingConfig, LoggingConfigurator, add_logger_prefix};
pub use factory::SinkFactory;
pub use layer::{Router, SinkLayer};
pub use panic_hook::PanicRouter;
pub use record::Record;
pub use sinks::{LazySink, Sink};

/// Initialise the global tracing subscriber.
///
/// `level` accepts standard level strings: `"error"`, `"warn"`, `"info"`,
/// `"debug"`, `"trace"`.
///
/// If `prefer_level` is `true`, `level` takes precedence and `RUST_LOG` is only
/// used as a fallback when `level` is invalid. If `prefer_level` is `false`,
/// `RUST_LOG` takes precedence and `level` is the fallback.
pub fn init(level: &str, prefer_level: bool) -> Result<(), KitError> {
    let filter = env_filter(level, prefer_level)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| KitError::Logger(format!("failed to set subscriber: {e}")))?;
    Ok(())
}

/// Build sinks from `config` and install them as the global subscriber.
///
/// `RUST_LOG`, when set, pre-filters events before they reach the loggers.
pub fn init_with_config(log_dir: &Path, config: LoggingConfig, lazy: bool) -> Result<LoggingHandle, KitError> {
    let filter = prefilter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref())?;
    let handle = LoggingHandle::configure(log_dir, config, lazy)?;
    tracing_subscriber::registry()
        .with(filter)
        .with(handle.layer())
        .try_init()
        .map_err(|e| KitError::Logger(format!("failed to set subscriber: {e}")))?;
    tracing::debug!(log_dir = %log_dir.display(), lazy, "logging configured");
    Ok(handle)
}

fn env_filter(level: &str, prefer_level: bool) -> Result<EnvFilter, KitError> {
    if prefer_level {
        match EnvFilter::try_new(level) {
            Ok(filter) => Ok(filter),
            Err(level_err) => EnvFilter::try_from_default_env().map_err(|env_err| {
                KitError::Logger(format!(
                    "invalid log level '{level}': {level_err}; RUST_LOG parse failed: {env_err}"
                ))
            }),
        }
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .map_err(|e| KitError::Logger(format!("invalid log level '{level}': {e}")))
    }
}

/// `RUST_LOG` pre-filter for configured logging: everything passes when it
/// is unset, and a value that does not parse is an error.
fn prefilter(rust_log: Option<&str>) -> Result<EnvFilter, KitError> {
    match rust_log {
        Some(directives) => EnvFilter::try_new(directives)
            .map_err(|e| KitError::Logger(format!("invalid RUST_LOG '{directives}': {e}"))),
        None => EnvFilter::try_new("trace").map_err(|e| KitError::Logger(format!("invalid default filter: {e}"))),
    }
}

/// Parse a log level string into a [`LevelFilter`], returning an error on
/// unrecognised values. `warning` and `critical` are accepted as `warn` and
/// `error`.
pub fn parse_level(level: &str) -> Result<LevelFilter, KitError> {
    if level.is_empty() {
        return Err(KitError::Logger("log level must not be empty".into()));
    }
    let normalized = match level.to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        other => other.to_string(),
    };
    normalized
        .parse::<LevelFilter>()
        .map_err(|_| KitError::Logger(format!("unrecognised log level: '{level}'")))
}

/// Shared access to the loggers behind a [`SinkLayer`].
#[derive(Clone)]
pub struct LoggingHandle {
    router: Arc<Router>,
}

impl LoggingHandle {
    /// Build the loggers without installing anything.
    pub fn configure(log_dir: &Path, config: LoggingConfig, lazy: bool) -> Result<Self, KitError> {
        let loggers = LoggingConfigurator::new(log_dir, config).lazy(lazy).configure()?;
        Ok(Self::from_router(Arc::new(Router::new(loggers))))
    }

    pub fn from_router(router: Arc<Router>) -> Self {
        Self { router }
    }

    /// A layer sharing this handle's loggers.
    pub fn layer(&self) -> SinkLayer {
        SinkLayer::new(Arc::clone(&self.router))
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Route a hand-built record. Returns how many sinks emitted it.
    pub fn dispatch(&self, record: Record) -> Result<usize, KitError> {
        self.router.dispatch(record)
    }

    /// Close and detach the sinks of loggers whose name starts with
    /// `prefix`; every logger for `""`.
    pub fn clear(&self, prefix: &str) -> Result<usize, KitError> {
        self.router.clear(prefix)
    }

    pub fn flush(&self) -> Result<(), KitError> {
        self.router.flush()
    }

    pub fn logger_names(&self) -> Vec<String> {
        self.router.logger_names()
    }
}

impl std::fmt::Debug for LoggingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingHandle").field("loggers", &self.logger_names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn prefilter_rejects_unparsable_rust_log() {
        let err = prefilter(Some("pfund=notalevel")).unwrap_err();
        assert!(matches!(err, KitError::Logger(_)));
        assert!(err.to_string().contains("invalid RUST_LOG 'pfund=notalevel'"));
        assert!(prefilter(Some("pfund=debug,warn")).is_ok());
        assert!(prefilter(None).is_ok());
    }

    #[test]
    fn valid_levels_parse() {
        for l in &["error", "warn", "info", "debug", "trace", "off", "WARNING", "Critical"] {
            assert!(parse_level(l).is_ok(), "expected '{l}' to be valid");
        }
        assert_eq!(parse_level("warning").unwrap(), LevelFilter::WARN);
        assert_eq!(parse_level("critical").unwrap(), LevelFilter::ERROR);
    }

    #[test]
    fn invalid_level_errors() {
        assert!(parse_level("verbose").is_err());
        assert!(parse_level("").is_err());
        assert!(parse_level("INFO_LEVEL").is_err());
    }

    #[test]
    fn init_info_succeeds_or_already_init() {
        // May already be set by a prior test in the same process; both outcomes are fine.
        match init("info", false) {
            Ok(()) => {}
            Err(KitError::Logger(msg)) if msg.contains("set subscriber") => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn handle_dispatches_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig::from_toml_str(
            r#"
[formatters.file]
format = "{name} {message}"

[handlers.file_handler]
class = "file"

[loggers.root]
level = "info"
handlers = ["file_handler"]

[loggers.pfeed]
level = "debug"
handlers = ["file_handler"]
propagate = false
"#,
        )
        .unwrap();
        let handle = LoggingHandle::configure(dir.path(), config, true).unwrap();
        assert_eq!(handle.logger_names(), vec!["pfeed", "root"]);
        assert!(!dir.path().join("pfeed.log").exists());

        assert_eq!(handle.dispatch(Record::new(Level::DEBUG, "pfeed::yahoo", "fetched")).unwrap(), 1);
        handle.flush().unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("pfeed.log")).unwrap(),
            "pfeed::yahoo fetched\n"
        );
        assert!(!dir.path().join("root.log").exists());

        assert_eq!(handle.clear("pfeed").unwrap(), 1);
        assert_eq!(handle.dispatch(Record::new(Level::INFO, "pfeed", "gone")).unwrap(), 0);
    }
}

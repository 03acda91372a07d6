//! TOML logging configuration and the configurator that turns it into sinks.
//!
//! ```toml
//! [formatters.file]
//! format = "{asctime} | {levelname} | {name} | {message} | {trimmedpath}:{lineno}"
//! datefmt = "%Y-%m-%d %H:%M:%S"
//!
//! [filters.trimmed]
//! kind = "trimmed_path"
//!
//! [handlers.stream_handler]
//! class = "stream"
//! level = "warn"
//!
//! [handlers.file_handler]
//! class = "timed_rotating_file"
//! filters = ["trimmed"]
//! kwargs = { when = "midnight", backup_count = 7 }
//!
//! [loggers.root]
//! level = "info"
//! handlers = ["stream_handler"]
//!
//! [loggers.pfund]
//! level = "debug"
//! handlers = ["file_handler"]
//! ```
//!
//! Handlers whose name ends in `file_handler` are instantiated once per
//! logger that references them, writing to `<log_dir>/<logger>.log`. Every
//! other handler is built once and shared.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use super::factory::SinkFactory;
use super::filters::{Filter, TargetFilter, TrimmedPathFilter};
use super::format::{DEFAULT_FORMAT, Formatter, PatternFormatter};
use super::parse_level;
use super::sinks::{LazySink, Sink, TimedRotatingFileSink};
use crate::error::KitError;

/// Name of the catch-all logger.
pub const ROOT_LOGGER: &str = "root";

/// Handlers with this suffix get one instance (and one file) per logger.
const FILE_HANDLER_SUFFIX: &str = "file_handler";

/// Formatter applied to per-logger file handlers that do not name one.
const DEFAULT_FILE_FORMATTER: &str = "file";

// ── schema ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default)]
    pub formatters: BTreeMap<String, FormatterConfig>,
    #[serde(default)]
    pub filters: BTreeMap<String, FilterConfig>,
    #[serde(default)]
    pub handlers: BTreeMap<String, HandlerConfig>,
    #[serde(default)]
    pub loggers: BTreeMap<String, LoggerConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatterConfig {
    pub format: Option<String>,
    pub datefmt: Option<String>,
    #[serde(default)]
    pub utc: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    TrimmedPath,
    Target,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub kind: FilterKind,
    /// Target prefix for `kind = "target"`.
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Sink identifier understood by [`SinkFactory`].
    pub class: String,
    pub level: Option<String>,
    pub formatter: Option<String>,
    #[serde(default)]
    pub filters: Vec<String>,
    /// Passed verbatim to the sink constructor.
    #[serde(default)]
    pub kwargs: toml::Table,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggerConfig {
    pub level: Option<String>,
    #[serde(default)]
    pub handlers: Vec<String>,
    #[serde(default = "default_propagate")]
    pub propagate: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self { level: None, handlers: Vec::new(), propagate: true }
    }
}

fn default_propagate() -> bool {
    true
}

impl LoggingConfig {
    pub fn from_toml_str(src: &str) -> Result<Self, KitError> {
        Ok(toml::from_str(src)?)
    }

    pub fn load(path: &Path) -> Result<Self, KitError> {
        let src = fs::read_to_string(path)
            .map_err(|e| KitError::Config(format!("cannot read logging config {}: {e}", path.display())))?;
        Self::from_toml_str(&src)
    }
}

/// Copy of `config` with every logger except `root` and `prefix` itself
/// renamed to `<prefix>.<name>`.
pub fn add_logger_prefix(config: &LoggingConfig, prefix: &str) -> Result<LoggingConfig, KitError> {
    if config.loggers.is_empty() {
        return Err(KitError::Config("logging config must contain a 'loggers' section".into()));
    }
    let mut result = config.clone();
    result.loggers = config
        .loggers
        .iter()
        .map(|(name, logger)| {
            let renamed = if name == ROOT_LOGGER || name == prefix {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            (renamed, logger.clone())
        })
        .collect();
    Ok(result)
}

// ── configured output ────────────────────────────────────────────────────────

/// A logger with its sinks attached.
pub struct ConfiguredLogger {
    pub name: String,
    /// `None` inherits from the nearest configured ancestor.
    pub level: Option<LevelFilter>,
    pub propagate: bool,
    pub sinks: Vec<Arc<dyn Sink>>,
}

impl std::fmt::Debug for ConfiguredLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfiguredLogger")
            .field("name", &self.name)
            .field("level", &self.level)
            .field("propagate", &self.propagate)
            .field("sinks", &self.sinks.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

// ── configurator ─────────────────────────────────────────────────────────────

pub struct LoggingConfigurator {
    log_dir: PathBuf,
    config: LoggingConfig,
    lazy: bool,
    factory: Arc<SinkFactory>,
}

impl LoggingConfigurator {
    pub fn new(log_dir: impl Into<PathBuf>, config: LoggingConfig) -> Self {
        Self {
            log_dir: log_dir.into(),
            config,
            lazy: false,
            factory: Arc::new(SinkFactory::with_builtins()),
        }
    }

    /// Wrap per-logger file handlers in [`LazySink`] so their files only
    /// appear once something is written.
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn with_factory(mut self, factory: Arc<SinkFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Build every logger in the config.
    pub fn configure(&self) -> Result<Vec<ConfiguredLogger>, KitError> {
        let formatters = self.build_formatters()?;
        let filters = self.build_filters();

        let mut shared: BTreeMap<&str, Arc<dyn Sink>> = BTreeMap::new();
        for (name, handler) in &self.config.handlers {
            if name.ends_with(FILE_HANDLER_SUFFIX) {
                continue;
            }
            let sink = self.factory.build(&handler.class, Path::new(""), &handler.kwargs)?;
            self.apply(name, handler, sink.as_ref(), &formatters, &filters, None)?;
            shared.insert(name.as_str(), sink);
        }

        let mut loggers = Vec::with_capacity(self.config.loggers.len());
        for (logger_name, logger) in &self.config.loggers {
            let mut sinks = Vec::with_capacity(logger.handlers.len());
            for handler_name in &logger.handlers {
                let sink = if handler_name.ends_with(FILE_HANDLER_SUFFIX) {
                    self.file_handler(logger_name, handler_name, &formatters, &filters)?
                } else {
                    shared.get(handler_name.as_str()).cloned().ok_or_else(|| {
                        KitError::Config(format!(
                            "logger '{logger_name}' references unknown handler '{handler_name}'"
                        ))
                    })?
                };
                sinks.push(sink);
            }
            let level = logger.level.as_deref().map(parse_level).transpose()?;
            loggers.push(ConfiguredLogger {
                name: logger_name.clone(),
                level,
                propagate: logger.propagate,
                sinks,
            });
        }
        Ok(loggers)
    }

    fn build_formatters(&self) -> Result<BTreeMap<&str, Arc<dyn Formatter>>, KitError> {
        self.config
            .formatters
            .iter()
            .map(|(name, cfg)| {
                let mut formatter = PatternFormatter::new(cfg.format.as_deref().unwrap_or(DEFAULT_FORMAT))
                    .with_utc(cfg.utc);
                if let Some(datefmt) = &cfg.datefmt {
                    formatter = formatter.with_datefmt(datefmt.as_str()).map_err(|_| {
                        KitError::Config(format!("formatter '{name}': invalid datefmt '{datefmt}'"))
                    })?;
                }
                Ok((name.as_str(), Arc::new(formatter) as Arc<dyn Formatter>))
            })
            .collect()
    }

    fn build_filters(&self) -> BTreeMap<&str, Arc<dyn Filter>> {
        self.config
            .filters
            .iter()
            .map(|(name, cfg)| {
                let filter: Arc<dyn Filter> = match cfg.kind {
                    FilterKind::TrimmedPath => Arc::new(TrimmedPathFilter::new()),
                    FilterKind::Target => Arc::new(TargetFilter::new(cfg.name.clone())),
                };
                (name.as_str(), filter)
            })
            .collect()
    }

    fn file_handler(
        &self,
        logger_name: &str,
        handler_name: &str,
        formatters: &BTreeMap<&str, Arc<dyn Formatter>>,
        filters: &BTreeMap<&str, Arc<dyn Filter>>,
    ) -> Result<Arc<dyn Sink>, KitError> {
        let handler = self.config.handlers.get(handler_name).ok_or_else(|| {
            KitError::Config(format!("logger '{logger_name}' references unknown handler '{handler_name}'"))
        })?;
        let path = self.log_dir.join(format!("{logger_name}.log"));

        let sink: Arc<dyn Sink> = if self.lazy {
            Arc::new(LazySink::new(
                &path,
                Some(handler.class.as_str()),
                handler.kwargs.clone(),
                Arc::clone(&self.factory),
            ))
        } else {
            let rotating = match self.factory.resolve(&handler.class).as_deref() {
                Some("timed_rotating_file") => Some(TimedRotatingFileSink::from_kwargs(&path, &handler.kwargs)?),
                Some("compressed_timed_rotating_file") => {
                    Some(TimedRotatingFileSink::compressed_from_kwargs(&path, &handler.kwargs)?)
                }
                _ => None,
            };
            match rotating {
                Some(rotating) => {
                    if rotating.should_rollover()? {
                        rotating.do_rollover()?;
                    }
                    Arc::new(rotating)
                }
                None => self.factory.build(&handler.class, &path, &handler.kwargs)?,
            }
        };

        self.apply(handler_name, handler, sink.as_ref(), formatters, filters, Some(DEFAULT_FILE_FORMATTER))?;
        Ok(sink)
    }

    /// Name, level, formatter and filters from `handler` onto `sink`.
    fn apply(
        &self,
        handler_name: &str,
        handler: &HandlerConfig,
        sink: &dyn Sink,
        formatters: &BTreeMap<&str, Arc<dyn Formatter>>,
        filters: &BTreeMap<&str, Arc<dyn Filter>>,
        default_formatter: Option<&str>,
    ) -> Result<(), KitError> {
        sink.set_name(Some(handler_name.to_string()));

        match handler.formatter.as_deref() {
            Some(name) => {
                let formatter = formatters.get(name).ok_or_else(|| {
                    KitError::Config(format!("handler '{handler_name}' references unknown formatter '{name}'"))
                })?;
                sink.set_formatter(Arc::clone(formatter));
            }
            None => {
                if let Some(formatter) = default_formatter.and_then(|name| formatters.get(name)) {
                    sink.set_formatter(Arc::clone(formatter));
                }
            }
        }

        if let Some(level) = &handler.level {
            sink.set_level(parse_level(level)?);
        }

        for name in &handler.filters {
            let filter = filters.get(name.as_str()).ok_or_else(|| {
                KitError::Config(format!("handler '{handler_name}' references unknown filter '{name}'"))
            })?;
            sink.add_filter(Arc::clone(filter));
        }
        Ok(())
    }
}

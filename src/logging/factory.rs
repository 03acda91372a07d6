//! Sink constructors looked up by identifier.
//!
//! Logging configs name their sink class with a string (`class = "file"`).
//! [`SinkFactory`] maps those identifiers to constructor functions at the
//! moment a sink is needed; a miss is [`KitError::UnknownTarget`].
//!
//! Built-in identifiers, with the alternate spellings accepted for them:
//!
//! | identifier            | also accepted                                                         |
//! |-----------------------|-----------------------------------------------------------------------|
//! | `file`                | `FileHandler`, `logging.FileHandler`                                  |
//! | `stream`              | `StreamHandler`, `logging.StreamHandler`                              |
//! | `timed_rotating_file` | `TimedRotatingFileHandler`, `logging.handlers.TimedRotatingFileHandler` |
//! | `compressed_timed_rotating_file` | `CompressedTimedRotatingFileHandler`, `pfund_kit.logging.handlers.CompressedTimedRotatingFileHandler` |
//!
//! Identifiers compare case-insensitively.

use std::{collections::HashMap, fmt, path::Path, sync::Arc};

use super::sinks::{FileSink, Sink, StreamSink, TimedRotatingFileSink};
use crate::alias::{AliasOptions, AliasRegistry};
use crate::error::KitError;

pub type SinkConstructor =
    Box<dyn Fn(&Path, &toml::Table) -> Result<Arc<dyn Sink>, KitError> + Send + Sync>;

const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("FileHandler", "file"),
    ("logging.FileHandler", "file"),
    ("StreamHandler", "stream"),
    ("logging.StreamHandler", "stream"),
    ("TimedRotatingFileHandler", "timed_rotating_file"),
    ("logging.handlers.TimedRotatingFileHandler", "timed_rotating_file"),
    ("CompressedTimedRotatingFileHandler", "compressed_timed_rotating_file"),
    ("pfund_kit.logging.handlers.CompressedTimedRotatingFileHandler", "compressed_timed_rotating_file"),
];

pub struct SinkFactory {
    constructors: HashMap<String, SinkConstructor>,
    aliases: AliasRegistry,
}

impl SinkFactory {
    /// Factory without any constructors.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
            aliases: AliasRegistry::empty(Self::alias_options()),
        }
    }

    pub fn with_builtins() -> Self {
        let mut factory = Self::empty();
        factory.register("file", |path, kwargs| Ok(Arc::new(FileSink::from_kwargs(path, kwargs)?)));
        factory.register("stream", |path, kwargs| Ok(Arc::new(StreamSink::from_kwargs(path, kwargs)?)));
        factory.register("timed_rotating_file", |path, kwargs| {
            Ok(Arc::new(TimedRotatingFileSink::from_kwargs(path, kwargs)?))
        });
        factory.register("compressed_timed_rotating_file", |path, kwargs| {
            Ok(Arc::new(TimedRotatingFileSink::compressed_from_kwargs(path, kwargs)?))
        });
        // the built-in table is conflict free
        if let Ok(aliases) = AliasRegistry::with_options(BUILTIN_ALIASES.iter().copied(), Self::alias_options()) {
            factory.aliases = aliases;
        }
        factory
    }

    fn alias_options() -> AliasOptions {
        AliasOptions { case_sensitive: false, allow_conflicts: false }
    }

    /// Register (or replace) the constructor for `id`.
    pub fn register<F>(&mut self, id: &str, constructor: F)
    where
        F: Fn(&Path, &toml::Table) -> Result<Arc<dyn Sink>, KitError> + Send + Sync + 'static,
    {
        self.constructors.insert(id.to_lowercase(), Box::new(constructor));
    }

    /// Add alternate identifiers. Fails if they collide with existing ones.
    pub fn add_aliases<I, K, V>(&mut self, pairs: I) -> Result<(), KitError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut all: Vec<(String, String)> =
            self.aliases.items().map(|(a, c)| (a.to_string(), c.to_string())).collect();
        all.extend(pairs.into_iter().map(|(a, c)| (a.into(), c.into())));
        self.aliases = AliasRegistry::with_options(all, Self::alias_options())?;
        Ok(())
    }

    /// Canonical identifier for `id`, if a constructor is registered for it.
    pub fn resolve(&self, id: &str) -> Option<String> {
        let canonical = self.aliases.resolve(id);
        self.constructors.contains_key(canonical.as_ref()).then(|| canonical.into_owned())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.resolve(id).is_some()
    }

    /// Construct the sink registered under `id`.
    pub fn build(&self, id: &str, path: &Path, kwargs: &toml::Table) -> Result<Arc<dyn Sink>, KitError> {
        let canonical = self.aliases.resolve(id);
        let constructor = self
            .constructors
            .get(canonical.as_ref())
            .ok_or_else(|| KitError::UnknownTarget(id.to_string()))?;
        constructor(path, kwargs)
    }

    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for SinkFactory {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for SinkFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkFactory")
            .field("identifiers", &self.identifiers())
            .field("aliases", &self.aliases)
            .finish()
    }
}

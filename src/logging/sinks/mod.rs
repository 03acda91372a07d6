//! Sinks: the handlers that write records somewhere.
//!
//! Every sink embeds a [`SinkState`] holding its name, minimum level,
//! filters and formatter. [`Sink::handle`] applies that gate and only then
//! calls [`Sink::emit`]; `emit` itself writes unconditionally.
//!
//! Sinks never log through `tracing` themselves: they run inside the
//! subscriber's event callback.

pub mod file;
pub mod lazy;
pub mod rotating;
pub mod stream;

use std::sync::{Arc, LazyLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::level_filters::LevelFilter;

use super::filters::Filter;
use super::format::{Formatter, PatternFormatter};
use super::record::Record;
use crate::error::KitError;

pub use file::FileSink;
pub use lazy::LazySink;
pub use rotating::{TimedRotatingFileSink, When};
pub use stream::{Stream, StreamSink};

static DEFAULT_FORMATTER: LazyLock<PatternFormatter> = LazyLock::new(PatternFormatter::default);

pub trait Sink: Send + Sync {
    fn state(&self) -> &SinkState;

    /// Write one record, bypassing the level/filter gate.
    fn emit(&self, record: &Record) -> Result<(), KitError>;

    fn flush(&self) -> Result<(), KitError> {
        Ok(())
    }

    fn close(&self) -> Result<(), KitError> {
        Ok(())
    }

    /// Gate on level and filters, then emit. Returns whether the record was
    /// emitted.
    fn handle(&self, record: &mut Record) -> Result<bool, KitError> {
        if !self.state().accepts(record) {
            return Ok(false);
        }
        self.emit(record)?;
        Ok(true)
    }

    fn name(&self) -> Option<String> {
        self.state().name()
    }

    fn set_name(&self, name: Option<String>) {
        self.state().set_name(name);
    }

    fn level(&self) -> LevelFilter {
        self.state().level()
    }

    fn set_level(&self, level: LevelFilter) {
        self.state().set_level(level);
    }

    fn set_formatter(&self, formatter: Arc<dyn Formatter>) {
        self.state().set_formatter(formatter);
    }

    fn add_filter(&self, filter: Arc<dyn Filter>) {
        self.state().add_filter(filter);
    }
}

/// Name, level, filters and formatter shared by every sink.
pub struct SinkState {
    name: RwLock<Option<String>>,
    level: RwLock<LevelFilter>,
    filters: RwLock<Vec<Arc<dyn Filter>>>,
    formatter: RwLock<Option<Arc<dyn Formatter>>>,
}

impl SinkState {
    pub fn new() -> Self {
        Self {
            name: RwLock::new(None),
            level: RwLock::new(LevelFilter::TRACE),
            filters: RwLock::new(Vec::new()),
            formatter: RwLock::new(None),
        }
    }

    /// Level and filter gate. Filters may annotate `record`.
    pub fn accepts(&self, record: &mut Record) -> bool {
        if record.level > *read(&self.level) {
            return false;
        }
        let filters = self.filters();
        filters.iter().all(|f| f.passes(record))
    }

    /// Render with the configured formatter, or `{levelname}: {message}`.
    pub fn format(&self, record: &Record) -> String {
        match read(&self.formatter).as_ref() {
            Some(formatter) => formatter.format(record),
            None => DEFAULT_FORMATTER.format(record),
        }
    }

    pub fn name(&self) -> Option<String> {
        read(&self.name).clone()
    }

    pub fn set_name(&self, name: Option<String>) {
        *write(&self.name) = name;
    }

    pub fn level(&self) -> LevelFilter {
        *read(&self.level)
    }

    pub fn set_level(&self, level: LevelFilter) {
        *write(&self.level) = level;
    }

    pub fn filters(&self) -> Vec<Arc<dyn Filter>> {
        read(&self.filters).clone()
    }

    pub fn add_filter(&self, filter: Arc<dyn Filter>) {
        write(&self.filters).push(filter);
    }

    pub fn formatter(&self) -> Option<Arc<dyn Formatter>> {
        read(&self.formatter).clone()
    }

    pub fn set_formatter(&self, formatter: Arc<dyn Formatter>) {
        *write(&self.formatter) = Some(formatter);
    }

    /// Copy name, level, formatter and filters onto `target`.
    pub fn copy_onto(&self, target: &dyn Sink) {
        if let Some(name) = self.name() {
            target.set_name(Some(name));
        }
        target.set_level(self.level());
        if let Some(formatter) = self.formatter() {
            target.set_formatter(formatter);
        }
        for filter in self.filters() {
            target.add_filter(filter);
        }
    }
}

impl Default for SinkState {
    fn default() -> Self {
        Self::new()
    }
}

// Config setters cannot fail; a poisoned lock still holds usable data.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

// ── kwargs ───────────────────────────────────────────────────────────────────

/// Typed reader over a sink's constructor kwargs. [`finish`](Self::finish)
/// rejects keys nobody asked for.
pub struct Kwargs<'a> {
    sink: &'static str,
    table: &'a toml::Table,
    seen: Vec<&'a str>,
}

impl<'a> Kwargs<'a> {
    pub fn new(sink: &'static str, table: &'a toml::Table) -> Self {
        Self { sink, table, seen: Vec::new() }
    }

    fn take(&mut self, key: &'a str) -> Option<&'a toml::Value> {
        self.seen.push(key);
        self.table.get(key)
    }

    fn invalid(&self, key: &str, expected: &str, got: &toml::Value) -> KitError {
        KitError::Config(format!(
            "{} sink: kwarg '{key}' must be {expected}, got {}",
            self.sink,
            got.type_str()
        ))
    }

    pub fn string(&mut self, key: &'a str) -> Result<Option<&'a str>, KitError> {
        match self.take(key) {
            None => Ok(None),
            Some(toml::Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(self.invalid(key, "a string", other)),
        }
    }

    pub fn boolean(&mut self, key: &'a str) -> Result<Option<bool>, KitError> {
        match self.take(key) {
            None => Ok(None),
            Some(toml::Value::Boolean(b)) => Ok(Some(*b)),
            Some(toml::Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(Some(true)),
            Some(toml::Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(Some(false)),
            Some(other) => Err(self.invalid(key, "a boolean", other)),
        }
    }

    pub fn unsigned(&mut self, key: &'a str) -> Result<Option<u64>, KitError> {
        match self.take(key) {
            None => Ok(None),
            Some(toml::Value::Integer(i)) if *i >= 0 => Ok(Some(*i as u64)),
            Some(toml::Value::String(s)) if s.parse::<u64>().is_ok() => Ok(s.parse().ok()),
            Some(other) => Err(self.invalid(key, "a non-negative integer", other)),
        }
    }

    pub fn finish(self) -> Result<(), KitError> {
        let unknown: Vec<&str> = self
            .table
            .keys()
            .map(String::as_str)
            .filter(|k| !self.seen.contains(k))
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(KitError::Config(format!("{} sink: unknown kwargs: {}", self.sink, unknown.join(", "))))
        }
    }
}

/// Shared by the file-backed sinks: only UTF-8 output is written.
pub(crate) fn check_encoding(kwargs: &mut Kwargs<'_>) -> Result<(), KitError> {
    match kwargs.string("encoding")? {
        None => Ok(()),
        Some(enc) if enc.eq_ignore_ascii_case("utf-8") || enc.eq_ignore_ascii_case("utf8") => Ok(()),
        Some(enc) => Err(KitError::Config(format!("unsupported encoding '{enc}'; only utf-8 is written"))),
    }
}

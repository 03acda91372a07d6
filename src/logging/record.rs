//! Log records as seen by sinks, filters and formatters.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::Level;
use tracing::field::{Field, Visit};

/// One log event, detached from tracing's borrowed metadata.
#[derive(Debug, Clone)]
pub struct Record {
    pub level: Level,
    /// Logger name; the tracing target (`pfeed::data`) for events.
    pub target: String,
    pub message: String,
    /// Structured fields other than `message`, in recording order.
    pub fields: Vec<(String, String)>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub timestamp: DateTime<Utc>,
    /// Attributes attached by filters (e.g. `trimmedpath`).
    pub extra: BTreeMap<String, String>,
}

impl Record {
    pub fn new(level: Level, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            target: target.into(),
            message: message.into(),
            fields: Vec::new(),
            file: None,
            line: None,
            timestamp: Utc::now(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_location(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    /// Capture a tracing event.
    pub fn from_event(event: &tracing::Event<'_>) -> Self {
        let meta = event.metadata();
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        Self {
            level: *meta.level(),
            target: meta.target().to_string(),
            message: visitor.message.unwrap_or_else(|| meta.name().to_string()),
            fields: visitor.fields,
            file: meta.file().map(str::to_string),
            line: meta.line(),
            timestamp: Utc::now(),
            extra: BTreeMap::new(),
        }
    }

    /// Python-style level name (`WARNING`, not `WARN`), as written by
    /// the `{levelname}` placeholder.
    pub fn level_name(&self) -> &'static str {
        level_name(self.level)
    }
}

pub fn level_name(level: Level) -> &'static str {
    match level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<(String, String)>,
}

impl FieldVisitor {
    fn push(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.push(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value.to_string());
    }
}

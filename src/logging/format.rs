//! Record formatting.
//!
//! [`PatternFormatter`] renders `{placeholder}` patterns:
//!
//! | placeholder     | value                                  |
//! |-----------------|----------------------------------------|
//! | `{asctime}`     | timestamp rendered with `datefmt`      |
//! | `{levelname}`   | `DEBUG`, `INFO`, `WARNING`, ...        |
//! | `{name}`        | logger name / tracing target           |
//! | `{message}`     | event message                          |
//! | `{pathname}`    | source file as recorded                |
//! | `{filename}`    | last component of the source file      |
//! | `{lineno}`      | source line                            |
//! | `{fields}`      | structured fields as `k=v k=v`         |
//! | anything else   | looked up in `Record::extra`           |
//!
//! `{{` and `}}` produce literal braces.

use chrono::Local;
use chrono::format::{Item, StrftimeItems};

use super::record::Record;
use crate::error::KitError;

pub const DEFAULT_FORMAT: &str = "{levelname}: {message}";
pub const DEFAULT_DATEFMT: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub trait Formatter: Send + Sync {
    fn format(&self, record: &Record) -> String;
}

#[derive(Debug, Clone)]
pub struct PatternFormatter {
    segments: Vec<Segment>,
    datefmt: String,
    utc: bool,
    has_fields: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

impl PatternFormatter {
    pub fn new(pattern: &str) -> Self {
        let segments = parse(pattern);
        let has_fields = segments.iter().any(|s| matches!(s, Segment::Placeholder(p) if p == "fields"));
        Self { segments, datefmt: DEFAULT_DATEFMT.to_string(), utc: false, has_fields }
    }

    /// Fails on a `datefmt` chrono cannot render.
    pub fn with_datefmt(mut self, datefmt: impl Into<String>) -> Result<Self, KitError> {
        let datefmt = datefmt.into();
        if StrftimeItems::new(&datefmt).any(|item| matches!(item, Item::Error)) {
            return Err(KitError::Config(format!("invalid datefmt '{datefmt}'")));
        }
        self.datefmt = datefmt;
        Ok(self)
    }

    /// Render `{asctime}` in UTC instead of local time.
    pub fn with_utc(mut self, utc: bool) -> Self {
        self.utc = utc;
        self
    }

    fn asctime(&self, record: &Record) -> String {
        if self.utc {
            record.timestamp.format(&self.datefmt).to_string()
        } else {
            record.timestamp.with_timezone(&Local).format(&self.datefmt).to_string()
        }
    }

    fn placeholder(&self, key: &str, record: &Record, out: &mut String) {
        match key {
            "asctime" => out.push_str(&self.asctime(record)),
            "levelname" => out.push_str(record.level_name()),
            "name" => out.push_str(&record.target),
            "message" => out.push_str(&record.message),
            "pathname" => out.push_str(record.file.as_deref().unwrap_or("")),
            "filename" => {
                let file = record.file.as_deref().unwrap_or("");
                out.push_str(file.rsplit(['/', '\\']).next().unwrap_or(file));
            }
            "lineno" => {
                if let Some(line) = record.line {
                    out.push_str(&line.to_string());
                }
            }
            "fields" => out.push_str(&render_fields(record)),
            other => {
                if let Some(value) = record.extra.get(other) {
                    out.push_str(value);
                }
            }
        }
    }
}

impl Default for PatternFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_FORMAT)
    }
}

impl Formatter for PatternFormatter {
    fn format(&self, record: &Record) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(key) => self.placeholder(key, record, &mut out),
            }
        }
        if !self.has_fields && !record.fields.is_empty() {
            out.push(' ');
            out.push_str(&render_fields(record));
        }
        out
    }
}

fn render_fields(record: &Record) -> String {
    record
        .fields
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse(pattern: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut key = String::new();
                let mut closed = false;
                for k in chars.by_ref() {
                    if k == '}' {
                        closed = true;
                        break;
                    }
                    key.push(k);
                }
                if closed {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(key.trim().to_string()));
                } else {
                    // unterminated: keep verbatim
                    literal.push('{');
                    literal.push_str(&key);
                }
            }
            _ => literal.push(c),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

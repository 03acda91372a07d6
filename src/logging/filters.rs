//! Record filters.
//!
//! A filter decides whether a record reaches a sink and may annotate it on
//! the way (see [`TrimmedPathFilter`]).

use std::path::{Path, PathBuf};

use super::record::Record;

pub trait Filter: Send + Sync {
    fn passes(&self, record: &mut Record) -> bool;
}

/// Adds `trimmedpath` to `Record::extra`.
///
/// - files in a cargo registry checkout
///   (`~/.cargo/registry/src/index.crates.io-*/serde-1.0.0/src/de.rs`)
///   become `serde-1.0.0/src/de.rs`
/// - files below the working directory become relative to it
/// - anything else is kept as is
///
/// Never rejects a record.
#[derive(Debug, Clone)]
pub struct TrimmedPathFilter {
    cwd: Option<PathBuf>,
}

const REGISTRY_MARKERS: [&str; 2] = ["registry/src/", "registry\\src\\"];

impl TrimmedPathFilter {
    pub fn new() -> Self {
        Self { cwd: std::env::current_dir().ok() }
    }

    pub fn with_cwd(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: Some(cwd.into()) }
    }

    pub fn trim(&self, path: &str) -> String {
        for marker in REGISTRY_MARKERS {
            if let Some(idx) = path.find(marker) {
                let below_index = &path[idx + marker.len()..];
                // skip the `index.crates.io-<hash>` directory
                if let Some(sep) = below_index.find(['/', '\\']) {
                    return below_index[sep + 1..].to_string();
                }
                return below_index.to_string();
            }
        }
        if let Some(cwd) = &self.cwd {
            if let Ok(rel) = Path::new(path).strip_prefix(cwd) {
                return rel.to_string_lossy().into_owned();
            }
        }
        path.to_string()
    }
}

impl Default for TrimmedPathFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for TrimmedPathFilter {
    fn passes(&self, record: &mut Record) -> bool {
        let trimmed = self.trim(record.file.as_deref().unwrap_or(""));
        record.extra.insert("trimmedpath".to_string(), trimmed);
        true
    }
}

/// Passes records whose target is `name` or nested below it
/// (`name::child` or `name.child`). An empty name passes everything.
#[derive(Debug, Clone)]
pub struct TargetFilter {
    name: String,
}

impl TargetFilter {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Filter for TargetFilter {
    fn passes(&self, record: &mut Record) -> bool {
        is_nested_target(&record.target, &self.name)
    }
}

/// `true` when `target` equals `parent` or is a `::`/`.` separated child.
pub fn is_nested_target(target: &str, parent: &str) -> bool {
    if parent.is_empty() || target == parent {
        return true;
    }
    match target.strip_prefix(parent) {
        Some(rest) => rest.starts_with("::") || rest.starts_with('.'),
        None => false,
    }
}

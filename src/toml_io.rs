//! TOML file load/dump helpers.
//!
//! [`dump`] writes any `Serialize` value whose top level is a table, with
//! three ways of treating what is already on disk:
//!
//! | mode        | existing file                                         |
//! |-------------|-------------------------------------------------------|
//! | `Overwrite` | replaced entirely                                     |
//! | `Update`    | sections present in the new data replace old ones     |
//! | `Merge`     | deep merge; old keys inside sections persist          |

use std::{fmt, fs, path::Path, str::FromStr};

use serde::Serialize;

use crate::error::KitError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DumpMode {
    #[default]
    Overwrite,
    Update,
    Merge,
}

impl FromStr for DumpMode {
    type Err = KitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "update" => Ok(Self::Update),
            "merge" => Ok(Self::Merge),
            _ => Err(KitError::Config(format!(
                "invalid dump mode '{s}'; must be 'overwrite', 'update', or 'merge'"
            ))),
        }
    }
}

impl fmt::Display for DumpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Overwrite => "overwrite",
            Self::Update => "update",
            Self::Merge => "merge",
        })
    }
}

/// Read `path` as a TOML table. `Ok(None)` if the file does not exist.
pub fn load(path: &Path) -> Result<Option<toml::Table>, KitError> {
    if !path.exists() {
        return Ok(None);
    }
    let src = fs::read_to_string(path)?;
    Ok(Some(src.parse::<toml::Table>()?))
}

/// Serialize `data` to `path`, creating parent directories.
pub fn dump<T: Serialize + ?Sized>(data: &T, path: &Path, mode: DumpMode) -> Result<(), KitError> {
    let new = to_table(data)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let merged = match (mode, load(path)?) {
        (DumpMode::Overwrite, _) | (_, None) => new,
        (DumpMode::Update, Some(mut existing)) => {
            existing.extend(new);
            existing
        }
        (DumpMode::Merge, Some(mut existing)) => {
            deep_merge(&mut existing, new);
            existing
        }
    };

    fs::write(path, toml::to_string(&merged)?)?;
    Ok(())
}

/// Merge `overlay` into `base`. Tables present on both sides merge
/// recursively; any other value in `overlay` replaces the one in `base`.
pub fn deep_merge(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn to_table<T: Serialize + ?Sized>(data: &T) -> Result<toml::Table, KitError> {
    match toml::Value::try_from(data)? {
        toml::Value::Table(table) => Ok(table),
        other => Err(KitError::Config(format!(
            "TOML documents must be tables at the top level, got {}",
            other.type_str()
        ))),
    }
}

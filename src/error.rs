//! Crate-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KitError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    /// Raised while building an [`AliasRegistry`](crate::alias::AliasRegistry).
    #[error(
        "Conflict: alias '{alias}' (-> '{canonical}') collides with '{existing}' (-> '{existing_canonical}')"
    )]
    AliasConflict {
        alias: String,
        canonical: String,
        existing: String,
        existing_canonical: String,
    },

    #[error("alias not found: '{0}'")]
    AliasNotFound(String),

    #[error("config error: a target sink must be specified")]
    MissingTarget,

    #[error("config error: failed to resolve target sink '{0}'")]
    UnknownTarget(String),

    #[error("sink '{0}' is closed")]
    SinkClosed(String),

    #[error("toml parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("toml serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = KitError::Config("missing field".into());
        assert!(e.to_string().contains("config error"));
        assert!(e.to_string().contains("missing field"));
    }

    #[test]
    fn conflict_names_every_party() {
        let e = KitError::AliasConflict {
            alias: "YAHOO_FINANCE".into(),
            canonical: "SOMETHING_ELSE".into(),
            existing: "YF".into(),
            existing_canonical: "YAHOO_FINANCE".into(),
        };
        let msg = e.to_string();
        assert!(msg.starts_with("Conflict"));
        assert!(msg.contains("alias 'YAHOO_FINANCE'"));
        assert!(msg.contains("SOMETHING_ELSE"));
        assert!(msg.contains("'YF'"));
    }

    #[test]
    fn target_errors_are_config_errors() {
        assert!(KitError::MissingTarget.to_string().contains("target sink must be specified"));
        let e = KitError::UnknownTarget("nonexistent.module.Handler".into());
        assert!(e.to_string().contains("failed to resolve"));
        assert!(e.to_string().contains("nonexistent.module.Handler"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let e: KitError = io_err.into();
        assert!(e.to_string().contains("io error"));
        let _: &dyn Error = &e;
    }
}

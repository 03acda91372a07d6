//! Shared toolkit for the pfund family of apps.
//!
//! - [`alias`]: bidirectional alias ↔ canonical name registry
//! - [`logging`]: tracing setup, TOML-configured sinks, lazy file sinks,
//!   panic routing
//! - [`toml_io`]: TOML load/dump with overwrite, update and merge modes
//! - [`cli`]: extra CLI arguments as kwargs
//! - [`config`]: toolkit settings file with env overrides

pub mod alias;
pub mod cli;
pub mod config;
pub mod env;
pub mod error;
pub mod logging;
pub mod toml_io;

pub use alias::{AliasOptions, AliasRegistry};
pub use error::KitError;

//! Route uncaught panics to the logger of the package they came from.
//!
//! Packages register their logger name on a shared [`PanicRouter`]; when a
//! panic happens, its source location decides which logger records it:
//!
//! ```text
//! register("pfund"); register("pfeed");
//! .../crates/pfeed/src/feed.rs                         -> "pfeed"
//! ~/.cargo/registry/src/<index>/pfund-0.4.1/src/lib.rs -> "pfund"
//! src/main.rs                                          -> "root"
//! ```
//!
//! The hook is installed at most once per process and always chains to the
//! hook that was active before it.

use std::collections::BTreeSet;
use std::panic::{self, PanicHookInfo};
use std::sync::{
    Arc, Mutex, PoisonError, RwLock,
    atomic::{AtomicBool, Ordering},
};

use tracing::Level;

use super::LoggingHandle;
use super::config::ROOT_LOGGER;
use super::record::Record;

static INSTALLED: AtomicBool = AtomicBool::new(false);
/// Held while the process hook is swapped.
static HOOK_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Default)]
pub struct PanicRouter {
    names: RwLock<BTreeSet<String>>,
}

impl PanicRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, name: impl Into<String>) {
        self.names.write().unwrap_or_else(PoisonError::into_inner).insert(name.into());
    }

    pub fn names(&self) -> Vec<String> {
        self.names.read().unwrap_or_else(PoisonError::into_inner).iter().cloned().collect()
    }

    /// Logger for a panic raised in `file`. Longest matching name wins.
    pub fn route_for(&self, file: &str) -> String {
        let names = self.names.read().unwrap_or_else(PoisonError::into_inner);
        names
            .iter()
            .filter(|name| path_mentions(file, name))
            .max_by_key(|name| name.len())
            .cloned()
            .unwrap_or_else(|| ROOT_LOGGER.to_string())
    }

    /// Install the process panic hook. Returns `false` if one is already
    /// installed.
    pub fn install(self: &Arc<Self>, handle: LoggingHandle) -> bool {
        let _guard = HOOK_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        if INSTALLED.load(Ordering::Acquire) {
            return false;
        }
        let router = Arc::clone(self);
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let record = router.record_for(info);
            if let Err(e) = handle.dispatch(record) {
                eprintln!("pfund-kit: failed to log panic: {e}");
            }
            previous(info);
        }));
        INSTALLED.store(true, Ordering::Release);
        true
    }

    /// Restore the default panic hook.
    pub fn uninstall() {
        let _guard = HOOK_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        if INSTALLED.swap(false, Ordering::AcqRel) {
            drop(panic::take_hook());
        }
    }

    pub fn is_installed() -> bool {
        INSTALLED.load(Ordering::Acquire)
    }

    fn record_for(&self, info: &PanicHookInfo<'_>) -> Record {
        let message = format!("uncaught panic: {}", payload_message(info));
        match info.location() {
            Some(loc) => Record::new(Level::ERROR, self.route_for(loc.file()), message)
                .with_location(loc.file(), loc.line()),
            None => Record::new(Level::ERROR, ROOT_LOGGER, message),
        }
    }
}

fn payload_message(info: &PanicHookInfo<'_>) -> String {
    let payload = info.payload();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// `true` if a component of `file` is `name` or a versioned crate
/// directory `name-<digit>...`.
fn path_mentions(file: &str, name: &str) -> bool {
    file.split(['/', '\\']).any(|component| match component.strip_prefix(name) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix('-')
            .is_some_and(|v| v.starts_with(|c: char| c.is_ascii_digit())),
        None => false,
    })
}

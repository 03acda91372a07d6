//! Deferred-construction sink.
//!
//! [`LazySink`] stands in for a sink that is expensive to create (a file
//! handle, a rotating file). The real sink is built through the
//! [`SinkFactory`] on the first record that passes the level/filter gate,
//! so a logger that never writes never creates its file.
//!
//! ```text
//!   Uninitialized ──(first accepted record)──▶ Active ──(close)──▶ Closed
//! ```
//!
//! Configuration set on the wrapper before construction is copied onto the
//! target when it is built; configuration set afterwards is applied to both.
//! A missing or unknown target identifier is reported by the first `emit`
//! that needs the target, never by [`LazySink::new`].
//!
//! Emits share a read lock that `close` takes exclusively, so once `close`
//! returns no in-flight emit can still reach (and reopen) the target.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use arc_swap::ArcSwapOption;
use tracing::level_filters::LevelFilter;

use super::{Sink, SinkState};
use crate::error::KitError;
use crate::logging::factory::SinkFactory;
use crate::logging::filters::Filter;
use crate::logging::format::Formatter;
use crate::logging::record::Record;

/// The constructed target. `ArcSwapOption` needs a sized pointee.
struct Active(Arc<dyn Sink>);

pub struct LazySink {
    state: SinkState,
    path: PathBuf,
    target_id: Option<String>,
    kwargs: toml::Table,
    factory: Arc<SinkFactory>,
    target: ArcSwapOption<Active>,
    /// Serialises construction, close and configuration changes.
    init_lock: Mutex<()>,
    /// Shared by emits, exclusive for `close`.
    close_gate: RwLock<()>,
    closed: AtomicBool,
}

impl LazySink {
    pub fn new(
        path: impl Into<PathBuf>,
        target: Option<&str>,
        kwargs: toml::Table,
        factory: Arc<SinkFactory>,
    ) -> Self {
        Self {
            state: SinkState::new(),
            path: path.into(),
            target_id: target.map(str::to_string),
            kwargs,
            factory,
            target: ArcSwapOption::empty(),
            init_lock: Mutex::new(()),
            close_gate: RwLock::new(()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_level(self, level: LevelFilter) -> Self {
        self.state.set_level(level);
        self
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        self.state.set_name(Some(name.into()));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn target_id(&self) -> Option<&str> {
        self.target_id.as_deref()
    }

    /// The constructed target, if any. `None` before the first accepted
    /// record and after `close`.
    pub fn target(&self) -> Option<Arc<dyn Sink>> {
        self.target.load_full().map(|active| Arc::clone(&active.0))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.init_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn closed_error(&self) -> KitError {
        KitError::SinkClosed(self.path.display().to_string())
    }

    fn ensure_target(&self) -> Result<Arc<dyn Sink>, KitError> {
        if let Some(target) = self.target() {
            return Ok(target);
        }
        let _guard = self.guard();
        // another thread may have finished construction (or closed us)
        // while we waited
        if self.is_closed() {
            return Err(self.closed_error());
        }
        if let Some(target) = self.target() {
            return Ok(target);
        }
        let target = self.build_target()?;
        self.target.store(Some(Arc::new(Active(Arc::clone(&target)))));
        Ok(target)
    }

    fn build_target(&self) -> Result<Arc<dyn Sink>, KitError> {
        let id = self.target_id.as_deref().ok_or(KitError::MissingTarget)?;
        let target = self.factory.build(id, &self.path, &self.kwargs)?;
        self.state.copy_onto(target.as_ref());
        Ok(target)
    }
}

impl Sink for LazySink {
    fn state(&self) -> &SinkState {
        &self.state
    }

    /// Builds the target on first use, then forwards. The wrapper's gate has
    /// already run (via `handle`), and the target carries a copy of it.
    fn emit(&self, record: &Record) -> Result<(), KitError> {
        let _open = self.close_gate.read().unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            return Err(self.closed_error());
        }
        self.ensure_target()?.emit(record)
    }

    fn flush(&self) -> Result<(), KitError> {
        match self.target() {
            Some(target) => target.flush(),
            None => Ok(()),
        }
    }

    fn close(&self) -> Result<(), KitError> {
        // gate before init lock, the order emit takes them in
        let _closing = self.close_gate.write().unwrap_or_else(PoisonError::into_inner);
        let _guard = self.guard();
        self.closed.store(true, Ordering::Release);
        match self.target.swap(None) {
            Some(active) => active.0.close(),
            None => Ok(()),
        }
    }

    fn set_name(&self, name: Option<String>) {
        let _guard = self.guard();
        self.state.set_name(name.clone());
        if let Some(target) = self.target() {
            target.set_name(name);
        }
    }

    fn set_level(&self, level: LevelFilter) {
        let _guard = self.guard();
        self.state.set_level(level);
        if let Some(target) = self.target() {
            target.set_level(level);
        }
    }

    fn set_formatter(&self, formatter: Arc<dyn Formatter>) {
        let _guard = self.guard();
        self.state.set_formatter(Arc::clone(&formatter));
        if let Some(target) = self.target() {
            target.set_formatter(formatter);
        }
    }

    fn add_filter(&self, filter: Arc<dyn Filter>) {
        let _guard = self.guard();
        self.state.add_filter(Arc::clone(&filter));
        if let Some(target) = self.target() {
            target.add_filter(filter);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::filters::TargetFilter;
    use crate::logging::format::PatternFormatter;
    use crate::logging::sinks::testing::MemorySink;
    use std::fs;
    use std::sync::Barrier;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use tracing::Level;

    fn lazy_file(path: &Path) -> LazySink {
        LazySink::new(path, Some("file"), toml::Table::new(), Arc::new(SinkFactory::with_builtins()))
    }

    fn info(msg: &str) -> Record {
        Record::new(Level::INFO, "pfund", msg)
    }

    #[test]
    fn file_is_created_on_first_emit_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lazy.log");
        let sink = lazy_file(&path);
        assert!(!path.exists());
        assert!(sink.target().is_none());

        assert!(sink.handle(&mut info("hello")).unwrap());
        assert!(path.exists());
        sink.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "INFO: hello\n");
    }

    #[test]
    fn rejected_records_never_create_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gated.log");
        let sink = lazy_file(&path).with_level(LevelFilter::WARN);
        for _ in 0..100 {
            assert!(!sink.handle(&mut Record::new(Level::DEBUG, "pfund", "noise")).unwrap());
        }
        assert!(!path.exists());

        assert!(sink.handle(&mut Record::new(Level::ERROR, "pfund", "real")).unwrap());
        assert!(path.exists());
        let first = sink.target().unwrap();
        sink.handle(&mut Record::new(Level::WARN, "pfund", "again")).unwrap();
        assert!(Arc::ptr_eq(&first, &sink.target().unwrap()));
    }

    #[test]
    fn filters_gate_before_construction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filtered.log");
        let sink = lazy_file(&path);
        sink.add_filter(Arc::new(TargetFilter::new("pfeed")));
        assert!(!sink.handle(&mut info("other logger")).unwrap());
        assert!(!path.exists());
        assert!(sink.handle(&mut Record::new(Level::INFO, "pfeed::data", "mine")).unwrap());
        assert!(path.exists());
    }

    #[test]
    fn buffered_configuration_reaches_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configured.log");
        let sink = lazy_file(&path).with_name("file_handler").with_level(LevelFilter::INFO);
        sink.set_formatter(Arc::new(PatternFormatter::new("[{levelname}] {message}")));
        sink.add_filter(Arc::new(TargetFilter::new("pfund")));

        sink.handle(&mut info("formatted")).unwrap();
        let target = sink.target().unwrap();
        assert_eq!(target.name().as_deref(), Some("file_handler"));
        assert_eq!(target.level(), LevelFilter::INFO);
        assert_eq!(target.state().filters().len(), 1);
        sink.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[INFO] formatted\n");
    }

    #[test]
    fn configuration_after_construction_applies_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.log");
        let sink = lazy_file(&path);
        sink.handle(&mut info("first")).unwrap();
        let target = sink.target().unwrap();

        sink.set_formatter(Arc::new(PatternFormatter::new("{message}")));
        sink.set_level(LevelFilter::ERROR);
        sink.set_name(Some("renamed".into()));
        sink.add_filter(Arc::new(TargetFilter::new("pfund")));
        assert_eq!(target.level(), LevelFilter::ERROR);
        assert_eq!(target.name().as_deref(), Some("renamed"));
        assert_eq!(target.state().filters().len(), 1);

        assert!(!sink.handle(&mut info("dropped")).unwrap());
        sink.handle(&mut Record::new(Level::ERROR, "pfund", "second")).unwrap();
        sink.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "INFO: first\nsecond\n");
    }

    #[test]
    fn missing_target_fails_on_emit_not_on_new() {
        let sink = LazySink::new("/nonexistent/x.log", None, toml::Table::new(), Arc::default());
        let err = sink.handle(&mut info("m")).unwrap_err();
        assert!(matches!(err, KitError::MissingTarget));
        assert!(err.to_string().contains("a target sink must be specified"));
    }

    #[test]
    fn unknown_target_names_the_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.log");
        let sink = LazySink::new(
            &path,
            Some("nonexistent.module.Handler"),
            toml::Table::new(),
            Arc::default(),
        );
        let err = sink.emit(&info("m")).unwrap_err();
        assert!(err.to_string().contains("nonexistent.module.Handler"));
        assert!(!path.exists());
        // nothing was cached; the next emit fails the same way
        assert!(sink.emit(&info("m")).is_err());
    }

    #[test]
    fn flush_and_close_without_emit_construct_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idle.log");
        let sink = lazy_file(&path);
        sink.flush().unwrap();
        sink.close().unwrap();
        sink.close().unwrap();
        assert!(!path.exists());
        assert!(sink.target().is_none());
    }

    #[test]
    fn close_forwards_once_and_rejects_later_emits() {
        let mut factory = SinkFactory::empty();
        let memory = Arc::new(MemorySink::default());
        let shared = Arc::clone(&memory);
        factory.register("memory", move |_, _| Ok(Arc::clone(&shared) as Arc<dyn Sink>));
        let sink = LazySink::new("", Some("memory"), toml::Table::new(), Arc::new(factory));

        sink.emit(&info("kept")).unwrap();
        sink.flush().unwrap();
        sink.close().unwrap();
        sink.close().unwrap();
        assert_eq!(*memory.flushes.lock().unwrap(), 1);
        assert_eq!(*memory.closes.lock().unwrap(), 1);
        assert!(sink.target().is_none());

        let err = sink.emit(&info("late")).unwrap_err();
        assert!(matches!(err, KitError::SinkClosed(_)));
        assert_eq!(memory.lines(), vec!["INFO: kept"]);
    }

    #[test]
    fn concurrent_first_use_constructs_exactly_once() {
        let built = Arc::new(AtomicUsize::new(0));
        let mut factory = SinkFactory::empty();
        let counter = Arc::clone(&built);
        factory.register("memory", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(std::time::Duration::from_millis(20));
            Ok(Arc::new(MemorySink::default()) as Arc<dyn Sink>)
        });
        let sink = Arc::new(LazySink::new("", Some("memory"), toml::Table::new(), Arc::new(factory)));

        let barrier = Arc::new(Barrier::new(10));
        let handles: Vec<_> = (0..10)
            .map(|i| {
                let sink = Arc::clone(&sink);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    sink.handle(&mut info(&format!("thread {i}"))).unwrap();
                    sink.target().unwrap()
                })
            })
            .collect();
        let seen: Vec<Arc<dyn Sink>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert!(seen.iter().all(|t| Arc::ptr_eq(t, &seen[0])));
    }

    #[test]
    fn concurrent_writes_to_lazy_file_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("threads.log");
        let sink = Arc::new(lazy_file(&path));
        let barrier = Arc::new(Barrier::new(10));
        let handles: Vec<_> = (0..10)
            .map(|i| {
                let sink = Arc::clone(&sink);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    sink.handle(&mut info(&format!("line {i}"))).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        sink.close().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 10);
    }

    #[test]
    fn rotating_target_from_kwargs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rotating.log");
        let kwargs: toml::Table = toml::from_str("when = \"S\"\ninterval = 1\nbackup_count = 2").unwrap();
        let sink = LazySink::new(
            &path,
            Some("logging.handlers.TimedRotatingFileHandler"),
            kwargs,
            Arc::new(SinkFactory::with_builtins()),
        );
        assert!(!path.exists());
        sink.handle(&mut info("rotated")).unwrap();
        assert!(path.exists());
        sink.close().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "INFO: rotated\n");
    }

    #[test]
    fn compressed_rotating_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_compressed.log");
        let kwargs: toml::Table =
            toml::from_str("when = \"S\"\ninterval = 5\nbackupCount = 2\nutc = true").unwrap();
        let sink = LazySink::new(
            &path,
            Some("pfund_kit.logging.handlers.CompressedTimedRotatingFileHandler"),
            kwargs,
            Arc::new(SinkFactory::with_builtins()),
        );
        assert!(!path.exists());
        sink.handle(&mut info("Test message")).unwrap();
        sink.flush().unwrap();
        assert!(path.exists());
        assert!(sink.target().is_some());
        sink.close().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "INFO: Test message\n");
    }

    #[test]
    fn emit_racing_close_never_writes_after_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.log");
        let sink = Arc::new(lazy_file(&path));
        sink.handle(&mut info("before")).unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let writer = {
            let sink = Arc::clone(&sink);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut written = 0;
                while sink.handle(&mut info("during")).is_ok() {
                    written += 1;
                }
                written
            })
        };
        barrier.wait();
        sink.close().unwrap();
        let written = writer.join().unwrap();

        // nothing lands once close has returned
        let after_close = fs::read_to_string(&path).unwrap();
        assert!(matches!(sink.handle(&mut info("late")), Err(KitError::SinkClosed(_))));
        assert_eq!(fs::read_to_string(&path).unwrap(), after_close);
        assert_eq!(after_close.lines().count(), 1 + written);
    }
}

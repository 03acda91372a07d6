//! Routing of tracing events to configured loggers.
//!
//! A record is claimed by the longest configured logger name its target
//! nests under (`pfund::engine` and `pfund.engine` both nest under
//! `pfund`), falling back to `root`. The record then goes to that logger's
//! sinks and, while `propagate` holds, to each shorter ancestor and finally
//! `root`. Only the claiming logger's effective level gates the record;
//! ancestors' sinks apply their own levels.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::level_filters::LevelFilter;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use super::config::{ConfiguredLogger, ROOT_LOGGER};
use super::filters::is_nested_target;
use super::record::Record;
use crate::error::KitError;

/// Effective level when neither a logger nor any ancestor sets one.
pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::WARN;

pub struct Router {
    loggers: RwLock<Vec<ConfiguredLogger>>,
}

impl Router {
    pub fn new(loggers: Vec<ConfiguredLogger>) -> Self {
        Self { loggers: RwLock::new(loggers) }
    }

    pub fn logger_names(&self) -> Vec<String> {
        self.read().iter().map(|l| l.name.clone()).collect()
    }

    /// Send `record` down its logger chain. Returns how many sinks emitted
    /// it. Every sink in the chain is tried; the first failure is returned.
    pub fn dispatch(&self, mut record: Record) -> Result<usize, KitError> {
        let loggers = self.read();
        let chain = chain_for(&loggers, &record.target);
        let Some(&origin) = chain.first() else {
            return Ok(0);
        };

        let level = chain
            .iter()
            .find_map(|&i| loggers[i].level)
            .unwrap_or(DEFAULT_LEVEL);
        if record.level > level {
            return Ok(0);
        }

        let mut emitted = 0;
        let mut first_err = None;
        let mut current = Some(origin);
        let mut rest = chain.iter().skip(1);
        while let Some(i) = current {
            let logger = &loggers[i];
            for sink in &logger.sinks {
                match sink.handle(&mut record) {
                    Ok(true) => emitted += 1,
                    Ok(false) => {}
                    Err(e) => {
                        first_err.get_or_insert(e);
                    }
                }
            }
            current = if logger.propagate { rest.next().copied() } else { None };
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(emitted),
        }
    }

    /// Close and detach the sinks of every logger whose name starts with
    /// `prefix` (all loggers for an empty prefix). Returns the number of
    /// sinks detached.
    pub fn clear(&self, prefix: &str) -> Result<usize, KitError> {
        let mut loggers = self.loggers.write().unwrap_or_else(PoisonError::into_inner);
        let mut detached = 0;
        let mut first_err = None;
        for logger in loggers.iter_mut().filter(|l| l.name.starts_with(prefix)) {
            for sink in logger.sinks.drain(..) {
                detached += 1;
                if let Err(e) = sink.close() {
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(detached),
        }
    }

    pub fn flush(&self) -> Result<(), KitError> {
        for logger in self.read().iter() {
            for sink in &logger.sinks {
                sink.flush()?;
            }
        }
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<ConfiguredLogger>> {
        self.loggers.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Indices of the loggers a record for `target` passes through, claiming
/// logger first and `root` last.
fn chain_for(loggers: &[ConfiguredLogger], target: &str) -> Vec<usize> {
    let target = normalize(target);
    let mut chain: Vec<usize> = loggers
        .iter()
        .enumerate()
        .filter(|(_, l)| l.name != ROOT_LOGGER && is_nested_target(&target, &normalize(&l.name)))
        .map(|(i, _)| i)
        .collect();
    // every match is a prefix of `target`, so longer names are descendants
    chain.sort_by_key(|&i| std::cmp::Reverse(loggers[i].name.len()));
    if let Some(root) = loggers.iter().position(|l| l.name == ROOT_LOGGER) {
        chain.push(root);
    }
    chain
}

fn normalize(name: &str) -> String {
    name.replace("::", ".")
}

/// [`Layer`] feeding every event through a shared [`Router`].
pub struct SinkLayer {
    router: Arc<Router>,
}

impl SinkLayer {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }
}

impl<S: Subscriber> Layer<S> for SinkLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        // a failing sink must not take the program down; report and go on
        if let Err(e) = self.router.dispatch(Record::from_event(event)) {
            eprintln!("pfund-kit: log sink failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::sinks::Sink;
    use crate::logging::sinks::testing::MemorySink;
    use tracing::Level;
    use tracing_subscriber::prelude::*;

    fn logger(name: &str, level: Option<LevelFilter>, propagate: bool, sink: &Arc<MemorySink>) -> ConfiguredLogger {
        ConfiguredLogger {
            name: name.into(),
            level,
            propagate,
            sinks: vec![Arc::clone(sink) as Arc<dyn Sink>],
        }
    }

    struct Fixture {
        root: Arc<MemorySink>,
        pfund: Arc<MemorySink>,
        engine: Arc<MemorySink>,
        router: Router,
    }

    fn fixture(engine_propagates: bool) -> Fixture {
        let root = Arc::new(MemorySink::default());
        let pfund = Arc::new(MemorySink::default());
        let engine = Arc::new(MemorySink::default());
        let router = Router::new(vec![
            logger(ROOT_LOGGER, Some(LevelFilter::INFO), true, &root),
            logger("pfund", Some(LevelFilter::DEBUG), true, &pfund),
            logger("pfund.engine", None, engine_propagates, &engine),
        ]);
        Fixture { root, pfund, engine, router }
    }

    #[test]
    fn longest_prefix_claims_and_propagates() {
        let f = fixture(true);
        let n = f.router.dispatch(Record::new(Level::INFO, "pfund::engine::orders", "fill")).unwrap();
        assert_eq!(n, 3);
        assert_eq!(f.engine.lines(), vec!["INFO: fill"]);
        assert_eq!(f.pfund.lines(), vec!["INFO: fill"]);
        assert_eq!(f.root.lines(), vec!["INFO: fill"]);
    }

    #[test]
    fn propagate_false_stops_the_chain() {
        let f = fixture(false);
        f.router.dispatch(Record::new(Level::INFO, "pfund.engine", "local")).unwrap();
        assert_eq!(f.engine.lines().len(), 1);
        assert!(f.pfund.lines().is_empty());
        assert!(f.root.lines().is_empty());
    }

    #[test]
    fn unclaimed_targets_go_to_root_and_use_its_level() {
        let f = fixture(true);
        f.router.dispatch(Record::new(Level::DEBUG, "hyper::client", "noise")).unwrap();
        f.router.dispatch(Record::new(Level::WARN, "hyper::client", "slow")).unwrap();
        assert_eq!(f.root.lines(), vec!["WARNING: slow"]);
        // `pfundx` is not nested under `pfund`
        f.router.dispatch(Record::new(Level::INFO, "pfundx", "other")).unwrap();
        assert!(f.pfund.lines().is_empty());
    }

    #[test]
    fn level_is_inherited_from_ancestors() {
        let f = fixture(true);
        // pfund.engine has no level; pfund's DEBUG applies
        f.router.dispatch(Record::new(Level::DEBUG, "pfund.engine", "detail")).unwrap();
        assert_eq!(f.engine.lines(), vec!["DEBUG: detail"]);
        // ancestors' sinks still gate by their own level only
        assert_eq!(f.root.lines(), vec!["DEBUG: detail"]);
    }

    #[test]
    fn default_level_without_any_config() {
        let sink = Arc::new(MemorySink::default());
        let router = Router::new(vec![logger(ROOT_LOGGER, None, true, &sink)]);
        router.dispatch(Record::new(Level::INFO, "x", "quiet")).unwrap();
        router.dispatch(Record::new(Level::ERROR, "x", "loud")).unwrap();
        assert_eq!(sink.lines(), vec!["ERROR: loud"]);
    }

    #[test]
    fn clear_detaches_by_prefix() {
        let f = fixture(true);
        assert_eq!(f.router.clear("pfund").unwrap(), 2);
        assert_eq!(*f.pfund.closes.lock().unwrap(), 1);
        assert_eq!(*f.engine.closes.lock().unwrap(), 1);
        assert_eq!(*f.root.closes.lock().unwrap(), 0);

        f.router.dispatch(Record::new(Level::INFO, "pfund.engine", "after")).unwrap();
        assert!(f.engine.lines().is_empty());
        assert_eq!(f.root.lines(), vec!["INFO: after"]);

        assert_eq!(f.router.clear("").unwrap(), 1);
        assert_eq!(f.router.logger_names().len(), 3);
    }

    #[test]
    fn layer_routes_tracing_events() {
        let f = fixture(true);
        let pfund = Arc::clone(&f.pfund);
        let layer = SinkLayer::new(Arc::new(f.router));
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "pfund::strategy", order_id = 7, "placed");
            tracing::trace!(target: "pfund::strategy", "too verbose");
        });
        assert_eq!(pfund.lines(), vec!["INFO: placed order_id=7"]);
    }
}

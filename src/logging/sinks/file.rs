//! Plain file sink.
//!
//! kwargs: `mode` (`"a"` append, default; `"w"` truncate), `encoding`
//! (`utf-8` only), `delay` (open on first emit instead of at construction).

use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
};

use super::{Kwargs, Sink, SinkState, check_encoding};
use crate::error::KitError;
use crate::logging::record::Record;

pub struct FileSink {
    state: SinkState,
    path: PathBuf,
    /// Cleared after the first open so reopening appends.
    truncate: AtomicBool,
    file: Mutex<Option<File>>,
}

impl FileSink {
    /// Open (creating parent directories) `path` for appending.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, KitError> {
        let sink = Self::delayed(path, false);
        sink.ensure_open()?;
        Ok(sink)
    }

    /// Sink that opens `path` on its first emit.
    pub fn delayed(path: impl Into<PathBuf>, truncate: bool) -> Self {
        Self {
            state: SinkState::new(),
            path: path.into(),
            truncate: AtomicBool::new(truncate),
            file: Mutex::new(None),
        }
    }

    pub fn from_kwargs(path: &Path, kwargs: &toml::Table) -> Result<Self, KitError> {
        let mut kw = Kwargs::new("file", kwargs);
        let truncate = match kw.string("mode")? {
            None | Some("a") => false,
            Some("w") => true,
            Some(other) => {
                return Err(KitError::Config(format!("file sink: unsupported mode '{other}'")));
            }
        };
        check_encoding(&mut kw)?;
        let delay = kw.boolean("delay")?.unwrap_or(false);
        kw.finish()?;

        let sink = Self::delayed(path, truncate);
        if !delay {
            sink.ensure_open()?;
        }
        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<File>>, KitError> {
        self.file
            .lock()
            .map_err(|_| KitError::Logger(format!("file sink lock poisoned: {}", self.path.display())))
    }

    fn ensure_open(&self) -> Result<(), KitError> {
        let mut guard = self.lock()?;
        if guard.is_none() {
            *guard = Some(self.reopen()?);
        }
        Ok(())
    }

    fn reopen(&self) -> Result<File, KitError> {
        open_file(&self.path, self.truncate.swap(false, Ordering::Relaxed))
    }
}

pub(crate) fn open_file(path: &Path, truncate: bool) -> Result<File, KitError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut options = OpenOptions::new();
    options.create(true);
    if truncate {
        options.write(true).truncate(true);
    } else {
        options.append(true);
    }
    Ok(options.open(path)?)
}

pub(crate) fn write_line(file: &mut File, mut line: String) -> Result<(), KitError> {
    line.push('\n');
    file.write_all(line.as_bytes())?;
    Ok(())
}

impl Sink for FileSink {
    fn state(&self) -> &SinkState {
        &self.state
    }

    fn emit(&self, record: &Record) -> Result<(), KitError> {
        let line = self.state.format(record);
        let mut guard = self.lock()?;
        if guard.is_none() {
            *guard = Some(self.reopen()?);
        }
        match guard.as_mut() {
            Some(file) => write_line(file, line),
            None => Ok(()),
        }
    }

    fn flush(&self) -> Result<(), KitError> {
        if let Some(file) = self.lock()?.as_mut() {
            file.flush()?;
        }
        Ok(())
    }

    /// Drops the file handle. A later emit reopens it in append mode.
    fn close(&self) -> Result<(), KitError> {
        let mut guard = self.lock()?;
        if let Some(mut file) = guard.take() {
            file.flush()?;
        }
        Ok(())
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if let Ok(guard) = self.file.get_mut() {
            if let Some(file) = guard.as_mut() {
                let _ = file.flush();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::logging::format::PatternFormatter;
    use tracing::Level;

    fn kwargs(src: &str) -> toml::Table {
        toml::from_str(src).unwrap()
    }

    #[test]
    fn writes_formatted_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/app.log");
        let sink = FileSink::open(&path).unwrap();
        assert!(path.exists());
        sink.set_formatter(Arc::new(PatternFormatter::new("{levelname} {message}")));
        sink.emit(&Record::new(Level::INFO, "t", "one")).unwrap();
        sink.emit(&Record::new(Level::ERROR, "t", "two")).unwrap();
        sink.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "INFO one\nERROR two\n");
    }

    #[test]
    fn mode_w_truncates_and_a_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "old\n").unwrap();

        let sink = FileSink::from_kwargs(&path, &kwargs("mode = \"a\"")).unwrap();
        sink.emit(&Record::new(Level::INFO, "t", "appended")).unwrap();
        sink.close().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "old\nINFO: appended\n");

        let sink = FileSink::from_kwargs(&path, &kwargs("mode = \"w\"\nencoding = \"utf-8\"")).unwrap();
        sink.emit(&Record::new(Level::INFO, "t", "fresh")).unwrap();
        sink.close().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "INFO: fresh\n");
    }

    #[test]
    fn delay_defers_creation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("delayed.log");
        let sink = FileSink::from_kwargs(&path, &kwargs("delay = true")).unwrap();
        assert!(!path.exists());
        sink.emit(&Record::new(Level::INFO, "t", "now")).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn rejects_bad_kwargs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.log");
        assert!(FileSink::from_kwargs(&path, &kwargs("mode = \"r\"")).is_err());
        assert!(FileSink::from_kwargs(&path, &kwargs("encoding = \"latin-1\"")).is_err());
        assert!(FileSink::from_kwargs(&path, &kwargs("when = \"S\"")).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn emit_after_close_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reopen.log");
        let sink = FileSink::open(&path).unwrap();
        sink.emit(&Record::new(Level::INFO, "t", "a")).unwrap();
        sink.close().unwrap();
        sink.close().unwrap();
        sink.emit(&Record::new(Level::INFO, "t", "b")).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "INFO: a\nINFO: b\n");
    }
}

//! File sink that rotates on a time schedule.
//!
//! kwargs:
//! - `when`: `S`, `M`, `H` (default), `D` or `midnight`
//! - `interval`: number of `when` units per file, default 1
//! - `backup_count` (or `backupCount`): rotated files to keep, 0 (default)
//!   keeps all
//! - `utc`: compute boundaries and suffixes in UTC instead of local time
//! - `encoding`, `delay`: as for the plain file sink
//!
//! On rollover `app.log` becomes `app.log.<suffix>` where the suffix is the
//! start of the finished period, and a fresh `app.log` is opened on the next
//! emit. The first boundary is computed from the existing file's mtime, so a
//! file left over from an earlier run can already be due.
//!
//! The compressed variant gzips each rotated file to `app.log.<suffix>.gz`;
//! `backup_count` then counts the `.gz` files.

use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use flate2::{Compression, write::GzEncoder};

use super::file::{open_file, write_line};
use super::{Kwargs, Sink, SinkState, check_encoding};
use crate::error::KitError;
use crate::logging::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum When {
    Seconds,
    Minutes,
    Hours,
    Days,
    Midnight,
}

impl When {
    fn unit_secs(self) -> i64 {
        match self {
            When::Seconds => 1,
            When::Minutes => 60,
            When::Hours => 60 * 60,
            When::Days | When::Midnight => 24 * 60 * 60,
        }
    }

    fn suffix_format(self) -> &'static str {
        match self {
            When::Seconds => "%Y-%m-%d_%H-%M-%S",
            When::Minutes => "%Y-%m-%d_%H-%M",
            When::Hours => "%Y-%m-%d_%H",
            When::Days | When::Midnight => "%Y-%m-%d",
        }
    }
}

impl FromStr for When {
    type Err = KitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s" => Ok(When::Seconds),
            "m" => Ok(When::Minutes),
            "h" => Ok(When::Hours),
            "d" => Ok(When::Days),
            "midnight" => Ok(When::Midnight),
            _ => Err(KitError::Config(format!("invalid rotation 'when': '{s}'"))),
        }
    }
}

pub struct TimedRotatingFileSink {
    state: SinkState,
    path: PathBuf,
    when: When,
    interval: u32,
    backup_count: usize,
    utc: bool,
    compress: bool,
    inner: Mutex<Rotation>,
}

struct Rotation {
    file: Option<File>,
    rollover_at: DateTime<Utc>,
}

impl TimedRotatingFileSink {
    pub fn new(
        path: impl Into<PathBuf>,
        when: When,
        interval: u32,
        backup_count: usize,
        utc: bool,
    ) -> Result<Self, KitError> {
        if interval == 0 {
            return Err(KitError::Config("rotation interval must be at least 1".into()));
        }
        let path = path.into();
        let started = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        let mut sink = Self {
            state: SinkState::new(),
            path,
            when,
            interval,
            backup_count,
            utc,
            compress: false,
            inner: Mutex::new(Rotation { file: None, rollover_at: started }),
        };
        let first = sink.compute_rollover(started);
        if let Ok(inner) = sink.inner.get_mut() {
            inner.rollover_at = first;
        }
        Ok(sink)
    }

    /// Gzip rotated files.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn from_kwargs(path: &Path, kwargs: &toml::Table) -> Result<Self, KitError> {
        Self::build("timed_rotating_file", path, kwargs, false)
    }

    pub fn compressed_from_kwargs(path: &Path, kwargs: &toml::Table) -> Result<Self, KitError> {
        Self::build("compressed_timed_rotating_file", path, kwargs, true)
    }

    fn build(sink: &'static str, path: &Path, kwargs: &toml::Table, compress: bool) -> Result<Self, KitError> {
        let mut kw = Kwargs::new(sink, kwargs);
        let when = kw.string("when")?.map(When::from_str).transpose()?.unwrap_or(When::Hours);
        let interval = kw.unsigned("interval")?.unwrap_or(1);
        let interval = u32::try_from(interval)
            .map_err(|_| KitError::Config(format!("rotation interval too large: {interval}")))?;
        let backup_count = match (kw.unsigned("backup_count")?, kw.unsigned("backupCount")?) {
            (Some(_), Some(_)) => {
                return Err(KitError::Config(format!(
                    "{sink} sink: give either 'backup_count' or 'backupCount', not both"
                )));
            }
            (count, camel) => count.or(camel).unwrap_or(0) as usize,
        };
        let utc = kw.boolean("utc")?.unwrap_or(false);
        check_encoding(&mut kw)?;
        let delay = kw.boolean("delay")?.unwrap_or(false);
        kw.finish()?;

        let sink = Self::new(path, when, interval, backup_count, utc)?.with_compression(compress);
        if !delay {
            let file = open_file(&sink.path, false)?;
            sink.lock()?.file = Some(file);
        }
        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `true` once the current period has ended.
    pub fn should_rollover(&self) -> Result<bool, KitError> {
        Ok(Utc::now() >= self.lock()?.rollover_at)
    }

    /// Rotate now, regardless of schedule.
    pub fn do_rollover(&self) -> Result<(), KitError> {
        let mut inner = self.lock()?;
        self.rollover(&mut inner, Utc::now())
    }

    pub fn next_rollover(&self) -> Result<DateTime<Utc>, KitError> {
        Ok(self.lock()?.rollover_at)
    }

    // ── internals ────────────────────────────────────────────────────────────

    fn lock(&self) -> Result<MutexGuard<'_, Rotation>, KitError> {
        self.inner
            .lock()
            .map_err(|_| KitError::Logger(format!("rotating sink lock poisoned: {}", self.path.display())))
    }

    fn period(&self) -> TimeDelta {
        TimeDelta::seconds(self.when.unit_secs() * i64::from(self.interval))
    }

    fn compute_rollover(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        match self.when {
            When::Midnight => {
                next_midnight(from, self.utc) + TimeDelta::days(i64::from(self.interval) - 1)
            }
            _ => from + self.period(),
        }
    }

    fn rollover(&self, inner: &mut Rotation, now: DateTime<Utc>) -> Result<(), KitError> {
        if let Some(mut file) = inner.file.take() {
            file.flush()?;
        }

        if self.path.exists() {
            let dest = self.rotated_path(inner.rollover_at - self.period());
            if dest.exists() {
                fs::remove_file(&dest)?;
            }
            fs::rename(&self.path, &dest)?;
            if self.compress {
                gzip(&dest)?;
            }
        }

        if self.backup_count > 0 {
            for old in self.expired_backups()? {
                fs::remove_file(old)?;
            }
        }

        let mut next = self.compute_rollover(now);
        while next <= now {
            next += self.period();
        }
        inner.rollover_at = next;
        Ok(())
    }

    fn suffix(&self, at: DateTime<Utc>) -> String {
        let fmt = self.when.suffix_format();
        if self.utc {
            at.format(fmt).to_string()
        } else {
            at.with_timezone(&Local).format(fmt).to_string()
        }
    }

    fn rotated_path(&self, period_start: DateTime<Utc>) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".");
        name.push(self.suffix(period_start));
        self.path.with_file_name(name)
    }

    /// Rotated siblings beyond `backup_count`, oldest first.
    fn expired_backups(&self) -> Result<Vec<PathBuf>, KitError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let prefix = format!("{}.", self.path.file_name().unwrap_or_default().to_string_lossy());
        let sample = self.suffix(Utc::now());

        let mut rotated: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_prefix(&prefix))
                    .and_then(|suffix| if self.compress { suffix.strip_suffix(".gz") } else { Some(suffix) })
                    .is_some_and(|suffix| same_shape(suffix, &sample))
            })
            .collect();
        rotated.sort();

        let excess = rotated.len().saturating_sub(self.backup_count);
        rotated.truncate(excess);
        Ok(rotated)
    }
}

/// Replace `src` with `src.gz`.
fn gzip(src: &Path) -> Result<PathBuf, KitError> {
    let mut name = src.file_name().unwrap_or_default().to_os_string();
    name.push(".gz");
    let dest = src.with_file_name(name);

    let mut input = File::open(src)?;
    let mut encoder = GzEncoder::new(File::create(&dest)?, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.sync_all()?;
    drop(input);
    fs::remove_file(src)?;
    Ok(dest)
}

/// Same length, digits where `sample` has digits, identical elsewhere.
fn same_shape(candidate: &str, sample: &str) -> bool {
    candidate.len() == sample.len()
        && candidate.chars().zip(sample.chars()).all(|(c, s)| {
            if s.is_ascii_digit() { c.is_ascii_digit() } else { c == s }
        })
}

fn next_midnight(from: DateTime<Utc>, utc: bool) -> DateTime<Utc> {
    let next = if utc {
        from.date_naive()
            .succ_opt()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|n| n.and_utc())
    } else {
        from.with_timezone(&Local)
            .date_naive()
            .succ_opt()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .and_then(|n| Local.from_local_datetime(&n).earliest())
            .map(|d| d.with_timezone(&Utc))
    };
    next.unwrap_or(from + TimeDelta::days(1))
}

impl Sink for TimedRotatingFileSink {
    fn state(&self) -> &SinkState {
        &self.state
    }

    fn emit(&self, record: &Record) -> Result<(), KitError> {
        let line = self.state.format(record);
        let mut inner = self.lock()?;
        let now = Utc::now();
        if now >= inner.rollover_at {
            self.rollover(&mut inner, now)?;
        }
        if inner.file.is_none() {
            inner.file = Some(open_file(&self.path, false)?);
        }
        match inner.file.as_mut() {
            Some(file) => write_line(file, line),
            None => Ok(()),
        }
    }

    fn flush(&self) -> Result<(), KitError> {
        if let Some(file) = self.lock()?.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }

    fn close(&self) -> Result<(), KitError> {
        if let Some(mut file) = self.lock()?.file.take() {
            file.flush()?;
        }
        Ok(())
    }
}

//! Console sink. kwargs: `stream` = `"stderr"` (default) or `"stdout"`.

use std::io::{self, Write};
use std::path::Path;

use super::{Kwargs, Sink, SinkState};
use crate::error::KitError;
use crate::logging::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

pub struct StreamSink {
    state: SinkState,
    stream: Stream,
}

impl StreamSink {
    pub fn new(stream: Stream) -> Self {
        Self { state: SinkState::new(), stream }
    }

    /// `_path` is ignored; console sinks share the constructor shape of the
    /// file-backed ones.
    pub fn from_kwargs(_path: &Path, kwargs: &toml::Table) -> Result<Self, KitError> {
        let mut kw = Kwargs::new("stream", kwargs);
        let stream = match kw.string("stream")? {
            None | Some("stderr") => Stream::Stderr,
            Some("stdout") => Stream::Stdout,
            Some(other) => {
                return Err(KitError::Config(format!("stream sink: unknown stream '{other}'")));
            }
        };
        kw.finish()?;
        Ok(Self::new(stream))
    }

    pub fn stream(&self) -> Stream {
        self.stream
    }
}

impl Sink for StreamSink {
    fn state(&self) -> &SinkState {
        &self.state
    }

    fn emit(&self, record: &Record) -> Result<(), KitError> {
        let line = self.state.format(record);
        match self.stream {
            Stream::Stdout => writeln!(io::stdout().lock(), "{line}")?,
            Stream::Stderr => writeln!(io::stderr().lock(), "{line}")?,
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), KitError> {
        match self.stream {
            Stream::Stdout => io::stdout().flush()?,
            Stream::Stderr => io::stderr().flush()?,
        }
        Ok(())
    }
}

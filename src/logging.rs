//! Logging Sink: leveled message emission, policy-only for the core
//! (`spec.md` §4.7).

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::{FromRawFd, RawFd};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;

/// The four verbosities of `spec.md` §4.7, ascending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    Error,
    Warning,
    Status,
    Debug,
}

impl Level {
    fn to_tracing(self) -> LevelFilter {
        match self {
            Level::Error => LevelFilter::ERROR,
            Level::Warning => LevelFilter::WARN,
            Level::Status => LevelFilter::INFO,
            Level::Debug => LevelFilter::DEBUG,
        }
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::Warning
    }
}

/// Where configured log lines go. Default is standard error, not owned
/// (`spec.md` §4.7's "Default sink: standard error, not owned").
#[derive(Clone)]
pub struct Sink {
    writer: Arc<Mutex<dyn Write + Send>>,
    owned: bool,
}

impl Sink {
    pub fn stderr() -> Self {
        Sink { writer: Arc::new(Mutex::new(io::stderr())), owned: false }
    }

    /// Opens `path` append, create, synced: every write is immediately
    /// followed by `sync_data()`, so a configured log file never leaves a
    /// line sitting unflushed in the OS page cache (`spec.md` §4.7).
    pub fn open_file(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        Ok(Sink { writer: Arc::new(Mutex::new(SyncedFile(file))), owned: true })
    }

    pub fn from_stream(stream: Box<dyn Write + Send>, keep_open: bool) -> Self {
        Sink { writer: Arc::new(Mutex::new(stream)), owned: !keep_open }
    }

    /// # Safety
    /// `fd` must be a valid, open file descriptor for the lifetime implied
    /// by `keep_open` (the caller retains ownership when `keep_open` is
    /// true, matching `spec.md`'s `set_log_fd(fd, keep_open)`).
    pub unsafe fn from_fd(fd: RawFd, keep_open: bool) -> Self {
        let file = File::from_raw_fd(fd);
        if keep_open {
            // The caller owns `fd` and will close it themselves; wrapping
            // it in `ManuallyDrop` means our `File` never runs its `Drop`
            // impl, so we never close a descriptor we don't own.
            let kept = NeverClose(std::mem::ManuallyDrop::new(file));
            Sink { writer: Arc::new(Mutex::new(kept)), owned: false }
        } else {
            Sink { writer: Arc::new(Mutex::new(file)), owned: true }
        }
    }

    pub fn is_owned(&self) -> bool {
        self.owned
    }
}

/// Wraps a `File` the `Sink` must write through but never close, because
/// the caller retains ownership of the underlying descriptor.
struct NeverClose(std::mem::ManuallyDrop<File>);

impl Write for NeverClose {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

/// Wraps a `File` the `Sink` owns outright, syncing its data to disk after
/// every write (`spec.md` §4.7's "synced").
struct SyncedFile(File);

impl Write for SyncedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.0.write(buf)?;
        self.0.sync_data()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Default for Sink {
    fn default() -> Self {
        Sink::stderr()
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.lock().flush()
    }
}

/// A cheaply cloneable `MakeWriter` over a shared `Sink`, so every `tracing`
/// event for this instance lands in the same configured destination.
struct SinkMakeWriter(Sink);

impl<'a> MakeWriter<'a> for SinkMakeWriter {
    type Writer = Sink;

    fn make_writer(&'a self) -> Self::Writer {
        self.0.clone()
    }
}

/// Builds a per-instance `tracing::Dispatch` over the configured sink and
/// verbosity. The worker thread installs this as its thread-local default
/// for its whole lifetime (`tracing::dispatcher::set_default`); the façade
/// uses `tracing::dispatcher::with_default` around producer-side log calls,
/// so every log line for an instance — internal or caller-visible — flows
/// through the one sink named in `spec.md` §4.7.
pub fn build_dispatch(sink: Sink, level: Level) -> tracing::Dispatch {
    let subscriber = tracing_subscriber::fmt()
        .with_writer(SinkMakeWriter(sink))
        .with_max_level(level.to_tracing())
        .with_ansi(false)
        .without_time()
        .finish();
    tracing::Dispatch::new(subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc as StdArc, Mutex as StdMutex};

    #[derive(Clone)]
    struct Collector(StdArc<StdMutex<Vec<u8>>>);

    impl Write for Collector {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn level_ordering_matches_spec() {
        assert!(Level::Error < Level::Warning);
        assert!(Level::Warning < Level::Status);
        assert!(Level::Status < Level::Debug);
    }

    #[test]
    fn dispatch_respects_configured_threshold() {
        let buf = StdArc::new(StdMutex::new(Vec::new()));
        let sink = Sink::from_stream(Box::new(Collector(buf.clone())), true);
        let dispatch = build_dispatch(sink, Level::Warning);
        tracing::dispatcher::with_default(&dispatch, || {
            tracing::warn!("should appear");
            tracing::debug!("should not appear");
        });
        let captured = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert!(captured.contains("should appear"));
        assert!(!captured.contains("should not appear"));
    }

    #[test]
    fn default_sink_is_stderr_and_unowned() {
        let sink = Sink::default();
        assert!(!sink.is_owned());
    }
}

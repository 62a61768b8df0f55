//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Destination configuration and write targets."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;

use crate::filter::SeverityFilter;
use crate::severity::Severity;

/// User function receiving the sink severity and the rendered record.
///
/// It runs synchronously on the logging thread and must tolerate concurrent
/// invocation.
pub type ReportCallback = Arc<dyn Fn(Severity, &str) + Send + Sync>;

/// Family a destination, and every sink composed from it, belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkFamily {
    /// Terminal output.
    Console,
    /// Rotating files, one per severity band.
    File,
    /// User callback.
    Callback,
}

impl SinkFamily {
    /// Name used in settings documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkFamily::Console => "std",
            SinkFamily::File => "file",
            SinkFamily::Callback => "report",
        }
    }
}

/// One declared destination.
#[derive(Clone)]
pub enum Destination {
    /// Write to the console writer.
    Console {
        /// Cascade floor.
        level: Severity,
    },
    /// Write to `{path}{service}.{level}.log`; an empty path is inert.
    File {
        /// Cascade floor.
        level: Severity,
        /// Prefix prepended verbatim to the file name.
        path: String,
    },
    /// Hand each rendered record to a user function.
    Callback {
        /// Cascade floor.
        level: Severity,
        /// Receiver; `None` behaves as a no-op.
        callback: Option<ReportCallback>,
    },
}

impl Destination {
    /// Console destination at `level`.
    pub fn console(level: Severity) -> Self {
        Destination::Console { level }
    }

    /// File destination at `level` rooted at `path`.
    pub fn file(level: Severity, path: impl Into<String>) -> Self {
        Destination::File {
            level,
            path: path.into(),
        }
    }

    /// Callback destination at `level`.
    pub fn callback<F>(level: Severity, callback: F) -> Self
    where
        F: Fn(Severity, &str) + Send + Sync + 'static,
    {
        Destination::Callback {
            level,
            callback: Some(Arc::new(callback)),
        }
    }

    /// Family of this destination.
    pub fn family(&self) -> SinkFamily {
        match self {
            Destination::Console { .. } => SinkFamily::Console,
            Destination::File { .. } => SinkFamily::File,
            Destination::Callback { .. } => SinkFamily::Callback,
        }
    }

    /// Cascade floor of this destination.
    pub fn level(&self) -> Severity {
        match self {
            Destination::Console { level }
            | Destination::File { level, .. }
            | Destination::Callback { level, .. } => *level,
        }
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Console { level } => {
                f.debug_struct("Console").field("level", level).finish()
            }
            Destination::File { level, path } => f
                .debug_struct("File")
                .field("level", level)
                .field("path", path)
                .finish(),
            Destination::Callback { level, callback } => f
                .debug_struct("Callback")
                .field("level", level)
                .field("callback", &callback.as_ref().map(|_| "fn"))
                .finish(),
        }
    }
}

/// At most one destination per family, later declarations replacing earlier ones.
#[derive(Clone, Default)]
pub struct DestinationSet {
    pub(crate) console: Option<Severity>,
    pub(crate) file: Option<(Severity, String)>,
    pub(crate) report: Option<(Severity, ReportCallback)>,
}

impl DestinationSet {
    /// Empty set; composes to a logger with no sinks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `destination`, replacing any earlier one of the same family.
    pub fn insert(&mut self, destination: Destination) {
        match destination {
            Destination::Console { level } => self.console = Some(level),
            Destination::File { level, path } => self.file = Some((level, path)),
            Destination::Callback { level, callback } => {
                let callback = callback.unwrap_or_else(noop_callback);
                self.report = Some((level, callback));
            }
        }
    }

    /// Whether `family` is declared, regardless of whether it is inert.
    pub fn contains(&self, family: SinkFamily) -> bool {
        match family {
            SinkFamily::Console => self.console.is_some(),
            SinkFamily::File => self.file.is_some(),
            SinkFamily::Callback => self.report.is_some(),
        }
    }
}

impl FromIterator<Destination> for DestinationSet {
    fn from_iter<I: IntoIterator<Item = Destination>>(iter: I) -> Self {
        let mut set = DestinationSet::new();
        set.extend(iter);
        set
    }
}

impl Extend<Destination> for DestinationSet {
    fn extend<I: IntoIterator<Item = Destination>>(&mut self, iter: I) {
        for destination in iter {
            self.insert(destination);
        }
    }
}

fn noop_callback() -> ReportCallback {
    Arc::new(|_: Severity, _: &str| {})
}

/// Description of one composed sink, in composition order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkDescriptor {
    /// Destination family the sink came from.
    pub family: SinkFamily,
    /// Severity band it receives.
    pub filter: SeverityFilter,
    /// Human-readable write target (`stdout`, a file path, `callback`).
    pub target: String,
}

/// Shared console write target.
#[derive(Clone)]
pub struct ConsoleWriter {
    inner: Arc<BoxMakeWriter>,
    ansi: bool,
}

impl ConsoleWriter {
    /// Standard output with coloured levels.
    pub fn stdout() -> Self {
        Self {
            inner: Arc::new(BoxMakeWriter::new(io::stdout)),
            ansi: true,
        }
    }

    /// Any other writer, rendered without colour.
    pub fn new<M>(make_writer: M) -> Self
    where
        M: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(BoxMakeWriter::new(make_writer)),
            ansi: false,
        }
    }

    /// Whether records are colourised.
    pub fn ansi(&self) -> bool {
        self.ansi
    }
}

impl Default for ConsoleWriter {
    fn default() -> Self {
        Self::stdout()
    }
}

impl<'a> MakeWriter<'a> for ConsoleWriter {
    type Writer = Box<dyn Write + 'a>;

    fn make_writer(&'a self) -> Self::Writer {
        self.inner.make_writer()
    }
}

/// Write target that forwards every rendered record to a [`ReportCallback`].
#[derive(Clone)]
pub struct CallbackWriter {
    severity: Severity,
    callback: ReportCallback,
}

impl CallbackWriter {
    /// Writer reporting records under `severity`.
    pub fn new(severity: Severity, callback: ReportCallback) -> Self {
        Self { severity, callback }
    }
}

impl Write for CallbackWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let message = String::from_utf8_lossy(buf);
        let callback = &self.callback;
        let severity = self.severity;
        // A broken callback must never break the caller's logging.
        let _ = panic::catch_unwind(AssertUnwindSafe(|| callback(severity, &message)));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CallbackWriter {
    type Writer = CallbackWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

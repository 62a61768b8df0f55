//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Unified logger handle over the composed log core."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use tracing::{dispatcher, Dispatch};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

use crate::compose::compose;
use crate::error::CoreError;
use crate::severity::Severity;
use crate::sink::{ConsoleWriter, Destination, DestinationSet, SinkDescriptor};

/// Service name used when none is supplied.
pub const DEFAULT_SERVICE: &str = "server";

/// Immutable handle fanning each record out to every accepting sink.
///
/// Clones share the same composed core. Records are written synchronously on
/// the calling thread and logging never reports failure.
#[derive(Clone)]
pub struct Logger {
    service: Arc<str>,
    dispatch: Dispatch,
    sinks: Arc<[SinkDescriptor]>,
}

impl Logger {
    /// Start building a logger for `service`.
    pub fn builder(service: impl Into<String>) -> LoggerBuilder {
        LoggerBuilder::new(service)
    }

    /// Service stamped onto every record.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The composed sinks, in routing order.
    pub fn sinks(&self) -> &[SinkDescriptor] {
        &self.sinks
    }

    /// Underlying `tracing` dispatcher.
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Run `f` with this logger as the thread's default dispatcher.
    ///
    /// Any `tracing` event emitted inside `f`, with whatever structured fields
    /// it carries, is routed through this logger's sinks.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        dispatcher::with_default(&self.dispatch, f)
    }

    /// Emit `message` at `severity`, attributed to the calling line.
    #[track_caller]
    pub fn log(&self, severity: Severity, message: impl fmt::Display) {
        let location = Location::caller();
        let caller = format!("{}:{}", location.file(), location.line());
        self.log_with_caller(severity, message, Some(&caller));
    }

    /// Emit `message` at `severity` with an explicit caller, or none at all.
    pub fn log_with_caller(&self, severity: Severity, message: impl fmt::Display, caller: Option<&str>) {
        self.in_scope(|| match severity {
            Severity::Debug => tracing::debug!(caller, "{message}"),
            Severity::Info => tracing::info!(caller, "{message}"),
            Severity::Warn => tracing::warn!(caller, "{message}"),
            Severity::Error => tracing::error!(caller, "{message}"),
        });
    }

    /// Emit at debug severity.
    #[track_caller]
    pub fn debug(&self, message: impl fmt::Display) {
        self.log(Severity::Debug, message);
    }

    /// Emit at info severity.
    #[track_caller]
    pub fn info(&self, message: impl fmt::Display) {
        self.log(Severity::Info, message);
    }

    /// Emit at warn severity.
    #[track_caller]
    pub fn warn(&self, message: impl fmt::Display) {
        self.log(Severity::Warn, message);
    }

    /// Emit at error severity.
    #[track_caller]
    pub fn error(&self, message: impl fmt::Display) {
        self.log(Severity::Error, message);
    }

    /// Make this logger the process-wide `tracing` default.
    ///
    /// Isolated handles keep working through [`Logger::in_scope`] whether or
    /// not a global logger is installed.
    pub fn install_global(&self) -> Result<(), CoreError> {
        dispatcher::set_global_default(self.dispatch.clone())?;
        Ok(())
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("service", &self.service)
            .field("sinks", &self.sinks)
            .finish()
    }
}

/// Collects destinations and builds a [`Logger`].
pub struct LoggerBuilder {
    service: String,
    destinations: DestinationSet,
    console: ConsoleWriter,
}

impl LoggerBuilder {
    /// Builder for `service` with no destinations and stdout as console.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            destinations: DestinationSet::new(),
            console: ConsoleWriter::stdout(),
        }
    }

    /// Add one destination; a later destination of the same family wins.
    pub fn destination(mut self, destination: Destination) -> Self {
        self.destinations.insert(destination);
        self
    }

    /// Add several destinations in order.
    pub fn destinations(mut self, destinations: impl IntoIterator<Item = Destination>) -> Self {
        self.destinations.extend(destinations);
        self
    }

    /// Replace stdout as the console write target.
    pub fn console_writer<M>(mut self, make_writer: M) -> Self
    where
        M: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        self.console = ConsoleWriter::new(make_writer);
        self
    }

    /// Compose the sinks and wrap them in a logger.
    pub fn build(self) -> Logger {
        let service: Arc<str> = if self.service.trim().is_empty() {
            Arc::from(DEFAULT_SERVICE)
        } else {
            Arc::from(self.service)
        };
        let (layers, sinks) = compose(&service, &self.destinations, &self.console).into_parts();
        let subscriber = Registry::default().with(layers);
        Logger {
            service,
            dispatch: Dispatch::new(subscriber),
            sinks: sinks.into(),
        }
    }
}

fn with_console(
    level: Severity,
    service: impl Into<String>,
    destinations: impl IntoIterator<Item = Destination>,
) -> Logger {
    LoggerBuilder::new(service)
        .destination(Destination::console(level))
        .destinations(destinations)
        .build()
}

/// Logger with an info console; `destinations` may override the console.
pub fn new(service: impl Into<String>, destinations: impl IntoIterator<Item = Destination>) -> Logger {
    new_info(service, destinations)
}

/// Logger whose console receives every severity.
pub fn new_debug(
    service: impl Into<String>,
    destinations: impl IntoIterator<Item = Destination>,
) -> Logger {
    with_console(Severity::Debug, service, destinations)
}

/// Logger whose console starts at info.
pub fn new_info(
    service: impl Into<String>,
    destinations: impl IntoIterator<Item = Destination>,
) -> Logger {
    with_console(Severity::Info, service, destinations)
}

/// Logger whose console starts at warn.
pub fn new_warn(
    service: impl Into<String>,
    destinations: impl IntoIterator<Item = Destination>,
) -> Logger {
    with_console(Severity::Warn, service, destinations)
}

/// Logger whose console only shows errors.
pub fn new_error(
    service: impl Into<String>,
    destinations: impl IntoIterator<Item = Destination>,
) -> Logger {
    with_console(Severity::Error, service, destinations)
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::sink::SinkFamily;

    type Reports = Arc<Mutex<Vec<(Severity, String)>>>;

    fn reporting(level: Severity) -> (Logger, Reports) {
        let reports: Reports = Arc::default();
        let sink = Arc::clone(&reports);
        let logger = Logger::builder("orders")
            .destination(Destination::callback(level, move |severity, message| {
                sink.lock().push((severity, message.to_owned()))
            }))
            .build();
        (logger, reports)
    }

    #[test]
    fn empty_service_falls_back_to_default() {
        let logger = Logger::builder("  ").build();
        assert_eq!(logger.service(), DEFAULT_SERVICE);
    }

    #[test]
    fn debug_floor_delivers_every_severity_once() {
        let (logger, reports) = reporting(Severity::Debug);
        for severity in Severity::ALL {
            logger.log(severity, format!("at {severity}"));
        }
        let seen: Vec<_> = reports.lock().iter().map(|(severity, _)| *severity).collect();
        assert_eq!(seen, Severity::ALL.to_vec());
    }

    #[test]
    fn warn_floor_drops_lower_severities() {
        let (logger, reports) = reporting(Severity::Warn);
        logger.debug("noise");
        logger.info("chatter");
        logger.warn("careful");
        logger.error("broken");
        let seen: Vec<_> = reports.lock().iter().map(|(severity, _)| *severity).collect();
        assert_eq!(seen, vec![Severity::Warn, Severity::Error]);
    }

    #[test]
    fn records_name_the_calling_line() {
        let (logger, reports) = reporting(Severity::Info);
        logger.info("located");
        let reports = reports.lock();
        let (_, message) = &reports[0];
        assert!(message.contains("[src/logger.rs:"), "{message}");
        assert!(message.contains("located"));
        assert!(message.contains("\"service\":\"orders\""));
    }

    #[test]
    fn structured_fields_flow_through_scope() {
        let (logger, reports) = reporting(Severity::Info);
        logger.in_scope(|| tracing::info!(order_id = 7_u64, "accepted"));
        let reports = reports.lock();
        assert!(reports[0].1.contains("\"order_id\":7"));
    }

    #[test]
    fn explicit_none_caller_omits_annotation() {
        let (logger, reports) = reporting(Severity::Error);
        logger.log_with_caller(Severity::Error, "anonymous", None);
        let reports = reports.lock();
        assert!(reports[0].1.contains("\tERROR\tanonymous"), "{}", reports[0].1);
    }

    #[test]
    fn convenience_constructors_fix_console_floor() {
        let logger = new_warn("api", Vec::<Destination>::new());
        let console: Vec<_> = logger
            .sinks()
            .iter()
            .filter(|sink| sink.family == SinkFamily::Console)
            .map(|sink| sink.filter)
            .collect();
        assert_eq!(console.len(), 2);

        let overridden = new("api", [Destination::console(Severity::Error)]);
        assert_eq!(overridden.sinks().len(), 1);
    }

    #[test]
    fn loggers_are_isolated_from_each_other() {
        let (quiet, quiet_reports) = reporting(Severity::Error);
        let (loud, loud_reports) = reporting(Severity::Debug);
        quiet.info("ignored");
        loud.info("kept");
        assert!(quiet_reports.lock().is_empty());
        assert_eq!(loud_reports.lock().len(), 1);
    }
}

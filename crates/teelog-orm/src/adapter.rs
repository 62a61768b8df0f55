//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Query trace adapter for relational-mapping libraries."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use teelog_core::{Destination, Logger};

use crate::attribution::attribute;
use crate::error::is_record_not_found;
use crate::frames::{FrameSource, StackFrames};
use crate::registry;

/// Service name of loggers built by [`TraceLogger::new`].
pub const DATABASE_SERVICE: &str = "database";

/// Queries slower than this are reported at warn by default.
pub const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_secs(3);

/// Verbosity of a query logger; more verbose modes compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogMode {
    /// Emit nothing.
    Silent,
    /// Failed queries only.
    Error,
    /// Failed and slow queries.
    Warn,
    /// Every query.
    Info,
    /// Passes every gate of [`LogMode::Warn`], but plain query traces are
    /// reserved for [`LogMode::Info`].
    Debug,
}

/// Pluggable logger contract expected by relational-mapping libraries.
pub trait QueryLogger: Send + Sync {
    /// Copy of this logger at `mode`; the receiver is left untouched.
    fn log_mode(&self, mode: LogMode) -> Arc<dyn QueryLogger>;
    /// Informational message from the library.
    fn info(&self, message: fmt::Arguments<'_>);
    /// Warning from the library.
    fn warn(&self, message: fmt::Arguments<'_>);
    /// Error from the library.
    fn error(&self, message: fmt::Arguments<'_>);
    /// Report one completed query started at `begin`.
    ///
    /// `fetch` yields the SQL text and affected rows, `-1` meaning unknown.
    fn trace(
        &self,
        begin: Instant,
        fetch: &dyn Fn() -> (String, i64),
        err: Option<&(dyn Error + 'static)>,
    );
}

/// [`QueryLogger`] writing through a [`Logger`], attributed to application code.
///
/// Handles are immutable: every `with_*` call returns a new handle sharing the
/// same composed sinks.
#[derive(Clone)]
pub struct TraceLogger {
    logger: Logger,
    mode: LogMode,
    slow_threshold: Duration,
    skip_caller_lookup: bool,
    ignore_record_not_found: bool,
    frames: Arc<dyn FrameSource>,
}

impl TraceLogger {
    /// Adapter over a `database` logger with an info console plus `destinations`.
    pub fn new(mode: LogMode, destinations: impl IntoIterator<Item = Destination>) -> Self {
        Self::with_logger(teelog_core::new(DATABASE_SERVICE, destinations), mode)
    }

    /// Adapter over an existing logger.
    pub fn with_logger(logger: Logger, mode: LogMode) -> Self {
        Self {
            logger,
            mode,
            slow_threshold: DEFAULT_SLOW_THRESHOLD,
            skip_caller_lookup: false,
            ignore_record_not_found: true,
            frames: Arc::new(StackFrames::default()),
        }
    }

    /// Underlying logger.
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Current verbosity.
    pub fn mode(&self) -> LogMode {
        self.mode
    }

    /// Slow query threshold; zero disables slow query reporting.
    pub fn slow_threshold(&self) -> Duration {
        self.slow_threshold
    }

    /// Copy at another verbosity.
    pub fn with_mode(&self, mode: LogMode) -> Self {
        Self {
            mode,
            ..self.clone()
        }
    }

    /// Copy with another slow query threshold.
    pub fn with_slow_threshold(&self, threshold: Duration) -> Self {
        Self {
            slow_threshold: threshold,
            ..self.clone()
        }
    }

    /// Copy that skips stack inspection and records no caller.
    pub fn with_skip_caller_lookup(&self, skip: bool) -> Self {
        Self {
            skip_caller_lookup: skip,
            ..self.clone()
        }
    }

    /// Copy that does or does not report record-not-found failures as errors.
    pub fn with_ignore_record_not_found(&self, ignore: bool) -> Self {
        Self {
            ignore_record_not_found: ignore,
            ..self.clone()
        }
    }

    /// Copy attributing records with another frame source.
    pub fn with_frame_source(&self, frames: impl FrameSource + 'static) -> Self {
        Self {
            frames: Arc::new(frames),
            ..self.clone()
        }
    }

    /// Register a copy of this handle in the process-wide slot.
    pub fn set_as_default(&self) {
        registry::set_default(Arc::new(self.clone()));
    }

    fn caller(&self) -> Option<String> {
        if self.skip_caller_lookup {
            return None;
        }
        attribute(self.frames.frames()).map(|location| location.to_string())
    }
}

impl fmt::Debug for TraceLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceLogger")
            .field("service", &self.logger.service())
            .field("mode", &self.mode)
            .field("slow_threshold", &self.slow_threshold)
            .field("skip_caller_lookup", &self.skip_caller_lookup)
            .field("ignore_record_not_found", &self.ignore_record_not_found)
            .finish()
    }
}

impl QueryLogger for TraceLogger {
    fn log_mode(&self, mode: LogMode) -> Arc<dyn QueryLogger> {
        Arc::new(self.with_mode(mode))
    }

    fn info(&self, message: fmt::Arguments<'_>) {
        if self.mode >= LogMode::Info {
            let caller = self.caller();
            self.logger
                .in_scope(|| tracing::info!(caller = caller.as_deref(), "{message}"));
        }
    }

    fn warn(&self, message: fmt::Arguments<'_>) {
        if self.mode >= LogMode::Warn {
            let caller = self.caller();
            self.logger
                .in_scope(|| tracing::warn!(caller = caller.as_deref(), "{message}"));
        }
    }

    fn error(&self, message: fmt::Arguments<'_>) {
        if self.mode >= LogMode::Error {
            let caller = self.caller();
            self.logger
                .in_scope(|| tracing::error!(caller = caller.as_deref(), "{message}"));
        }
    }

    fn trace(
        &self,
        begin: Instant,
        fetch: &dyn Fn() -> (String, i64),
        err: Option<&(dyn Error + 'static)>,
    ) {
        if self.mode <= LogMode::Silent {
            return;
        }

        let elapsed = begin.elapsed();
        let (sql, rows) = fetch();
        let rows = if rows == -1 { 0 } else { rows };

        match err {
            Some(err)
                if self.mode >= LogMode::Error
                    && (!is_record_not_found(err) || !self.ignore_record_not_found) =>
            {
                let caller = self.caller();
                self.logger.in_scope(|| {
                    tracing::error!(
                        caller = caller.as_deref(),
                        error = %err,
                        elapsed = ?elapsed,
                        rows,
                        sql = %sql,
                        "trace"
                    )
                });
            }
            _ if elapsed > self.slow_threshold
                && !self.slow_threshold.is_zero()
                && self.mode >= LogMode::Warn =>
            {
                let caller = self.caller();
                let slow_log = format!("SLOW SQL >= {:?}", self.slow_threshold);
                let error = err.map(|err| err.to_string());
                self.logger.in_scope(|| {
                    tracing::warn!(
                        caller = caller.as_deref(),
                        error = error.as_deref(),
                        slow_log = %slow_log,
                        elapsed = ?elapsed,
                        rows,
                        sql = %sql,
                        "trace"
                    )
                });
            }
            _ if self.mode == LogMode::Info => {
                let caller = self.caller();
                self.logger.in_scope(|| {
                    tracing::info!(
                        caller = caller.as_deref(),
                        elapsed = ?elapsed,
                        rows,
                        sql = %sql,
                        "trace"
                    )
                });
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use teelog_core::Severity;

    use super::*;
    use crate::error::RecordNotFound;
    use crate::frames::Frame;

    type Reports = Arc<Mutex<Vec<(Severity, String)>>>;

    #[derive(Debug, thiserror::Error)]
    #[error("lookup failed")]
    struct Lookup(#[source] RecordNotFound);

    #[derive(Debug, thiserror::Error)]
    #[error("connection reset")]
    struct ConnectionReset;

    fn capture(mode: LogMode) -> (TraceLogger, Reports) {
        let reports: Reports = Arc::default();
        let sink = Arc::clone(&reports);
        let logger = Logger::builder("database")
            .destination(Destination::callback(Severity::Debug, move |severity, message| {
                sink.lock().push((severity, message.to_owned()))
            }))
            .build();
        let frames = vec![
            Frame::internal("crates/teelog-orm/src/adapter.rs", 180),
            Frame::internal("sqlx-core/src/query.rs", 31),
            Frame::external("src/repo/orders.rs", 42),
        ];
        let trace = TraceLogger::with_logger(logger, mode).with_frame_source(frames);
        (trace, reports)
    }

    fn query() -> (String, i64) {
        ("SELECT * FROM orders".to_owned(), -1)
    }

    fn long_ago() -> Instant {
        Instant::now()
            .checked_sub(Duration::from_millis(500))
            .unwrap_or_else(Instant::now)
    }

    fn severities(reports: &Reports) -> Vec<Severity> {
        reports.lock().iter().map(|(severity, _)| *severity).collect()
    }

    #[test]
    fn unknown_row_count_is_reported_as_zero() {
        let (trace, reports) = capture(LogMode::Info);
        trace.trace(Instant::now(), &query, None);
        let reports = reports.lock();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].1.contains("\"rows\":0"), "{}", reports[0].1);
        assert!(reports[0].1.contains("\"sql\":\"SELECT * FROM orders\""));
        assert!(reports[0].1.contains("[repo/orders.rs:42]"));
    }

    #[test]
    fn record_not_found_is_suppressed_by_default() {
        let (trace, reports) = capture(LogMode::Error);
        let err = Lookup(RecordNotFound);
        trace.trace(Instant::now(), &query, Some(&err));
        assert!(reports.lock().is_empty());

        let loud = trace.with_ignore_record_not_found(false);
        loud.trace(Instant::now(), &query, Some(&err));
        assert_eq!(severities(&reports), vec![Severity::Error]);
        assert!(reports.lock()[0].1.contains("\"error\":\"lookup failed\""));
    }

    #[test]
    fn real_failures_are_errors() {
        let (trace, reports) = capture(LogMode::Warn);
        trace.trace(Instant::now(), &query, Some(&ConnectionReset));
        assert_eq!(severities(&reports), vec![Severity::Error]);
    }

    #[test]
    fn slow_query_emits_single_warning() {
        let (trace, reports) = capture(LogMode::Info);
        let trace = trace.with_slow_threshold(Duration::from_millis(10));
        trace.trace(long_ago(), &query, None);
        assert_eq!(severities(&reports), vec![Severity::Warn]);
        assert!(reports.lock()[0].1.contains("SLOW SQL >= 10ms"));
    }

    #[test]
    fn zero_threshold_disables_slow_reporting() {
        let (trace, reports) = capture(LogMode::Warn);
        let trace = trace.with_slow_threshold(Duration::ZERO);
        trace.trace(long_ago(), &query, None);
        assert!(reports.lock().is_empty());
    }

    #[test]
    fn debug_and_silent_modes_skip_plain_traces() {
        let (debug, reports) = capture(LogMode::Debug);
        debug.trace(Instant::now(), &query, None);
        debug.with_mode(LogMode::Silent).trace(Instant::now(), &query, Some(&ConnectionReset));
        assert!(reports.lock().is_empty());
    }

    #[test]
    fn releveling_leaves_receiver_untouched() {
        let (trace, reports) = capture(LogMode::Error);
        let verbose = trace.log_mode(LogMode::Info);
        trace.trace(Instant::now(), &query, None);
        assert!(reports.lock().is_empty());
        assert_eq!(trace.mode(), LogMode::Error);

        verbose.trace(Instant::now(), &query, None);
        assert_eq!(severities(&reports), vec![Severity::Info]);
    }

    #[test]
    fn verbs_are_gated_on_mode() {
        let (trace, reports) = capture(LogMode::Warn);
        trace.info(format_args!("migrating {} tables", 3));
        trace.warn(format_args!("pool at {}%", 90));
        trace.error(format_args!("deadlock"));
        assert_eq!(severities(&reports), vec![Severity::Warn, Severity::Error]);
        assert!(reports.lock()[0].1.contains("pool at 90%"));
    }

    #[test]
    fn skipped_lookup_records_no_caller() {
        let (trace, reports) = capture(LogMode::Info);
        trace.with_skip_caller_lookup(true).trace(Instant::now(), &query, None);
        let reports = reports.lock();
        assert!(reports[0].1.contains("\tINFO\ttrace\t"), "{}", reports[0].1);
    }

    #[test]
    fn constructor_uses_database_service() {
        let trace = TraceLogger::new(LogMode::Warn, Vec::<Destination>::new());
        assert_eq!(trace.logger().service(), DATABASE_SERVICE);
        assert_eq!(trace.slow_threshold(), DEFAULT_SLOW_THRESHOLD);
    }
}
